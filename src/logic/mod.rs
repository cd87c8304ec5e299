pub mod deploy;
pub mod index;
pub mod slug;
pub mod staging;
pub mod validate;

pub use deploy::*;
pub use index::*;
pub use slug::*;
pub use staging::*;
pub use validate::*;

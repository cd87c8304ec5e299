pub mod github;
pub mod memory;
pub mod registry;
pub mod traits;

pub use github::*;
pub use memory::*;
pub use registry::*;
pub use traits::*;

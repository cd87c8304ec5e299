pub mod changes;
pub mod common;
pub mod dataset;
pub mod format;
pub mod item;
pub mod operation;
pub mod repository;
pub mod user_context;

pub use changes::*;
pub use common::*;
pub use dataset::*;
pub use format::*;
pub use item::*;
pub use operation::*;
pub use repository::*;
pub use user_context::*;

pub mod admin_handlers;
pub mod handlers;
pub mod routes;
pub mod user_extractor;

pub use admin_handlers::*;
pub use handlers::*;
pub use routes::*;

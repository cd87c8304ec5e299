use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::api::{admin_handlers, handlers, handlers::AppState};
use crate::store::RepositoryHost;

pub fn create_router<R: RepositoryHost + 'static>() -> Router<AppState<R>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Read side
        .route("/datasets", get(handlers::list_datasets::<R>))
        .route("/datasets/:name", get(handlers::get_dataset::<R>))
        .route("/datasets/:name/items", get(handlers::find_by_level_slug::<R>))
        .route("/datasets/:name/items/:item_id", get(handlers::get_item::<R>))
        .route(
            "/datasets/:name/items/:item_id/path",
            get(handlers::get_item_path::<R>),
        )
        .route("/datasets/:name/children", get(handlers::get_children::<R>))
        .route("/datasets/:name/lookup", get(handlers::lookup_by_path::<R>))
        // Staging session
        .route(
            "/datasets/:name/staging",
            post(admin_handlers::start_session::<R>).delete(admin_handlers::discard_session::<R>),
        )
        .route(
            "/datasets/:name/staging/operations",
            get(admin_handlers::list_operations::<R>).post(admin_handlers::stage_operation::<R>),
        )
        .route(
            "/datasets/:name/staging/operations/:item_id",
            delete(admin_handlers::unstage_item::<R>),
        )
        .route("/datasets/:name/staging/diff", get(admin_handlers::get_diff::<R>))
        // Repository
        .route("/datasets/:name/status", get(admin_handlers::get_status::<R>))
        .route("/datasets/:name/deploy", post(admin_handlers::deploy::<R>))
        .route("/datasets/:name/refresh", post(admin_handlers::refresh::<R>))
}

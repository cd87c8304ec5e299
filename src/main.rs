use axum::serve;
use taxonomy_store::api::routes::create_router;
use taxonomy_store::build_controller;
use taxonomy_store::config::AppConfig;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // RUST_LOG overrides; HTTP client internals stay quiet by default
    use env_logger::{Builder, Env};
    use log::LevelFilter;

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .init();

    log::info!("Taxonomy configuration store");

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}, backend={:?}, datasets={}",
        config.server_address(),
        config.repository.backend,
        config.datasets.len()
    );

    let controller = build_controller(&config).await?;

    run_server(create_router().with_state(controller), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Taxonomy store running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}

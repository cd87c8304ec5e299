pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use api::handlers;
pub use api::routes;

pub use logic::{
    DeployError, DeployOutcome, DeploymentController, SessionInfo, StagingError, StagingSession,
    TaxonomyIndex, ValidationError,
};

pub use model::*;

pub use store::{
    DatasetRegistry, GitHubRepository, InMemoryRepository, ReadView, RepositoryError,
    RepositoryHost,
};

use std::sync::Arc;

use crate::config::{AppConfig, RepositoryBackend};

/// Repository host selected by configuration
pub async fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn RepositoryHost>> {
    match config.repository.backend {
        RepositoryBackend::GitHub => {
            log::info!(
                "Using GitHub repository {}/{} on branch {}",
                config.repository.owner,
                config.repository.name,
                config.repository.branch
            );
            Ok(Arc::new(GitHubRepository::new(&config.repository)?))
        }
        RepositoryBackend::Memory => {
            log::info!("Using in-memory repository on branch {}", config.repository.branch);
            let repository = InMemoryRepository::new(&config.repository.branch);
            if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
                let written =
                    seed::load_seed_data(&repository, &config.repository.branch, &config.datasets).await?;
                log::info!("Seeded {} datasets", written);
            }
            Ok(Arc::new(repository))
        }
    }
}

/// Controller over every configured dataset, with each dataset loaded from the
/// branch head. Datasets that fail to load stay unavailable until refreshed.
pub async fn build_controller(
    config: &AppConfig,
) -> anyhow::Result<Arc<DeploymentController<Arc<dyn RepositoryHost>>>> {
    let repository = build_repository(config).await?;
    let registry = Arc::new(DatasetRegistry::new(config.datasets.clone()));
    let controller = DeploymentController::new(repository, registry, config.repository.branch.clone());

    let failures = controller.load_all().await;
    if !failures.is_empty() {
        log::warn!(
            "{} of {} datasets failed to load",
            failures.len(),
            config.datasets.len()
        );
    }
    Ok(Arc::new(controller))
}

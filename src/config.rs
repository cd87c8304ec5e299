use serde::{Deserialize, Serialize};

use crate::model::{DatasetDescriptor, DatasetKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub datasets: Vec<DatasetDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryBackend {
    GitHub,
    /// Process-local repository, seeded with sample datasets when LOAD_SEED_DATA=true
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub backend: RepositoryBackend,
    pub api_base_url: String,
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            repository: RepositoryConfig::default(),
            datasets: default_datasets(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: RepositoryBackend::Memory,
            api_base_url: "https://api.github.com".to_string(),
            owner: String::new(),
            name: String::new(),
            branch: "main".to_string(),
            token: None,
            user_agent: format!("taxonomy-store/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl RepositoryConfig {
    /// Token from config, falling back to GITHUB_TOKEN
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

/// The four datasets served out of the box
pub fn default_datasets() -> Vec<DatasetDescriptor> {
    vec![
        DatasetDescriptor::new(
            "service-taxonomy",
            "data/taxonomy/service-taxonomy.json",
            DatasetKind::Hierarchy,
        ),
        DatasetDescriptor::new(
            "professional-taxonomy",
            "data/taxonomy/professional-taxonomy.json",
            DatasetKind::Hierarchy,
        ),
        DatasetDescriptor::new("skills", "data/taxonomy/skills.json", DatasetKind::Skills),
        DatasetDescriptor::new("tags", "data/taxonomy/tags.json", DatasetKind::Tags),
    ]
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // TAXONOMY__REPOSITORY__OWNER=acme etc.
        config = config.add_source(
            config::Environment::with_prefix("TAXONOMY")
                .separator("__")
                .prefix_separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        app_config.check()?;

        Ok(app_config)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.repository.backend == RepositoryBackend::GitHub
            && (self.repository.owner.is_empty() || self.repository.name.is_empty())
        {
            anyhow::bail!("repository.owner and repository.name are required for the github backend");
        }
        let mut names: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            anyhow::bail!("dataset '{}' is configured twice", pair[0]);
        }
        Ok(())
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:3001");
        assert_eq!(config.repository.backend, RepositoryBackend::Memory);
        assert_eq!(config.datasets.len(), 4);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_github_backend_needs_repository() {
        let mut config = AppConfig::default();
        config.repository.backend = RepositoryBackend::GitHub;
        assert!(config.check().is_err());
        config.repository.owner = "acme".to_string();
        config.repository.name = "taxonomy".to_string();
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_duplicate_dataset_names_rejected() {
        let mut config = AppConfig::default();
        config.datasets.push(DatasetDescriptor::new("tags", "other.json", DatasetKind::Tags));
        assert!(config.check().is_err());
    }
}

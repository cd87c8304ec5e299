use serde::{Deserialize, Serialize};

use crate::model::CommitAuthor;

/// Administrator performing staging and deploy actions, taken from request headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl UserContext {
    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
        }
    }

    /// Context for startup loading and seeding
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_email: Some("system@taxonomy.internal".to_string()),
            user_name: Some("System".to_string()),
        }
    }

    /// Default administrator for local development
    pub fn default_user() -> Self {
        Self {
            user_id: "dev-admin".to_string(),
            user_email: Some("dev@localhost".to_string()),
            user_name: Some("Development Admin".to_string()),
        }
    }

    /// Commit author recorded on the repository host
    pub fn commit_author(&self) -> Option<CommitAuthor> {
        let email = self.user_email.clone()?;
        Some(CommitAuthor {
            name: self.user_name.clone().unwrap_or_else(|| self.user_id.clone()),
            email,
        })
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}

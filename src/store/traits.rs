use thiserror::Error;

use crate::model::{CommitInfo, CreatedCommit, NewCommit, RefComparison, RemoteFile};

/// Failures talking to the repository host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("'{path}' not found at '{git_ref}'")]
    NotFound { path: String, git_ref: String },
    #[error("repository host rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("repository host rate limit reached")]
    RateLimited { retry_after_secs: Option<u64> },
    /// Write precondition failed: the file or branch moved since it was read
    #[error("repository host reported a conflict: {0}")]
    Conflict(String),
    #[error("repository host unreachable: {0}")]
    Transport(String),
    #[error("unexpected response from repository host: {0}")]
    InvalidResponse(String),
}

impl RepositoryError {
    /// Whether the same request may succeed if the caller tries again later.
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepositoryError::RateLimited { .. } | RepositoryError::Transport(_)
        )
    }
}

/// Version-control hosting API used as the persistence layer for dataset files
#[async_trait::async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Read a file as it exists at a branch, tag or commit
    async fn get_file_at_ref(&self, path: &str, git_ref: &str) -> Result<RemoteFile, RepositoryError>;
    /// Compare `base...head`
    async fn compare_refs(&self, base: &str, head: &str) -> Result<RefComparison, RepositoryError>;
    /// Most recent commits reachable from `git_ref`, newest first
    async fn get_commits(&self, git_ref: &str, limit: usize) -> Result<Vec<CommitInfo>, RepositoryError>;
    /// Write one file on a branch as a new commit
    async fn create_commit(&self, commit: NewCommit) -> Result<CreatedCommit, RepositoryError>;

    /// Newest commit on `git_ref`
    async fn head_commit(&self, git_ref: &str) -> Result<CommitInfo, RepositoryError> {
        self.get_commits(git_ref, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::NotFound {
                path: String::new(),
                git_ref: git_ref.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl<T: RepositoryHost + ?Sized> RepositoryHost for std::sync::Arc<T> {
    async fn get_file_at_ref(&self, path: &str, git_ref: &str) -> Result<RemoteFile, RepositoryError> {
        (**self).get_file_at_ref(path, git_ref).await
    }

    async fn compare_refs(&self, base: &str, head: &str) -> Result<RefComparison, RepositoryError> {
        (**self).compare_refs(base, head).await
    }

    async fn get_commits(&self, git_ref: &str, limit: usize) -> Result<Vec<CommitInfo>, RepositoryError> {
        (**self).get_commits(git_ref, limit).await
    }

    async fn create_commit(&self, commit: NewCommit) -> Result<CreatedCommit, RepositoryError> {
        (**self).create_commit(commit).await
    }
}

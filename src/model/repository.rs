use serde::{Deserialize, Serialize};

/// File contents read from the repository host at a given ref
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub content: String,
    /// Host identifier of this exact content, used as a write precondition
    pub blob_sha: String,
}

/// Result of comparing two refs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefComparison {
    /// Commits reachable from head but not from base
    pub ahead_by: u32,
    /// Commits reachable from base but not from head
    pub behind_by: u32,
    /// Paths touched between base and head
    pub files: Vec<String>,
}

/// Metadata of a commit on the repository host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    /// ISO 8601 timestamp
    pub date: String,
    pub url: Option<String>,
}

/// A commit written by `create_commit`, with the blob the written file now has
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCommit {
    pub commit: CommitInfo,
    pub blob_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Request to write one file on a branch as a new commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommit {
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
    /// Blob the write is based on; the host rejects the commit if the file has moved on
    pub expected_blob_sha: Option<String>,
    pub author: Option<CommitAuthor>,
}

/// Lifecycle of a dataset's staged changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DeployPhase {
    /// No pending operations
    Clean,
    /// Pending operations exist and have not been deployed
    Staged,
    /// Commit in flight
    Deploying,
    Deployed { commit_sha: String },
    /// Last deploy failed; staged operations are kept for a retry
    Failed { reason: String },
}

/// Point-in-time view of a dataset against the repository host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStatus {
    pub dataset: String,
    pub branch: String,
    pub has_uncommitted_changes: bool,
    pub pending_operations: usize,
    pub ahead_by: u32,
    pub behind_by: u32,
    /// The dataset file changed on the branch since the base was captured
    pub is_stale: bool,
    /// Commit the current base snapshot was read from
    pub base_ref: String,
    pub head_commit: CommitInfo,
    pub deploy_phase: DeployPhase,
}

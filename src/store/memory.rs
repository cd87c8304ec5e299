use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::model::{CommitInfo, CreatedCommit, NewCommit, RefComparison, RemoteFile};
use crate::store::traits::{RepositoryError, RepositoryHost};

#[derive(Debug, Clone)]
struct StoredCommit {
    sha: String,
    parent: Option<String>,
    message: String,
    author: Option<String>,
    date: String,
    files: BTreeMap<String, String>,
    changed: Vec<String>,
}

impl StoredCommit {
    fn info(&self) -> CommitInfo {
        CommitInfo {
            sha: self.sha.clone(),
            message: self.message.clone(),
            author: self.author.clone(),
            date: self.date.clone(),
            url: Some(format!("memory://commit/{}", self.sha)),
        }
    }
}

#[derive(Default)]
struct RepoState {
    commits: HashMap<String, StoredCommit>,
    branches: HashMap<String, String>,
    fail_next_commit: Option<RepositoryError>,
    commit_gate: Option<Arc<Notify>>,
    read_gate: Option<Arc<Notify>>,
}

impl RepoState {
    fn resolve(&self, git_ref: &str) -> Option<&StoredCommit> {
        let sha = self.branches.get(git_ref).map(String::as_str).unwrap_or(git_ref);
        self.commits.get(sha)
    }

    fn resolve_or_missing(&self, path: &str, git_ref: &str) -> Result<&StoredCommit, RepositoryError> {
        self.resolve(git_ref).ok_or_else(|| RepositoryError::NotFound {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        })
    }

    /// Commit shas from `sha` back to the root, newest first
    fn ancestry(&self, sha: &str) -> Vec<&StoredCommit> {
        let mut chain = Vec::new();
        let mut cursor = self.commits.get(sha);
        while let Some(commit) = cursor {
            chain.push(commit);
            cursor = commit.parent.as_deref().and_then(|p| self.commits.get(p));
        }
        chain
    }

    fn append(
        &mut self,
        branch: &str,
        changes: BTreeMap<String, String>,
        message: &str,
        author: Option<String>,
    ) -> StoredCommit {
        let parent = self.branches.get(branch).cloned();
        let mut files = parent
            .as_deref()
            .and_then(|p| self.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        let changed: Vec<String> = changes.keys().cloned().collect();
        files.extend(changes);

        let date = chrono::Utc::now().to_rfc3339();
        let sha = commit_hash(parent.as_deref(), &files, message, author.as_deref(), &date);
        let commit = StoredCommit {
            sha: sha.clone(),
            parent,
            message: message.to_string(),
            author,
            date,
            files,
            changed,
        };
        self.commits.insert(sha.clone(), commit.clone());
        self.branches.insert(branch.to_string(), sha);
        commit
    }
}

/// Git-like blob identifier of file content
pub fn blob_sha(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("blob {}\0", content.len()));
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn commit_hash(
    parent: Option<&str>,
    files: &BTreeMap<String, String>,
    message: &str,
    author: Option<&str>,
    date: &str,
) -> String {
    let mut hasher = Sha256::new();
    if let Some(parent) = parent {
        hasher.update(format!("parent:{}\n", parent));
    }
    for (path, content) in files {
        hasher.update(format!("file:{}:{}\n", path, blob_sha(content)));
    }
    if let Some(author) = author {
        hasher.update(format!("author:{}\n", author));
    }
    hasher.update(format!("message:{}\n", message));
    hasher.update(format!("date:{}\n", date));
    hex::encode(hasher.finalize())
}

/// Repository host kept entirely in process memory.
///
/// Used by the `memory` backend for local development and by the tests, which also
/// use it to simulate concurrent writers and host failures.
pub struct InMemoryRepository {
    state: Mutex<RepoState>,
}

impl InMemoryRepository {
    /// Repository with one empty root commit on `branch`
    pub fn new(branch: &str) -> Self {
        Self::with_files(branch, Vec::<(String, String)>::new())
    }

    /// Repository whose root commit on `branch` holds `files`
    pub fn with_files<P, C>(branch: &str, files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        let mut state = RepoState::default();
        let files = files
            .into_iter()
            .map(|(path, content)| (path.into(), content.into()))
            .collect();
        state.append(branch, files, "Initial commit", Some("system".to_string()));
        Self {
            state: Mutex::new(state),
        }
    }

    /// Write a file directly, as another client of the host would
    pub fn push_external_commit(&self, branch: &str, path: &str, content: &str, message: &str) -> String {
        let mut state = self.state.lock();
        let changes = BTreeMap::from([(path.to_string(), content.to_string())]);
        let commit = state.append(branch, changes, message, Some("external".to_string()));
        commit.sha
    }

    /// Make the next `create_commit` fail with `error` without writing anything
    pub fn fail_next_commit(&self, error: RepositoryError) {
        self.state.lock().fail_next_commit = Some(error);
    }

    /// Park the next `create_commit` until the returned handle is notified
    pub fn hold_next_commit(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().commit_gate = Some(gate.clone());
        gate
    }

    /// Park the next `get_file_at_ref` until the returned handle is notified
    pub fn hold_next_read(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().read_gate = Some(gate.clone());
        gate
    }

    pub fn file_at(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock();
        state.resolve(branch).and_then(|c| c.files.get(path).cloned())
    }

    pub fn commit_count(&self, branch: &str) -> usize {
        let state = self.state.lock();
        match state.branches.get(branch) {
            Some(head) => state.ancestry(head).len(),
            None => 0,
        }
    }
}

#[async_trait::async_trait]
impl RepositoryHost for InMemoryRepository {
    async fn get_file_at_ref(&self, path: &str, git_ref: &str) -> Result<RemoteFile, RepositoryError> {
        let gate = self.state.lock().read_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state.lock();
        let commit = state.resolve_or_missing(path, git_ref)?;
        let content = commit.files.get(path).ok_or_else(|| RepositoryError::NotFound {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        })?;
        Ok(RemoteFile {
            path: path.to_string(),
            content: content.clone(),
            blob_sha: blob_sha(content),
        })
    }

    async fn compare_refs(&self, base: &str, head: &str) -> Result<RefComparison, RepositoryError> {
        let state = self.state.lock();
        let base_sha = state.resolve_or_missing("", base)?.sha.clone();
        let head_sha = state.resolve_or_missing("", head)?.sha.clone();

        let base_chain = state.ancestry(&base_sha);
        let head_chain = state.ancestry(&head_sha);
        let in_base: HashSet<&str> = base_chain.iter().map(|c| c.sha.as_str()).collect();
        let in_head: HashSet<&str> = head_chain.iter().map(|c| c.sha.as_str()).collect();

        let ahead: Vec<&&StoredCommit> = head_chain
            .iter()
            .filter(|c| !in_base.contains(c.sha.as_str()))
            .collect();
        let behind_by = base_chain
            .iter()
            .filter(|c| !in_head.contains(c.sha.as_str()))
            .count();
        let files: BTreeSet<String> = ahead
            .iter()
            .flat_map(|c| c.changed.iter().cloned())
            .collect();

        Ok(RefComparison {
            ahead_by: ahead.len() as u32,
            behind_by: behind_by as u32,
            files: files.into_iter().collect(),
        })
    }

    async fn get_commits(&self, git_ref: &str, limit: usize) -> Result<Vec<CommitInfo>, RepositoryError> {
        let state = self.state.lock();
        let head = state.resolve_or_missing("", git_ref)?.sha.clone();
        Ok(state
            .ancestry(&head)
            .into_iter()
            .take(limit)
            .map(StoredCommit::info)
            .collect())
    }

    async fn create_commit(&self, commit: NewCommit) -> Result<CreatedCommit, RepositoryError> {
        let gate = self.state.lock().commit_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_commit.take() {
            return Err(error);
        }

        let current = state
            .resolve(&commit.branch)
            .and_then(|c| c.files.get(&commit.path))
            .map(|content| blob_sha(content));
        if current != commit.expected_blob_sha {
            return Err(RepositoryError::Conflict(format!(
                "{} does not match the expected blob",
                commit.path
            )));
        }

        let author = commit.author.as_ref().map(|a| a.name.clone());
        let changes = BTreeMap::from([(commit.path.clone(), commit.content.clone())]);
        let stored = state.append(&commit.branch, changes, &commit.message, author);
        Ok(CreatedCommit {
            commit: stored.info(),
            blob_sha: blob_sha(&commit.content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_commit(content: &str, expected: Option<String>) -> NewCommit {
        NewCommit {
            path: "data/tags.json".to_string(),
            content: content.to_string(),
            message: "update tags".to_string(),
            branch: "main".to_string(),
            expected_blob_sha: expected,
            author: None,
        }
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let repo = InMemoryRepository::with_files("main", [("data/tags.json", "[]\n")]);
        let before = repo.get_file_at_ref("data/tags.json", "main").await.unwrap();
        assert_eq!(before.blob_sha, blob_sha("[]\n"));

        let created = repo
            .create_commit(new_commit("[1]\n", Some(before.blob_sha.clone())))
            .await
            .unwrap();
        assert_eq!(created.blob_sha, blob_sha("[1]\n"));

        let at_commit = repo
            .get_file_at_ref("data/tags.json", &created.commit.sha)
            .await
            .unwrap();
        assert_eq!(at_commit.content, "[1]\n");
        // the old commit still reads the old content
        let root = repo.get_commits("main", 10).await.unwrap().pop().unwrap();
        let old = repo.get_file_at_ref("data/tags.json", &root.sha).await.unwrap();
        assert_eq!(old.content, "[]\n");
    }

    #[tokio::test]
    async fn test_stale_blob_is_a_conflict() {
        let repo = InMemoryRepository::with_files("main", [("data/tags.json", "[]\n")]);
        let original = blob_sha("[]\n");
        repo.push_external_commit("main", "data/tags.json", "[2]\n", "external edit");

        let err = repo
            .create_commit(new_commit("[1]\n", Some(original)))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(repo.file_at("main", "data/tags.json").as_deref(), Some("[2]\n"));
    }

    #[tokio::test]
    async fn test_compare_lists_changed_files() {
        let repo = InMemoryRepository::with_files("main", [("a.json", "[]\n"), ("b.json", "[]\n")]);
        let base = repo.head_commit("main").await.unwrap().sha;
        repo.push_external_commit("main", "b.json", "[1]\n", "touch b");

        let comparison = repo.compare_refs(&base, "main").await.unwrap();
        assert_eq!(comparison.ahead_by, 1);
        assert_eq!(comparison.behind_by, 0);
        assert_eq!(comparison.files, vec!["b.json".to_string()]);

        let same = repo.compare_refs("main", "main").await.unwrap();
        assert_eq!(same.ahead_by, 0);
        assert!(same.files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_and_ref() {
        let repo = InMemoryRepository::new("main");
        assert!(matches!(
            repo.get_file_at_ref("nope.json", "main").await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            repo.get_commits("no-such-branch", 1).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let repo = InMemoryRepository::new("main");
        repo.fail_next_commit(RepositoryError::Transport("connection reset".to_string()));
        let err = repo.create_commit(new_commit("[]\n", None)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.commit_count("main"), 1);

        repo.create_commit(new_commit("[]\n", None)).await.unwrap();
        assert_eq!(repo.commit_count("main"), 2);
    }
}

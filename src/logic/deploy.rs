use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;

use crate::logic::staging::{diff_datasets, SessionInfo, StagingError, StagingSession};
use crate::logic::validate::{validate_against_base, validate_dataset, ValidationError};
use crate::model::format::{parse_dataset, serialize_dataset, FormatError};
use crate::model::{
    ChangeEntry, CommitInfo, CreatedCommit, DatasetDescriptor, DeployPhase, DiffSummary, NewCommit,
    PendingOperation, RepositoryStatus, TaxonomyDataset, UserContext,
};
use crate::store::{DatasetRegistry, RegistryError, RepositoryError, RepositoryHost};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("dataset '{0}' has not been loaded from the repository yet")]
    NotLoaded(String),
    #[error("no staging session is active for '{dataset}'")]
    NoSession { dataset: String },
    #[error("a staging session for '{dataset}' is already active (started by {started_by})")]
    SessionActive { dataset: String, started_by: String },
    #[error("nothing to deploy for '{dataset}'")]
    NothingToDeploy { dataset: String },
    #[error("a deploy of '{dataset}' is already in progress")]
    DeployInProgress { dataset: String },
    #[error("'{dataset}' failed validation: {}", .errors.iter().join("; "))]
    ValidationFailed {
        dataset: String,
        errors: Vec<ValidationError>,
    },
    #[error("'{dataset}' changed on the remote since {base_ref}: {detail}")]
    RemoteStale {
        dataset: String,
        base_ref: String,
        detail: String,
    },
    #[error(transparent)]
    Transport(RepositoryError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Serialization(#[from] FormatError),
}

impl DeployError {
    /// Whether retrying the same request later may succeed without other changes
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployError::Transport(e) => e.is_retryable(),
            DeployError::DeployInProgress { .. } => true,
            _ => false,
        }
    }
}

impl From<RegistryError> for DeployError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownDataset(name) => DeployError::UnknownDataset(name),
            RegistryError::NotLoaded(name) => DeployError::NotLoaded(name),
            RegistryError::Index { dataset, source } => DeployError::ValidationFailed {
                dataset,
                errors: vec![source],
            },
            RegistryError::Staging(e) => DeployError::Staging(e),
        }
    }
}

/// Result of a successful deploy
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeployOutcome {
    pub dataset: String,
    pub commit: CommitInfo,
    pub summary: DiffSummary,
}

/// A dataset snapshot read from the repository
struct Snapshot {
    dataset: Arc<TaxonomyDataset>,
    commit_sha: String,
    blob_sha: String,
}

/// Everything a deploy needs, copied out of the slot before any I/O
struct PreparedDeploy {
    descriptor: DatasetDescriptor,
    base: Arc<TaxonomyDataset>,
    effective: Arc<TaxonomyDataset>,
    summary: DiffSummary,
    base_ref: String,
    base_blob_sha: String,
}

/// Puts the slot back in a consistent phase if a deploy future is dropped midway
struct DeployGuard<'a> {
    registry: &'a DatasetRegistry,
    dataset: String,
    commit_issued: bool,
    finished: bool,
}

impl<'a> DeployGuard<'a> {
    fn new(registry: &'a DatasetRegistry, dataset: &str) -> Self {
        Self {
            registry,
            dataset: dataset.to_string(),
            commit_issued: false,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for DeployGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let commit_issued = self.commit_issued;
        let _ = self.registry.with_slot(&self.dataset, |slot| {
            if !slot.is_deploying() {
                return;
            }
            let phase = if commit_issued {
                DeployPhase::Failed {
                    reason: "deploy interrupted after the commit was sent; outcome unknown, refresh status before retrying".to_string(),
                }
            } else if slot.session().is_some_and(|s| !s.is_empty()) {
                DeployPhase::Staged
            } else {
                DeployPhase::Clean
            };
            slot.set_phase(phase);
        });
        log::warn!("Deploy of '{}' was interrupted", self.dataset);
    }
}

/// Owns the staging sessions of every dataset and moves them through
/// Clean → Staged → Deploying → Deployed/Failed against a repository host.
pub struct DeploymentController<R: RepositoryHost> {
    repository: R,
    registry: Arc<DatasetRegistry>,
    branch: String,
}

impl<R: RepositoryHost> DeploymentController<R> {
    pub fn new(repository: R, registry: Arc<DatasetRegistry>, branch: impl Into<String>) -> Self {
        Self {
            repository,
            registry,
            branch: branch.into(),
        }
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Read and validate a dataset file at a ref. A missing file is an empty dataset.
    async fn fetch_snapshot(
        &self,
        descriptor: &DatasetDescriptor,
        git_ref: &str,
    ) -> Result<Snapshot, DeployError> {
        let commit = self
            .repository
            .head_commit(git_ref)
            .await
            .map_err(DeployError::Transport)?;

        let (dataset, blob_sha) = match self
            .repository
            .get_file_at_ref(&descriptor.path, &commit.sha)
            .await
        {
            Ok(file) => {
                let dataset = parse_dataset(descriptor, &file.content)?;
                if serialize_dataset(&dataset)? != file.content {
                    log::warn!(
                        "'{}' at {} is not in canonical form; the next deploy rewrites it",
                        descriptor.path,
                        commit.sha
                    );
                }
                (dataset, file.blob_sha)
            }
            Err(RepositoryError::NotFound { .. }) => {
                log::info!(
                    "'{}' does not exist at {}; starting from an empty dataset",
                    descriptor.path,
                    commit.sha
                );
                (TaxonomyDataset::empty(descriptor), String::new())
            }
            Err(e) => return Err(DeployError::Transport(e)),
        };

        validate_dataset(&dataset).map_err(|errors| DeployError::ValidationFailed {
            dataset: descriptor.name.clone(),
            errors,
        })?;

        Ok(Snapshot {
            dataset: Arc::new(dataset),
            commit_sha: commit.sha,
            blob_sha,
        })
    }

    /// Load the published snapshot of one dataset from the branch head
    pub async fn refresh(&self, name: &str) -> Result<String, DeployError> {
        let descriptor = self.registry.with_slot(name, |slot| {
            if let Some(session) = slot.session() {
                return Err(DeployError::SessionActive {
                    dataset: name.to_string(),
                    started_by: session.info().started_by,
                });
            }
            if slot.is_deploying() {
                return Err(DeployError::DeployInProgress {
                    dataset: name.to_string(),
                });
            }
            Ok(slot.descriptor.clone())
        })??;

        let snapshot = self.fetch_snapshot(&descriptor, &self.branch).await?;
        let commit_sha = snapshot.commit_sha.clone();

        self.registry.with_slot(name, |slot| {
            // a session may have started while we were reading
            if let Some(session) = slot.session() {
                return Err(DeployError::SessionActive {
                    dataset: name.to_string(),
                    started_by: session.info().started_by,
                });
            }
            log::info!(
                "Loaded '{}' at {} ({} items)",
                name,
                snapshot.commit_sha,
                snapshot.dataset.len()
            );
            slot.replace_base(snapshot.dataset, snapshot.commit_sha, snapshot.blob_sha);
            slot.set_phase(DeployPhase::Clean);
            Ok(())
        })??;

        Ok(commit_sha)
    }

    /// Load every dataset; failures are logged and returned, the rest still load
    pub async fn load_all(&self) -> Vec<(String, DeployError)> {
        let mut failures = Vec::new();
        for name in self.registry.names() {
            if let Err(e) = self.refresh(name).await {
                log::error!("Failed to load dataset '{}': {}", name, e);
                failures.push((name.clone(), e));
            }
        }
        failures
    }

    /// Open a session for `admin`, optionally against another ref and with
    /// previously recorded operations
    pub async fn start_session(
        &self,
        name: &str,
        base_ref: Option<&str>,
        operations: Vec<PendingOperation>,
        admin: &UserContext,
    ) -> Result<SessionInfo, DeployError> {
        let (descriptor, published) = self.registry.with_slot(name, |slot| {
            self.ensure_no_session(slot.session(), name)?;
            let published = Snapshot {
                dataset: slot.base().clone(),
                commit_sha: slot.base_ref()?.to_string(),
                blob_sha: slot.base_blob_sha().to_string(),
            };
            Ok::<_, DeployError>((slot.descriptor.clone(), published))
        })??;

        let snapshot = match base_ref {
            Some(git_ref) if git_ref != published.commit_sha => {
                self.fetch_snapshot(&descriptor, git_ref).await?
            }
            _ => published,
        };

        let session = if operations.is_empty() {
            StagingSession::new(
                snapshot.dataset,
                snapshot.commit_sha,
                snapshot.blob_sha,
                admin.user_id.clone(),
            )
        } else {
            StagingSession::with_operations(
                snapshot.dataset,
                snapshot.commit_sha,
                snapshot.blob_sha,
                admin.user_id.clone(),
                operations,
            )?
        };
        let info = session.info();

        self.registry.with_slot(name, |slot| {
            self.ensure_no_session(slot.session(), name)?;
            let phase = if session.is_empty() {
                DeployPhase::Clean
            } else {
                DeployPhase::Staged
            };
            slot.set_session(session);
            slot.set_phase(phase);
            Ok::<_, DeployError>(())
        })??;

        log::info!(
            "{} started a staging session on '{}' at {}",
            admin.user_id,
            name,
            info.base_ref
        );
        Ok(info)
    }

    fn ensure_no_session(&self, session: Option<&StagingSession>, name: &str) -> Result<(), DeployError> {
        match session {
            Some(existing) => Err(DeployError::SessionActive {
                dataset: name.to_string(),
                started_by: existing.info().started_by,
            }),
            None => Ok(()),
        }
    }

    pub fn session_info(&self, name: &str) -> Result<Option<SessionInfo>, DeployError> {
        Ok(self
            .registry
            .with_slot(name, |slot| slot.session().map(StagingSession::info))?)
    }

    /// Validate and append one operation to the active session
    pub fn stage(&self, name: &str, operation: PendingOperation) -> Result<PendingOperation, DeployError> {
        self.registry.with_slot(name, |slot| {
            if slot.is_deploying() {
                return Err(DeployError::DeployInProgress {
                    dataset: name.to_string(),
                });
            }
            let session = slot.session_mut().ok_or_else(|| DeployError::NoSession {
                dataset: name.to_string(),
            })?;
            let staged = session.stage(operation)?;
            log::debug!(
                "Staged {:?} of '{}' on '{}'",
                staged.kind(),
                staged.item_id(),
                name
            );
            slot.set_phase(DeployPhase::Staged);
            Ok(staged)
        })?
    }

    /// Drop every pending operation for `item_id`; returns how many were removed
    pub fn unstage(&self, name: &str, item_id: &str) -> Result<usize, DeployError> {
        self.registry.with_slot(name, |slot| {
            if slot.is_deploying() {
                return Err(DeployError::DeployInProgress {
                    dataset: name.to_string(),
                });
            }
            let session = slot.session_mut().ok_or_else(|| DeployError::NoSession {
                dataset: name.to_string(),
            })?;
            let removed = session.unstage(item_id)?;
            if session.is_empty() {
                slot.set_phase(DeployPhase::Clean);
            }
            Ok(removed)
        })?
    }

    /// Close the session and forget its operations; returns how many were dropped
    pub fn discard(&self, name: &str) -> Result<usize, DeployError> {
        self.registry.with_slot(name, |slot| {
            if slot.is_deploying() {
                return Err(DeployError::DeployInProgress {
                    dataset: name.to_string(),
                });
            }
            let session = slot.take_session().ok_or_else(|| DeployError::NoSession {
                dataset: name.to_string(),
            })?;
            slot.set_phase(DeployPhase::Clean);
            log::info!(
                "Discarded {} pending operations on '{}'",
                session.operations().len(),
                name
            );
            Ok(session.operations().len())
        })?
    }

    pub fn pending(&self, name: &str) -> Result<Vec<PendingOperation>, DeployError> {
        Ok(self.registry.with_slot(name, |slot| {
            slot.session()
                .map(|s| s.operations().to_vec())
                .unwrap_or_default()
        })?)
    }

    /// Net changes of the active session against its base; empty without a session
    pub fn diff(&self, name: &str) -> Result<Vec<ChangeEntry>, DeployError> {
        self.registry.with_slot(name, |slot| match slot.session() {
            Some(session) => Ok(session.diff()?),
            None => Ok(Vec::new()),
        })?
    }

    pub fn deploy_phase(&self, name: &str) -> Result<DeployPhase, DeployError> {
        Ok(self.registry.with_slot(name, |slot| slot.phase().clone())?)
    }

    /// Compare the session base (or the published base) with the branch head.
    /// Makes no changes anywhere.
    pub async fn status(&self, name: &str) -> Result<RepositoryStatus, DeployError> {
        let (path, base_ref, pending, has_changes, phase) =
            self.registry.with_slot(name, |slot| {
                let (base_ref, pending, has_changes) = match slot.session() {
                    Some(session) => (
                        session.base_ref().to_string(),
                        session.operations().len(),
                        session.has_changes()?,
                    ),
                    None => (slot.base_ref()?.to_string(), 0, false),
                };
                Ok::<_, DeployError>((
                    slot.descriptor.path.clone(),
                    base_ref,
                    pending,
                    has_changes,
                    slot.phase().clone(),
                ))
            })??;

        let head = self
            .repository
            .head_commit(&self.branch)
            .await
            .map_err(DeployError::Transport)?;

        let (ahead_by, behind_by, is_stale) = if head.sha == base_ref {
            (0, 0, false)
        } else {
            let comparison = self
                .repository
                .compare_refs(&base_ref, &head.sha)
                .await
                .map_err(DeployError::Transport)?;
            let touched = comparison.files.iter().any(|f| f == &path);
            if touched {
                log::warn!("'{}' changed on {} since {}", path, self.branch, base_ref);
            }
            (comparison.ahead_by, comparison.behind_by, touched)
        };

        Ok(RepositoryStatus {
            dataset: name.to_string(),
            branch: self.branch.clone(),
            has_uncommitted_changes: has_changes,
            pending_operations: pending,
            ahead_by,
            behind_by,
            is_stale,
            base_ref,
            head_commit: head,
            deploy_phase: phase,
        })
    }

    /// Validate the effective dataset and write it as one commit.
    ///
    /// On success the deployed dataset becomes the published base and the session
    /// closes. On any failure the session and its operations are kept untouched.
    pub async fn deploy(&self, name: &str, admin: &UserContext) -> Result<DeployOutcome, DeployError> {
        let prepared = self.registry.with_slot(name, |slot| {
            if slot.is_deploying() {
                return Err(DeployError::DeployInProgress {
                    dataset: name.to_string(),
                });
            }
            let session = slot.session().ok_or_else(|| DeployError::NoSession {
                dataset: name.to_string(),
            })?;
            let effective = session.effective_dataset()?;
            let changes = diff_datasets(session.base(), &effective);
            if changes.is_empty() {
                return Err(DeployError::NothingToDeploy {
                    dataset: name.to_string(),
                });
            }
            let prepared = PreparedDeploy {
                descriptor: slot.descriptor.clone(),
                base: session.base().clone(),
                effective: Arc::new(effective),
                summary: DiffSummary::from_entries(&changes),
                base_ref: session.base_ref().to_string(),
                base_blob_sha: session.base_blob_sha().to_string(),
            };
            slot.set_phase(DeployPhase::Deploying);
            Ok(prepared)
        })??;

        let mut guard = DeployGuard::new(&self.registry, name);
        let result = self.write_commit(&prepared, admin, &mut guard).await;

        let outcome = self.registry.with_slot(name, |slot| match result {
            Ok(created) => {
                slot.replace_base(
                    prepared.effective.clone(),
                    created.commit.sha.clone(),
                    created.blob_sha,
                );
                slot.take_session();
                slot.set_phase(DeployPhase::Deployed {
                    commit_sha: created.commit.sha.clone(),
                });
                log::info!(
                    "{} deployed '{}' as {} ({})",
                    admin.user_id,
                    name,
                    created.commit.sha,
                    prepared.summary.commit_message(name)
                );
                Ok(DeployOutcome {
                    dataset: name.to_string(),
                    commit: created.commit,
                    summary: prepared.summary.clone(),
                })
            }
            Err(error) => {
                log::warn!("Deploy of '{}' failed: {}", name, error);
                slot.set_phase(DeployPhase::Failed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        });
        guard.finish();
        outcome?
    }

    async fn write_commit(
        &self,
        prepared: &PreparedDeploy,
        admin: &UserContext,
        guard: &mut DeployGuard<'_>,
    ) -> Result<CreatedCommit, DeployError> {
        let dataset_name = prepared.descriptor.name.clone();

        let mut errors = validate_dataset(&prepared.effective).err().unwrap_or_default();
        if let Err(changed) = validate_against_base(&prepared.base, &prepared.effective) {
            errors.extend(changed);
        }
        if !errors.is_empty() {
            return Err(DeployError::ValidationFailed {
                dataset: dataset_name,
                errors,
            });
        }
        let content = serialize_dataset(&prepared.effective)?;

        let stale = |detail: String| DeployError::RemoteStale {
            dataset: dataset_name.clone(),
            base_ref: prepared.base_ref.clone(),
            detail,
        };

        match self
            .repository
            .get_file_at_ref(&prepared.descriptor.path, &self.branch)
            .await
        {
            Ok(remote) if remote.blob_sha != prepared.base_blob_sha => {
                return Err(stale(format!(
                    "{} was modified on {}",
                    prepared.descriptor.path, self.branch
                )));
            }
            Ok(_) => {}
            Err(RepositoryError::NotFound { .. }) if !prepared.base_blob_sha.is_empty() => {
                return Err(stale(format!(
                    "{} was removed from {}",
                    prepared.descriptor.path, self.branch
                )));
            }
            Err(RepositoryError::NotFound { .. }) => {}
            Err(e) => return Err(DeployError::Transport(e)),
        }

        let commit = NewCommit {
            path: prepared.descriptor.path.clone(),
            content,
            message: prepared.summary.commit_message(&dataset_name),
            branch: self.branch.clone(),
            expected_blob_sha: Some(prepared.base_blob_sha.clone()).filter(|s| !s.is_empty()),
            author: admin.commit_author(),
        };

        guard.commit_issued = true;
        self.repository
            .create_commit(commit)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(detail) => stale(detail),
                other => DeployError::Transport(other),
            })
    }
}

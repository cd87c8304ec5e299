use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::logic::index::TaxonomyIndex;
use crate::logic::staging::{StagingError, StagingSession};
use crate::logic::validate::ValidationError;
use crate::model::{
    DatasetDescriptor, DatasetKind, DeployPhase, ItemLevel, TaxonomyDataset, TaxonomyItem,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("dataset '{0}' has not been loaded from the repository yet")]
    NotLoaded(String),
    #[error("dataset '{dataset}' cannot be indexed: {source}")]
    Index {
        dataset: String,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Which version of a dataset a read goes against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadView {
    /// The last loaded or deployed snapshot
    #[default]
    Published,
    /// The published snapshot with the active session's operations applied
    Staged,
}

/// Everything the service holds for one dataset
#[derive(Debug)]
pub struct DatasetSlot {
    pub descriptor: DatasetDescriptor,
    base: Arc<TaxonomyDataset>,
    base_ref: Option<String>,
    base_blob_sha: String,
    session: Option<StagingSession>,
    phase: DeployPhase,
    published_index: Option<Arc<TaxonomyIndex>>,
    staged_index: Option<Arc<TaxonomyIndex>>,
}

impl DatasetSlot {
    fn new(descriptor: DatasetDescriptor) -> Self {
        Self {
            base: Arc::new(TaxonomyDataset::empty(&descriptor)),
            descriptor,
            base_ref: None,
            base_blob_sha: String::new(),
            session: None,
            phase: DeployPhase::Clean,
            published_index: None,
            staged_index: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_loaded(&self) -> bool {
        self.base_ref.is_some()
    }

    pub fn base(&self) -> &Arc<TaxonomyDataset> {
        &self.base
    }

    /// Commit the published snapshot was read from
    pub fn base_ref(&self) -> Result<&str, RegistryError> {
        self.base_ref
            .as_deref()
            .ok_or_else(|| RegistryError::NotLoaded(self.descriptor.name.clone()))
    }

    /// Empty when the file did not exist at `base_ref`
    pub fn base_blob_sha(&self) -> &str {
        &self.base_blob_sha
    }

    /// Swap in a new published snapshot; both index views are rebuilt lazily
    pub fn replace_base(&mut self, base: Arc<TaxonomyDataset>, base_ref: String, blob_sha: String) {
        self.base = base;
        self.base_ref = Some(base_ref);
        self.base_blob_sha = blob_sha;
        self.published_index = None;
        self.staged_index = None;
    }

    pub fn session(&self) -> Option<&StagingSession> {
        self.session.as_ref()
    }

    /// Mutable access to the session; the staged view is dropped since the caller
    /// may change the operation list
    pub fn session_mut(&mut self) -> Option<&mut StagingSession> {
        self.staged_index = None;
        self.session.as_mut()
    }

    pub fn set_session(&mut self, session: StagingSession) {
        self.staged_index = None;
        self.session = Some(session);
    }

    pub fn take_session(&mut self) -> Option<StagingSession> {
        self.staged_index = None;
        self.session.take()
    }

    pub fn phase(&self) -> &DeployPhase {
        &self.phase
    }

    pub fn set_phase(&mut self, phase: DeployPhase) {
        self.phase = phase;
    }

    pub fn is_deploying(&self) -> bool {
        self.phase == DeployPhase::Deploying
    }

    /// Index for `view`, built on first use after a change
    pub fn index(&mut self, view: ReadView) -> Result<Arc<TaxonomyIndex>, RegistryError> {
        if !self.is_loaded() {
            return Err(RegistryError::NotLoaded(self.descriptor.name.clone()));
        }
        match view {
            ReadView::Staged if self.session.is_some() => {
                if let Some(index) = &self.staged_index {
                    return Ok(index.clone());
                }
                let effective = match &self.session {
                    Some(session) => Arc::new(session.effective_dataset()?),
                    None => self.base.clone(),
                };
                let index = Arc::new(self.build_index(effective)?);
                self.staged_index = Some(index.clone());
                Ok(index)
            }
            // without a session the staged view is the published one
            _ => {
                if let Some(index) = &self.published_index {
                    return Ok(index.clone());
                }
                let index = Arc::new(self.build_index(self.base.clone())?);
                self.published_index = Some(index.clone());
                Ok(index)
            }
        }
    }

    fn build_index(&self, dataset: Arc<TaxonomyDataset>) -> Result<TaxonomyIndex, RegistryError> {
        TaxonomyIndex::build(dataset).map_err(|source| RegistryError::Index {
            dataset: self.descriptor.name.clone(),
            source,
        })
    }
}

/// Summary row for listing datasets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    pub path: String,
    pub kind: DatasetKind,
    pub loaded: bool,
    pub item_count: usize,
    pub base_ref: Option<String>,
    pub has_session: bool,
    pub deploy_phase: DeployPhase,
}

/// All configured datasets, each behind its own lock.
///
/// Slot locks are synchronous and must never be held across an `.await`; async
/// callers copy what they need out, do their I/O, then lock again to apply results.
#[derive(Debug)]
pub struct DatasetRegistry {
    slots: HashMap<String, Mutex<DatasetSlot>>,
    order: Vec<String>,
}

impl DatasetRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = DatasetDescriptor>) -> Self {
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for descriptor in descriptors {
            if slots.contains_key(&descriptor.name) {
                log::warn!("Ignoring duplicate dataset '{}'", descriptor.name);
                continue;
            }
            order.push(descriptor.name.clone());
            slots.insert(descriptor.name.clone(), Mutex::new(DatasetSlot::new(descriptor)));
        }
        Self { slots, order }
    }

    /// Dataset names in configuration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn descriptor(&self, name: &str) -> Result<DatasetDescriptor, RegistryError> {
        self.with_slot(name, |slot| slot.descriptor.clone())
    }

    /// Run `f` with exclusive access to one dataset
    pub fn with_slot<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut DatasetSlot) -> T,
    ) -> Result<T, RegistryError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDataset(name.to_string()))?;
        let mut guard = slot.lock();
        Ok(f(&mut guard))
    }

    pub fn summaries(&self) -> Vec<DatasetSummary> {
        self.order
            .iter()
            .filter_map(|name| {
                self.with_slot(name, |slot| DatasetSummary {
                    name: slot.descriptor.name.clone(),
                    path: slot.descriptor.path.clone(),
                    kind: slot.descriptor.kind,
                    loaded: slot.is_loaded(),
                    item_count: slot.base.len(),
                    base_ref: slot.base_ref.clone(),
                    has_session: slot.session.is_some(),
                    deploy_phase: slot.phase.clone(),
                })
                .ok()
            })
            .collect()
    }

    pub fn index(&self, name: &str, view: ReadView) -> Result<Arc<TaxonomyIndex>, RegistryError> {
        self.with_slot(name, |slot| slot.index(view))?
    }

    pub fn get_dataset(&self, name: &str, view: ReadView) -> Result<Arc<TaxonomyDataset>, RegistryError> {
        Ok(self.index(name, view)?.dataset().clone())
    }

    pub fn find_by_id(
        &self,
        name: &str,
        id: &str,
        view: ReadView,
    ) -> Result<Option<TaxonomyItem>, RegistryError> {
        Ok(self.index(name, view)?.find_by_id(id).cloned())
    }

    pub fn find_by_path<S: AsRef<str>>(
        &self,
        name: &str,
        slugs: &[S],
        view: ReadView,
    ) -> Result<Option<TaxonomyItem>, RegistryError> {
        Ok(self.index(name, view)?.find_by_slug_path(slugs).cloned())
    }

    /// Root first, the item itself last
    pub fn ancestor_path(
        &self,
        name: &str,
        id: &str,
        view: ReadView,
    ) -> Result<Option<Vec<TaxonomyItem>>, RegistryError> {
        let index = self.index(name, view)?;
        Ok(index
            .ancestor_path(id)
            .map(|path| path.into_iter().cloned().collect()))
    }

    /// Items of `level` carrying `slug`, across parents
    pub fn find_by_level_slug(
        &self,
        name: &str,
        level: ItemLevel,
        slug: &str,
        view: ReadView,
    ) -> Result<Vec<TaxonomyItem>, RegistryError> {
        let index = self.index(name, view)?;
        Ok(index.by_level_slug(level, slug).into_iter().cloned().collect())
    }

    pub fn children(
        &self,
        name: &str,
        parent_id: Option<&str>,
        view: ReadView,
    ) -> Result<Vec<TaxonomyItem>, RegistryError> {
        let index = self.index(name, view)?;
        Ok(index.children(parent_id).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PendingOperation;

    fn registry_with_base() -> DatasetRegistry {
        let descriptor = DatasetDescriptor::new("svc", "data/svc.json", DatasetKind::Hierarchy);
        let registry = DatasetRegistry::new(vec![descriptor.clone()]);
        let base = TaxonomyDataset::new(
            "svc",
            DatasetKind::Hierarchy,
            vec![
                TaxonomyItem::category("c1", "home", "Home"),
                TaxonomyItem::subcategory("s1", "c1", "plumbing", "Plumbing"),
            ],
        );
        registry
            .with_slot("svc", |slot| {
                slot.replace_base(Arc::new(base), "abc123".to_string(), "blob1".to_string())
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_unknown_and_unloaded() {
        let registry = DatasetRegistry::new(vec![DatasetDescriptor::new(
            "tags",
            "data/tags.json",
            DatasetKind::Tags,
        )]);
        assert_eq!(
            registry.find_by_id("nope", "x", ReadView::Published),
            Err(RegistryError::UnknownDataset("nope".to_string()))
        );
        assert_eq!(
            registry.find_by_id("tags", "x", ReadView::Published),
            Err(RegistryError::NotLoaded("tags".to_string()))
        );
    }

    #[test]
    fn test_views_diverge_with_session() {
        let registry = registry_with_base();
        registry
            .with_slot("svc", |slot| {
                let mut session =
                    StagingSession::new(slot.base().clone(), "abc123", "blob1", "admin");
                session
                    .stage(PendingOperation::create(
                        TaxonomyItem::subcategory("s2", "c1", "electric", "Electric"),
                        "admin",
                    ))
                    .unwrap();
                slot.set_session(session);
            })
            .unwrap();

        assert!(registry.find_by_path("svc", &["home", "electric"], ReadView::Published).unwrap().is_none());
        let staged = registry
            .find_by_path("svc", &["home", "electric"], ReadView::Staged)
            .unwrap()
            .unwrap();
        assert_eq!(staged.id, "s2");
        assert_eq!(registry.children("svc", Some("c1"), ReadView::Staged).unwrap().len(), 2);
        assert_eq!(registry.children("svc", Some("c1"), ReadView::Published).unwrap().len(), 1);
    }

    #[test]
    fn test_staged_view_follows_session_changes() {
        let registry = registry_with_base();
        registry
            .with_slot("svc", |slot| {
                let session = StagingSession::new(slot.base().clone(), "abc123", "blob1", "admin");
                slot.set_session(session);
            })
            .unwrap();
        assert_eq!(registry.get_dataset("svc", ReadView::Staged).unwrap().len(), 2);

        registry
            .with_slot("svc", |slot| {
                if let Some(session) = slot.session_mut() {
                    session
                        .stage(PendingOperation::create(TaxonomyItem::category("c2", "garden", "Garden"), "admin"))
                        .unwrap();
                }
            })
            .unwrap();
        assert_eq!(registry.get_dataset("svc", ReadView::Staged).unwrap().len(), 3);

        let path = registry.ancestor_path("svc", "s1", ReadView::Staged).unwrap().unwrap();
        assert_eq!(path.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["c1", "s1"]);
    }
}

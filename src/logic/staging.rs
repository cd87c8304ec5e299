use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::logic::slug::unique_slug;
use crate::logic::validate::{check_immutable, validate_dataset, validate_item, ValidationError};
use crate::model::{
    generate_id, ChangeEntry, ChangeType, DiffSummary, Id, Operation, PendingOperation,
    TaxonomyDataset, TaxonomyItem,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("item '{id}' does not exist in the effective dataset")]
    ItemNotFound { id: String },
    #[error("item '{id}' already exists")]
    DuplicateId { id: String },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("no pending operations for item '{id}'")]
    NotStaged { id: String },
    #[error("unstaging '{id}' would leave the dataset invalid: {}", .errors.iter().join("; "))]
    WouldInvalidate {
        id: String,
        errors: Vec<ValidationError>,
    },
}

/// Serializable description of a session, without its operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub dataset: String,
    pub base_ref: String,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub pending_operations: usize,
}

/// An administrator's pending changes against one base snapshot of a dataset.
///
/// The base is never modified; everything else is derived by folding the operation
/// list over it in insertion order.
#[derive(Debug, Clone)]
pub struct StagingSession {
    base: Arc<TaxonomyDataset>,
    base_ref: String,
    base_blob_sha: String,
    started_by: String,
    started_at: DateTime<Utc>,
    operations: Vec<PendingOperation>,
}

impl StagingSession {
    pub fn new(
        base: Arc<TaxonomyDataset>,
        base_ref: impl Into<String>,
        base_blob_sha: impl Into<String>,
        started_by: impl Into<String>,
    ) -> Self {
        Self {
            base,
            base_ref: base_ref.into(),
            base_blob_sha: base_blob_sha.into(),
            started_by: started_by.into(),
            started_at: Utc::now(),
            operations: Vec::new(),
        }
    }

    /// Resume a previously recorded changeset on top of `base`.
    ///
    /// The operations must fold: no updates of missing items, and no item changes
    /// its id or level. The remaining structural rules are only enforced by the
    /// final check at deploy time, so a changeset carried over to a newer base can
    /// still be inspected and fixed.
    pub fn with_operations(
        base: Arc<TaxonomyDataset>,
        base_ref: impl Into<String>,
        base_blob_sha: impl Into<String>,
        started_by: impl Into<String>,
        operations: Vec<PendingOperation>,
    ) -> Result<Self, StagingError> {
        fold(&base, operations.iter().map(|p| &p.op))?;
        let mut session = Self::new(base, base_ref, base_blob_sha, started_by);
        session.operations = operations;
        Ok(session)
    }

    pub fn base(&self) -> &Arc<TaxonomyDataset> {
        &self.base
    }

    pub fn base_ref(&self) -> &str {
        &self.base_ref
    }

    pub fn base_blob_sha(&self) -> &str {
        &self.base_blob_sha
    }

    pub fn operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            dataset: self.base.name.clone(),
            base_ref: self.base_ref.clone(),
            started_by: self.started_by.clone(),
            started_at: self.started_at,
            pending_operations: self.operations.len(),
        }
    }

    /// Validate an operation against the effective dataset and append it.
    ///
    /// Creates without an id get a generated one and empty slugs are derived from
    /// the label; the normalized operation is returned.
    pub fn stage(&mut self, pending: PendingOperation) -> Result<PendingOperation, StagingError> {
        let current = self.effective_dataset()?;
        let PendingOperation {
            op,
            staged_at,
            staged_by,
        } = pending;

        let op = match op {
            Operation::Create { mut item } => {
                if item.id.trim().is_empty() {
                    item.id = generate_id();
                }
                if current.contains(&item.id) {
                    return Err(StagingError::DuplicateId { id: item.id });
                }
                if item.slug.is_empty() {
                    item.slug = derive_slug(&item, &current);
                }
                // re-creating a deleted base item must keep its level
                validate_item(&item, &current, self.base.get(&item.id))?;
                Operation::Create { item }
            }
            Operation::Update { item_id, mut item } => {
                let previous = current
                    .get(&item_id)
                    .ok_or_else(|| StagingError::ItemNotFound { id: item_id.clone() })?;
                if item.id.is_empty() {
                    item.id = item_id.clone();
                }
                if item.slug.is_empty() {
                    item.slug = derive_slug(&item, &current);
                }
                validate_item(&item, &current, Some(previous))?;
                Operation::Update { item_id, item }
            }
            Operation::Delete { item_id } => {
                if !current.contains(&item_id) {
                    return Err(StagingError::ItemNotFound { id: item_id });
                }
                let children = current.children_of(&item_id).count();
                if children > 0 {
                    return Err(ValidationError::HasChildren {
                        id: item_id,
                        children,
                    }
                    .into());
                }
                Operation::Delete { item_id }
            }
        };

        let normalized = PendingOperation {
            op,
            staged_at,
            staged_by,
        };
        self.operations.push(normalized.clone());
        Ok(normalized)
    }

    /// Drop every pending operation for `item_id`, returning how many were removed.
    /// Refused when other staged operations depend on the ones being removed.
    pub fn unstage(&mut self, item_id: &str) -> Result<usize, StagingError> {
        let remaining: Vec<PendingOperation> = self
            .operations
            .iter()
            .filter(|p| p.item_id() != item_id)
            .cloned()
            .collect();
        let removed = self.operations.len() - remaining.len();
        if removed == 0 {
            return Err(StagingError::NotStaged {
                id: item_id.to_string(),
            });
        }

        let candidate = fold(&self.base, remaining.iter().map(|p| &p.op))?;
        if let Err(errors) = validate_dataset(&candidate) {
            let existing: HashSet<ValidationError> = match self.effective_dataset() {
                Ok(current) => validate_dataset(&current).err().unwrap_or_default().into_iter().collect(),
                Err(_) => HashSet::new(),
            };
            let introduced: Vec<ValidationError> = errors
                .into_iter()
                .filter(|e| !existing.contains(e))
                .collect();
            if !introduced.is_empty() {
                return Err(StagingError::WouldInvalidate {
                    id: item_id.to_string(),
                    errors: introduced,
                });
            }
        }

        self.operations = remaining;
        Ok(removed)
    }

    /// Base snapshot with every pending operation applied in order
    pub fn effective_dataset(&self) -> Result<TaxonomyDataset, StagingError> {
        fold(&self.base, self.operations.iter().map(|p| &p.op))
    }

    /// Net changes between base and effective dataset, one entry per changed item.
    /// Operations that cancel out produce no entry.
    pub fn diff(&self) -> Result<Vec<ChangeEntry>, StagingError> {
        let effective = self.effective_dataset()?;
        Ok(diff_datasets(&self.base, &effective))
    }

    pub fn summary(&self) -> Result<DiffSummary, StagingError> {
        Ok(DiffSummary::from_entries(&self.diff()?))
    }

    pub fn has_changes(&self) -> Result<bool, StagingError> {
        Ok(!self.diff()?.is_empty())
    }
}

fn derive_slug(item: &TaxonomyItem, dataset: &TaxonomyDataset) -> String {
    unique_slug(
        &item.label,
        dataset
            .siblings(item.parent_id())
            .filter(|sibling| sibling.id != item.id)
            .map(|sibling| sibling.slug.as_str()),
    )
}

/// Apply operations to a base dataset. Items keep their base position, new items are
/// appended, and an item deleted then re-created returns to its old position.
pub fn fold<'a>(
    base: &TaxonomyDataset,
    operations: impl IntoIterator<Item = &'a Operation>,
) -> Result<TaxonomyDataset, StagingError> {
    let mut slots: Vec<Option<TaxonomyItem>> = base.items.iter().cloned().map(Some).collect();
    let mut positions: HashMap<Id, usize> = base
        .items
        .iter()
        .enumerate()
        .map(|(pos, item)| (item.id.clone(), pos))
        .collect();

    for op in operations {
        match op {
            Operation::Create { item } => match positions.get(&item.id) {
                Some(&pos) if slots[pos].is_some() => {
                    return Err(StagingError::DuplicateId {
                        id: item.id.clone(),
                    });
                }
                Some(&pos) => {
                    if let Some(previous) = base.items.get(pos) {
                        check_immutable(previous, item)?;
                    }
                    slots[pos] = Some(item.clone());
                }
                None => {
                    positions.insert(item.id.clone(), slots.len());
                    slots.push(Some(item.clone()));
                }
            },
            Operation::Update { item_id, item } => {
                let slot = positions
                    .get(item_id)
                    .and_then(|&pos| slots[pos].as_mut())
                    .ok_or_else(|| StagingError::ItemNotFound { id: item_id.clone() })?;
                check_immutable(slot, item)?;
                *slot = item.clone();
            }
            Operation::Delete { item_id } => {
                let pos = positions
                    .get(item_id)
                    .copied()
                    .filter(|&pos| slots[pos].is_some())
                    .ok_or_else(|| StagingError::ItemNotFound { id: item_id.clone() })?;
                slots[pos] = None;
            }
        }
    }

    Ok(TaxonomyDataset::new(
        base.name.clone(),
        base.kind,
        slots.into_iter().flatten().collect(),
    ))
}

/// Structural diff: additions and modifications in `after` order, then removals in
/// `before` order.
pub fn diff_datasets(before: &TaxonomyDataset, after: &TaxonomyDataset) -> Vec<ChangeEntry> {
    let before_by_id: HashMap<&str, &TaxonomyItem> =
        before.items.iter().map(|item| (item.id.as_str(), item)).collect();
    let after_ids: HashSet<&str> = after.items.iter().map(|item| item.id.as_str()).collect();

    let mut entries = Vec::new();
    for item in &after.items {
        match before_by_id.get(item.id.as_str()) {
            None => entries.push(ChangeEntry {
                kind: ChangeType::Added,
                item_id: item.id.clone(),
                before: None,
                after: Some(item.clone()),
                changed_fields: Vec::new(),
            }),
            Some(previous) if *previous != item => entries.push(ChangeEntry {
                kind: ChangeType::Modified,
                item_id: item.id.clone(),
                before: Some((*previous).clone()),
                after: Some(item.clone()),
                changed_fields: previous.changed_fields(item),
            }),
            Some(_) => {}
        }
    }
    for item in &before.items {
        if !after_ids.contains(item.id.as_str()) {
            entries.push(ChangeEntry {
                kind: ChangeType::Removed,
                item_id: item.id.clone(),
                before: Some(item.clone()),
                after: None,
                changed_fields: Vec::new(),
            });
        }
    }
    entries
}

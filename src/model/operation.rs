use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Id, TaxonomyItem};

/// A single edit an administrator wants to apply to a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Operation {
    Create { item: TaxonomyItem },
    /// Full replacement of an existing item; `id` and level must not change
    Update { item_id: Id, item: TaxonomyItem },
    Delete { item_id: Id },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn item_id(&self) -> &str {
        match self {
            Operation::Create { item } => &item.id,
            Operation::Update { item_id, .. } | Operation::Delete { item_id } => item_id,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn payload(&self) -> Option<&TaxonomyItem> {
        match self {
            Operation::Create { item } | Operation::Update { item, .. } => Some(item),
            Operation::Delete { .. } => None,
        }
    }
}

/// An operation recorded in a staging session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    #[serde(flatten)]
    pub op: Operation,
    pub staged_at: DateTime<Utc>,
    /// Administrator who staged the operation
    pub staged_by: String,
}

impl PendingOperation {
    pub fn new(op: Operation, staged_by: impl Into<String>) -> Self {
        Self {
            op,
            staged_at: Utc::now(),
            staged_by: staged_by.into(),
        }
    }

    pub fn create(item: TaxonomyItem, staged_by: impl Into<String>) -> Self {
        Self::new(Operation::Create { item }, staged_by)
    }

    pub fn update(item: TaxonomyItem, staged_by: impl Into<String>) -> Self {
        let item_id = item.id.clone();
        Self::new(Operation::Update { item_id, item }, staged_by)
    }

    pub fn delete(item_id: impl Into<Id>, staged_by: impl Into<String>) -> Self {
        Self::new(
            Operation::Delete {
                item_id: item_id.into(),
            },
            staged_by,
        )
    }

    pub fn item_id(&self) -> &str {
        self.op.item_id()
    }

    pub fn kind(&self) -> OperationKind {
        self.op.kind()
    }
}

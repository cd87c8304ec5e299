use serde::{Deserialize, Serialize};

use crate::model::{Id, TaxonomyItem};

/// Type of net change to an item between the base and effective datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One line of the change list shown before a deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: ChangeType,
    pub item_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<TaxonomyItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<TaxonomyItem>,
    /// Fields that differ, only for modifications
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl DiffSummary {
    pub fn from_entries(entries: &[ChangeEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut summary, entry| {
            match entry.kind {
                ChangeType::Added => summary.added += 1,
                ChangeType::Removed => summary.removed += 1,
                ChangeType::Modified => summary.modified += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Commit message describing this change set, e.g.
    /// `taxonomy: +2 -0 ~1 items in service-taxonomy`
    pub fn commit_message(&self, dataset: &str) -> String {
        format!(
            "taxonomy: +{} -{} ~{} items in {}",
            self.added, self.removed, self.modified, dataset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message() {
        let summary = DiffSummary {
            added: 2,
            removed: 0,
            modified: 1,
        };
        assert_eq!(
            summary.commit_message("service-subcategories"),
            "taxonomy: +2 -0 ~1 items in service-subcategories"
        );
        assert_eq!(summary.total(), 3);
    }
}

use serde::{Deserialize, Serialize};

use crate::model::{ItemLevel, TaxonomyItem};

/// Which levels a dataset may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Category → subcategory → subdivision tree
    Hierarchy,
    Skills,
    Tags,
}

impl DatasetKind {
    pub fn allows(&self, level: ItemLevel) -> bool {
        match self {
            DatasetKind::Hierarchy => matches!(
                level,
                ItemLevel::Category | ItemLevel::Subcategory | ItemLevel::Subdivision
            ),
            DatasetKind::Skills => level == ItemLevel::Skill,
            DatasetKind::Tags => level == ItemLevel::Tag,
        }
    }
}

/// Where a dataset lives in the repository and what it may contain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    /// Path of the dataset file inside the repository
    pub path: String,
    pub kind: DatasetKind,
}

impl DatasetDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: DatasetKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }
}

/// Ordered collection of items making up one classification domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyDataset {
    pub name: String,
    pub kind: DatasetKind,
    pub items: Vec<TaxonomyItem>,
}

impl TaxonomyDataset {
    pub fn new(name: impl Into<String>, kind: DatasetKind, items: Vec<TaxonomyItem>) -> Self {
        Self {
            name: name.into(),
            kind,
            items,
        }
    }

    pub fn empty(descriptor: &DatasetDescriptor) -> Self {
        Self::new(descriptor.name.clone(), descriptor.kind, Vec::new())
    }

    /// Linear lookup; read paths go through `TaxonomyIndex` instead
    pub fn get(&self, id: &str) -> Option<&TaxonomyItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Items sharing the given parent (top-level items when `parent_id` is None)
    pub fn siblings<'a>(
        &'a self,
        parent_id: Option<&'a str>,
    ) -> impl Iterator<Item = &'a TaxonomyItem> + 'a {
        self.items
            .iter()
            .filter(move |item| item.parent_id() == parent_id)
    }

    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a TaxonomyItem> + 'a {
        self.siblings(Some(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_allows_levels() {
        assert!(DatasetKind::Hierarchy.allows(ItemLevel::Subdivision));
        assert!(!DatasetKind::Hierarchy.allows(ItemLevel::Skill));
        assert!(DatasetKind::Tags.allows(ItemLevel::Tag));
        assert!(!DatasetKind::Skills.allows(ItemLevel::Tag));
    }

    #[test]
    fn test_siblings() {
        let dataset = TaxonomyDataset::new(
            "service-taxonomy",
            DatasetKind::Hierarchy,
            vec![
                TaxonomyItem::category("c1", "home", "Home"),
                TaxonomyItem::category("c2", "garden", "Garden"),
                TaxonomyItem::subcategory("s1", "c1", "plumbing", "Plumbing"),
            ],
        );
        assert_eq!(dataset.siblings(None).count(), 2);
        assert_eq!(dataset.children_of("c1").map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["s1"]);
        assert_eq!(dataset.children_of("c2").count(), 0);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::logic::validate::ValidationError;
use crate::model::{Id, ItemLevel, TaxonomyDataset, TaxonomyItem, MAX_DEPTH};

/// Constant-time lookup structures over one dataset.
///
/// Built once from a dataset and never mutated; a changed dataset gets a new index.
/// Items are stored in dataset order and every map points into that vector.
#[derive(Debug, Clone)]
pub struct TaxonomyIndex {
    dataset: Arc<TaxonomyDataset>,
    id_to_pos: HashMap<Id, usize>,
    /// Positions of the ancestors of each item, root first, the item itself last
    paths: Vec<Vec<usize>>,
    /// (parent id, slug) → position, for walking slug paths
    sibling_slugs: HashMap<(Option<Id>, String), usize>,
    by_level_slug: HashMap<ItemLevel, HashMap<String, Vec<usize>>>,
    children: HashMap<Option<Id>, Vec<usize>>,
}

impl TaxonomyIndex {
    /// Build the index in two linear passes. Fails on duplicate ids, dangling parents
    /// and parent chains deeper than the taxonomy allows.
    pub fn build(dataset: Arc<TaxonomyDataset>) -> Result<Self, ValidationError> {
        let items = &dataset.items;

        let mut id_to_pos = HashMap::with_capacity(items.len());
        let mut sibling_slugs = HashMap::with_capacity(items.len());
        let mut by_level_slug: HashMap<ItemLevel, HashMap<String, Vec<usize>>> = HashMap::new();
        let mut children: HashMap<Option<Id>, Vec<usize>> = HashMap::new();

        for (pos, item) in items.iter().enumerate() {
            if id_to_pos.insert(item.id.clone(), pos).is_some() {
                return Err(ValidationError::DuplicateId { id: item.id.clone() });
            }
            let parent = item.parent_id().map(String::from);
            if let Some(existing) = sibling_slugs.insert((parent.clone(), item.slug.clone()), pos) {
                return Err(ValidationError::SlugCollision {
                    id: item.id.clone(),
                    slug: item.slug.clone(),
                    existing_id: items[existing].id.clone(),
                });
            }
            by_level_slug
                .entry(item.level())
                .or_default()
                .entry(item.slug.clone())
                .or_default()
                .push(pos);
            children.entry(parent).or_default().push(pos);
        }

        // Second pass: every parent is indexed, so each path is the parent's cached
        // path plus the item itself.
        let mut memo: Vec<Option<Vec<usize>>> = vec![None; items.len()];
        for pos in 0..items.len() {
            Self::resolve_path(pos, items, &id_to_pos, &mut memo)?;
        }
        let paths = memo.into_iter().map(Option::unwrap_or_default).collect();

        log::debug!(
            "Built taxonomy index for '{}' with {} items",
            dataset.name,
            items.len()
        );

        Ok(Self {
            dataset,
            id_to_pos,
            paths,
            sibling_slugs,
            by_level_slug,
            children,
        })
    }

    fn resolve_path(
        pos: usize,
        items: &[TaxonomyItem],
        id_to_pos: &HashMap<Id, usize>,
        memo: &mut [Option<Vec<usize>>],
    ) -> Result<(), ValidationError> {
        // Walk up until an item with a cached path (or a root) is found
        let mut pending = Vec::with_capacity(MAX_DEPTH);
        let mut current = pos;
        let mut prefix: Vec<usize> = loop {
            if let Some(cached) = &memo[current] {
                break cached.clone();
            }
            pending.push(current);
            if pending.len() > MAX_DEPTH {
                return Err(ValidationError::CycleDetected {
                    id: items[pos].id.clone(),
                    max_depth: MAX_DEPTH,
                });
            }
            match items[current].parent_id() {
                None => break Vec::new(),
                Some(parent_id) => {
                    current = *id_to_pos.get(parent_id).ok_or_else(|| {
                        ValidationError::ParentNotFound {
                            id: items[current].id.clone(),
                            parent_id: parent_id.to_string(),
                        }
                    })?;
                }
            }
        };

        for pending_pos in pending.into_iter().rev() {
            prefix.push(pending_pos);
            if prefix.len() > MAX_DEPTH {
                return Err(ValidationError::CycleDetected {
                    id: items[pos].id.clone(),
                    max_depth: MAX_DEPTH,
                });
            }
            memo[pending_pos] = Some(prefix.clone());
        }
        Ok(())
    }

    pub fn dataset(&self) -> &Arc<TaxonomyDataset> {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.items.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&TaxonomyItem> {
        self.id_to_pos.get(id).map(|&pos| &self.dataset.items[pos])
    }

    /// Follow slugs from the top level down, e.g. `["home", "plumbing", "leak-repair"]`.
    /// Returns None for an unknown path or one longer than the taxonomy is deep.
    pub fn find_by_slug_path<S: AsRef<str>>(&self, slugs: &[S]) -> Option<&TaxonomyItem> {
        if slugs.is_empty() || slugs.len() > MAX_DEPTH {
            return None;
        }
        let mut parent: Option<Id> = None;
        let mut found = None;
        for slug in slugs {
            let pos = *self
                .sibling_slugs
                .get(&(parent.take(), slug.as_ref().to_string()))?;
            let item = &self.dataset.items[pos];
            parent = Some(item.id.clone());
            found = Some(item);
        }
        found
    }

    /// Ancestors of an item, root first and the item last
    pub fn ancestor_path(&self, id: &str) -> Option<Vec<&TaxonomyItem>> {
        let pos = *self.id_to_pos.get(id)?;
        Some(
            self.paths[pos]
                .iter()
                .map(|&p| &self.dataset.items[p])
                .collect(),
        )
    }

    /// Direct children in dataset order; `None` lists the top-level items
    pub fn children(&self, parent_id: Option<&str>) -> Vec<&TaxonomyItem> {
        self.children
            .get(&parent_id.map(String::from))
            .map(|positions| positions.iter().map(|&p| &self.dataset.items[p]).collect())
            .unwrap_or_default()
    }

    /// All items of a level carrying the slug (siblings are unique, cousins may share)
    pub fn by_level_slug(&self, level: ItemLevel, slug: &str) -> Vec<&TaxonomyItem> {
        self.by_level_slug
            .get(&level)
            .and_then(|slugs| slugs.get(slug))
            .map(|positions| positions.iter().map(|&p| &self.dataset.items[p]).collect())
            .unwrap_or_default()
    }
}

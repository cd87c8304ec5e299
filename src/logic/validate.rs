use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::logic::slug::is_valid_slug;
use crate::model::{DatasetKind, ItemLevel, TaxonomyDataset, TaxonomyItem, MAX_DEPTH};

/// Structural violation of the taxonomy tree rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("item id must not be empty")]
    EmptyId,
    #[error("item '{id}' has an empty label")]
    EmptyLabel { id: String },
    #[error("item '{id}' has an invalid slug '{slug}'")]
    InvalidSlug { id: String, slug: String },
    #[error("item '{id}' is a {level}, which a {kind:?} dataset cannot hold")]
    LevelNotAllowed {
        id: String,
        level: ItemLevel,
        kind: DatasetKind,
    },
    #[error("item '{id}' references missing parent '{parent_id}'")]
    ParentNotFound { id: String, parent_id: String },
    #[error("item '{id}' needs a {expected} parent but '{parent_id}' is a {actual}")]
    InvalidParentLevel {
        id: String,
        parent_id: String,
        expected: ItemLevel,
        actual: ItemLevel,
    },
    #[error("slug '{slug}' of item '{id}' is already used by sibling '{existing_id}'")]
    SlugCollision {
        id: String,
        slug: String,
        existing_id: String,
    },
    #[error("item id '{id}' appears more than once")]
    DuplicateId { id: String },
    #[error("field '{field}' of item '{id}' cannot be changed")]
    ImmutableField { id: String, field: String },
    #[error("parent chain of item '{id}' does not reach a root within {max_depth} levels")]
    CycleDetected { id: String, max_depth: usize },
    #[error("item '{id}' still has {children} child item(s)")]
    HasChildren { id: String, children: usize },
}

/// Id-keyed view of a dataset so per-item checks stay O(1)
struct DatasetView<'a> {
    kind: DatasetKind,
    by_id: HashMap<&'a str, &'a TaxonomyItem>,
}

impl<'a> DatasetView<'a> {
    fn new(dataset: &'a TaxonomyDataset) -> Self {
        Self {
            kind: dataset.kind,
            by_id: dataset.items.iter().map(|item| (item.id.as_str(), item)).collect(),
        }
    }

    fn get(&self, id: &str) -> Option<&'a TaxonomyItem> {
        self.by_id.get(id).copied()
    }
}

/// Validate a single item against the dataset it is about to live in.
///
/// `dataset` may already contain the item (for edits); it is ignored when checking
/// sibling slugs. `previous` is the current version of an edited item and enforces
/// that id and level never change.
pub fn validate_item(
    item: &TaxonomyItem,
    dataset: &TaxonomyDataset,
    previous: Option<&TaxonomyItem>,
) -> Result<(), ValidationError> {
    let view = DatasetView::new(dataset);
    check_shape(item, &view, previous)?;

    if let Some(existing) = dataset
        .siblings(item.parent_id())
        .find(|sibling| sibling.id != item.id && sibling.slug == item.slug)
    {
        return Err(ValidationError::SlugCollision {
            id: item.id.clone(),
            slug: item.slug.clone(),
            existing_id: existing.id.clone(),
        });
    }

    Ok(())
}

fn check_shape(
    item: &TaxonomyItem,
    view: &DatasetView,
    previous: Option<&TaxonomyItem>,
) -> Result<(), ValidationError> {
    if item.id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if item.label.trim().is_empty() {
        return Err(ValidationError::EmptyLabel { id: item.id.clone() });
    }
    if !is_valid_slug(&item.slug) {
        return Err(ValidationError::InvalidSlug {
            id: item.id.clone(),
            slug: item.slug.clone(),
        });
    }
    if !view.kind.allows(item.level()) {
        return Err(ValidationError::LevelNotAllowed {
            id: item.id.clone(),
            level: item.level(),
            kind: view.kind,
        });
    }

    if let Some(previous) = previous {
        check_immutable(previous, item)?;
    }

    if let (Some(parent_id), Some(expected)) = (item.parent_id(), item.level().parent_level()) {
        let parent = view.get(parent_id).ok_or_else(|| ValidationError::ParentNotFound {
            id: item.id.clone(),
            parent_id: parent_id.to_string(),
        })?;
        if parent.level() != expected {
            return Err(ValidationError::InvalidParentLevel {
                id: item.id.clone(),
                parent_id: parent_id.to_string(),
                expected,
                actual: parent.level(),
            });
        }
    }

    Ok(())
}

/// An edited item keeps its id and level
pub fn check_immutable(previous: &TaxonomyItem, item: &TaxonomyItem) -> Result<(), ValidationError> {
    if previous.id != item.id {
        return Err(ValidationError::ImmutableField {
            id: previous.id.clone(),
            field: "id".to_string(),
        });
    }
    if previous.level() != item.level() {
        return Err(ValidationError::ImmutableField {
            id: item.id.clone(),
            field: "level".to_string(),
        });
    }
    Ok(())
}

/// Every item of `dataset` that also exists in `base` must have kept its level
pub fn validate_against_base(
    base: &TaxonomyDataset,
    dataset: &TaxonomyDataset,
) -> Result<(), Vec<ValidationError>> {
    let view = DatasetView::new(base);
    let errors: Vec<ValidationError> = dataset
        .items
        .iter()
        .filter_map(|item| {
            view.get(&item.id)
                .and_then(|previous| check_immutable(previous, item).err())
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Ancestors of `item` from the root down, `item` last
pub fn compute_path(
    item: &TaxonomyItem,
    dataset: &TaxonomyDataset,
) -> Result<Vec<TaxonomyItem>, ValidationError> {
    let view = DatasetView::new(dataset);
    walk_path(item, &view).map(|path| path.into_iter().cloned().collect())
}

fn walk_path<'a>(
    item: &'a TaxonomyItem,
    view: &DatasetView<'a>,
) -> Result<Vec<&'a TaxonomyItem>, ValidationError> {
    let mut path = vec![item];
    let mut current = item;

    while let Some(parent_id) = current.parent_id() {
        if path.len() >= MAX_DEPTH {
            return Err(ValidationError::CycleDetected {
                id: item.id.clone(),
                max_depth: MAX_DEPTH,
            });
        }
        let parent = view.get(parent_id).ok_or_else(|| ValidationError::ParentNotFound {
            id: current.id.clone(),
            parent_id: parent_id.to_string(),
        })?;
        path.push(parent);
        current = parent;
    }

    path.reverse();
    Ok(path)
}

/// Check every invariant of a whole dataset and report all violations
pub fn validate_dataset(dataset: &TaxonomyDataset) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = dataset
        .items
        .iter()
        .map(|item| item.id.as_str())
        .duplicates()
        .map(|id| ValidationError::DuplicateId { id: id.to_string() })
        .collect();

    let view = DatasetView::new(dataset);
    for item in &dataset.items {
        match check_shape(item, &view, None) {
            Ok(()) => {
                if let Err(e) = walk_path(item, &view) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
    }

    // Sibling slug uniqueness: the first item keeps the slug, later ones collide
    let mut seen: HashMap<(Option<&str>, &str), &str> = HashMap::new();
    for item in &dataset.items {
        let key = (item.parent_id(), item.slug.as_str());
        match seen.get(&key) {
            Some(existing_id) if *existing_id != item.id => {
                errors.push(ValidationError::SlugCollision {
                    id: item.id.clone(),
                    slug: item.slug.clone(),
                    existing_id: existing_id.to_string(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(key, item.id.as_str());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;

    fn service_dataset() -> TaxonomyDataset {
        TaxonomyDataset::new(
            "service-taxonomy",
            DatasetKind::Hierarchy,
            vec![
                TaxonomyItem::category("c1", "home", "Home"),
                TaxonomyItem::category("c2", "garden", "Garden"),
                TaxonomyItem::subcategory("s1", "c1", "plumbing", "Plumbing"),
                TaxonomyItem::subdivision("d1", "s1", "leak-repair", "Leak repair"),
            ],
        )
    }

    #[test]
    fn test_valid_item_passes() {
        let dataset = service_dataset();
        let item = TaxonomyItem::subcategory("s2", "c1", "electric", "Electric");
        assert_eq!(validate_item(&item, &dataset, None), Ok(()));
    }

    #[test]
    fn test_sibling_slug_collision() {
        let dataset = service_dataset();
        let item = TaxonomyItem::subcategory("s2", "c1", "plumbing", "Plumbing again");
        assert_eq!(
            validate_item(&item, &dataset, None),
            Err(ValidationError::SlugCollision {
                id: "s2".to_string(),
                slug: "plumbing".to_string(),
                existing_id: "s1".to_string(),
            })
        );

        // Same slug under a different parent is fine
        let other_parent = TaxonomyItem::subcategory("s3", "c2", "plumbing", "Garden plumbing");
        assert!(validate_item(&other_parent, &dataset, None).is_ok());
    }

    #[test]
    fn test_parent_must_be_one_level_up() {
        let dataset = service_dataset();
        let skipping = TaxonomyItem::subdivision("d2", "c1", "drains", "Drains");
        assert!(matches!(
            validate_item(&skipping, &dataset, None),
            Err(ValidationError::InvalidParentLevel {
                expected: ItemLevel::Subcategory,
                actual: ItemLevel::Category,
                ..
            })
        ));

        let orphan = TaxonomyItem::subcategory("s9", "missing", "orphan", "Orphan");
        assert!(matches!(
            validate_item(&orphan, &dataset, None),
            Err(ValidationError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_level_and_id_are_immutable() {
        let dataset = service_dataset();
        let previous = dataset.get("s1").unwrap().clone();

        let mut promoted = previous.clone();
        promoted.kind = ItemKind::Category;
        assert_eq!(
            validate_item(&promoted, &dataset, Some(&previous)),
            Err(ValidationError::ImmutableField {
                id: "s1".to_string(),
                field: "level".to_string(),
            })
        );

        let mut renamed = previous.clone();
        renamed.id = "s1-new".to_string();
        assert!(matches!(
            validate_item(&renamed, &dataset, Some(&previous)),
            Err(ValidationError::ImmutableField { field, .. }) if field == "id"
        ));
    }

    #[test]
    fn test_label_slug_and_level_rules() {
        let dataset = service_dataset();
        let blank = TaxonomyItem::category("c3", "blank", "   ");
        assert!(matches!(validate_item(&blank, &dataset, None), Err(ValidationError::EmptyLabel { .. })));

        let bad_slug = TaxonomyItem::category("c3", "Bad Slug", "Bad");
        assert!(matches!(validate_item(&bad_slug, &dataset, None), Err(ValidationError::InvalidSlug { .. })));

        let skill = TaxonomyItem::skill("k1", "welding", "Welding");
        assert!(matches!(
            validate_item(&skill, &dataset, None),
            Err(ValidationError::LevelNotAllowed { .. })
        ));
    }

    #[test]
    fn test_compute_path() {
        let dataset = service_dataset();
        let leaf = dataset.get("d1").unwrap();
        let path = compute_path(leaf, &dataset).unwrap();
        let ids: Vec<_> = path.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "s1", "d1"]);

        let root = dataset.get("c2").unwrap();
        assert_eq!(compute_path(root, &dataset).unwrap().len(), 1);
    }

    #[test]
    fn test_compute_path_detects_corrupted_chain() {
        // Two subdivisions pointing at each other never reach a root
        let dataset = TaxonomyDataset::new(
            "corrupt",
            DatasetKind::Hierarchy,
            vec![
                TaxonomyItem::subdivision("a", "b", "a", "A"),
                TaxonomyItem::subdivision("b", "a", "b", "B"),
            ],
        );
        let err = compute_path(&dataset.items[0], &dataset).unwrap_err();
        assert_eq!(
            err,
            ValidationError::CycleDetected {
                id: "a".to_string(),
                max_depth: 3,
            }
        );
    }

    #[test]
    fn test_validate_dataset_collects_all_errors() {
        let mut dataset = service_dataset();
        dataset.items.push(TaxonomyItem::subcategory("s2", "c1", "plumbing", "Plumbing 2"));
        dataset.items.push(TaxonomyItem::category("c1", "home-again", "Home again"));
        dataset.items.push(TaxonomyItem::subcategory("s3", "gone", "lost", "Lost"));

        let errors = validate_dataset(&dataset).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateId { id: "c1".to_string() }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::SlugCollision { id, .. } if id == "s2")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ParentNotFound { id, .. } if id == "s3")));
        assert_eq!(validate_dataset(&service_dataset()), Ok(()));
    }

    #[test]
    fn test_level_change_against_base_is_reported() {
        let base = service_dataset();
        let mut changed = service_dataset();
        changed.items[2] = TaxonomyItem::category("s1", "plumbing", "Plumbing");
        changed.items.retain(|item| item.id != "d1");

        // the changed dataset is well-formed on its own
        assert_eq!(validate_dataset(&changed), Ok(()));
        assert_eq!(
            validate_against_base(&base, &changed),
            Err(vec![ValidationError::ImmutableField {
                id: "s1".to_string(),
                field: "level".to_string(),
            }])
        );
        assert_eq!(validate_against_base(&base, &base), Ok(()));
    }
}

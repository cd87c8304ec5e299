use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Position of an item in the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemLevel {
    Category,
    Subcategory,
    Subdivision,
    Skill,
    Tag,
}

impl ItemLevel {
    /// Level an item's parent must have (None for top-level and flat levels)
    pub fn parent_level(&self) -> Option<ItemLevel> {
        match self {
            ItemLevel::Subcategory => Some(ItemLevel::Category),
            ItemLevel::Subdivision => Some(ItemLevel::Subcategory),
            ItemLevel::Category | ItemLevel::Skill | ItemLevel::Tag => None,
        }
    }

    /// Number of ancestors an item of this level has
    pub fn depth(&self) -> usize {
        match self {
            ItemLevel::Subcategory => 1,
            ItemLevel::Subdivision => 2,
            ItemLevel::Category | ItemLevel::Skill | ItemLevel::Tag => 0,
        }
    }

    pub fn requires_parent(&self) -> bool {
        self.parent_level().is_some()
    }
}

impl std::fmt::Display for ItemLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ItemLevel::Category => write!(f, "category"),
            ItemLevel::Subcategory => write!(f, "subcategory"),
            ItemLevel::Subdivision => write!(f, "subdivision"),
            ItemLevel::Skill => write!(f, "skill"),
            ItemLevel::Tag => write!(f, "tag"),
        }
    }
}

impl std::str::FromStr for ItemLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "category" => Ok(ItemLevel::Category),
            "subcategory" => Ok(ItemLevel::Subcategory),
            "subdivision" => Ok(ItemLevel::Subdivision),
            "skill" => Ok(ItemLevel::Skill),
            "tag" => Ok(ItemLevel::Tag),
            _ => Err(format!("Unknown item level: {}", s)),
        }
    }
}

/// Level-specific shape of an item. Nested levels carry their parent reference,
/// top-level and flat levels cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Category,
    Subcategory { parent_id: Id },
    Subdivision { parent_id: Id },
    Skill,
    Tag,
}

impl ItemKind {
    pub fn level(&self) -> ItemLevel {
        match self {
            ItemKind::Category => ItemLevel::Category,
            ItemKind::Subcategory { .. } => ItemLevel::Subcategory,
            ItemKind::Subdivision { .. } => ItemLevel::Subdivision,
            ItemKind::Skill => ItemLevel::Skill,
            ItemKind::Tag => ItemLevel::Tag,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            ItemKind::Subcategory { parent_id } | ItemKind::Subdivision { parent_id } => {
                Some(parent_id)
            }
            ItemKind::Category | ItemKind::Skill | ItemKind::Tag => None,
        }
    }

    /// Build a kind from its flat parts, enforcing that a parent is present iff the level needs one
    pub fn from_parts(level: ItemLevel, parent_id: Option<Id>) -> Result<Self, String> {
        match (level, parent_id) {
            (ItemLevel::Category, None) => Ok(ItemKind::Category),
            (ItemLevel::Skill, None) => Ok(ItemKind::Skill),
            (ItemLevel::Tag, None) => Ok(ItemKind::Tag),
            (ItemLevel::Subcategory, Some(parent_id)) => Ok(ItemKind::Subcategory { parent_id }),
            (ItemLevel::Subdivision, Some(parent_id)) => Ok(ItemKind::Subdivision { parent_id }),
            (level, Some(parent_id)) => Err(format!(
                "a {} cannot have a parent (found parent_id '{}')",
                level, parent_id
            )),
            (level, None) => Err(format!("a {} requires a parent_id", level)),
        }
    }
}

/// One node of a taxonomy dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ItemRecord", into = "ItemRecord")]
pub struct TaxonomyItem {
    /// Stable identifier, never changes once created
    pub id: Id,
    /// URL segment, unique among siblings
    pub slug: String,
    pub label: String,
    pub plural: Option<String>,
    pub description: Option<String>,
    pub kind: ItemKind,
    pub image: Option<String>,
    pub icon: Option<String>,
}

impl TaxonomyItem {
    pub fn new(id: impl Into<Id>, slug: impl Into<String>, label: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            label: label.into(),
            plural: None,
            description: None,
            kind,
            image: None,
            icon: None,
        }
    }

    pub fn category(id: impl Into<Id>, slug: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, slug, label, ItemKind::Category)
    }

    pub fn subcategory(
        id: impl Into<Id>,
        parent_id: impl Into<Id>,
        slug: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self::new(id, slug, label, ItemKind::Subcategory { parent_id: parent_id.into() })
    }

    pub fn subdivision(
        id: impl Into<Id>,
        parent_id: impl Into<Id>,
        slug: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self::new(id, slug, label, ItemKind::Subdivision { parent_id: parent_id.into() })
    }

    pub fn skill(id: impl Into<Id>, slug: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, slug, label, ItemKind::Skill)
    }

    pub fn tag(id: impl Into<Id>, slug: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, slug, label, ItemKind::Tag)
    }

    pub fn level(&self) -> ItemLevel {
        self.kind.level()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.kind.parent_id()
    }

    /// Names of the fields that differ between two versions of an item
    pub fn changed_fields(&self, other: &TaxonomyItem) -> Vec<String> {
        let mut fields = Vec::new();
        if self.id != other.id {
            fields.push("id");
        }
        if self.slug != other.slug {
            fields.push("slug");
        }
        if self.label != other.label {
            fields.push("label");
        }
        if self.plural != other.plural {
            fields.push("plural");
        }
        if self.description != other.description {
            fields.push("description");
        }
        if self.level() != other.level() {
            fields.push("level");
        }
        if self.parent_id() != other.parent_id() {
            fields.push("parent_id");
        }
        if self.image != other.image {
            fields.push("image");
        }
        if self.icon != other.icon {
            fields.push("icon");
        }
        fields.into_iter().map(String::from).collect()
    }
}

/// Flat on-disk shape of an item. Field order here is the key order in dataset files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemRecord {
    pub id: Id,
    #[serde(default)]
    pub slug: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub level: ItemLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl TryFrom<ItemRecord> for TaxonomyItem {
    type Error = String;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        let kind = ItemKind::from_parts(record.level, record.parent_id)
            .map_err(|e| format!("item '{}': {}", record.id, e))?;
        Ok(Self {
            id: record.id,
            slug: record.slug,
            label: record.label,
            plural: record.plural,
            description: record.description,
            kind,
            image: record.image,
            icon: record.icon,
        })
    }
}

impl From<TaxonomyItem> for ItemRecord {
    fn from(item: TaxonomyItem) -> Self {
        let level = item.level();
        let parent_id = item.parent_id().map(String::from);
        Self {
            id: item.id,
            slug: item.slug,
            label: item.label,
            plural: item.plural,
            description: item.description,
            level,
            parent_id,
            image: item.image,
            icon: item.icon,
        }
    }
}

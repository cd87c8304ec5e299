//! Dataset file format.
//!
//! A dataset file is a JSON array of item records, pretty-printed with two-space
//! indentation and terminated by a newline. Files written by `serialize_dataset`
//! parse and re-serialize to the same bytes, so a deploy only touches the lines of
//! items that actually changed.
//!
//! Other valid JSON is accepted and canonicalised: `null` optionals are dropped,
//! escaped characters are written literally and whitespace is re-indented. The
//! first deploy after such an edit rewrites those lines once. A record without a
//! `slug` parses with an empty slug, which dataset validation then rejects.

use thiserror::Error;

use crate::model::{DatasetDescriptor, TaxonomyDataset, TaxonomyItem};

#[derive(Debug, Error)]
pub enum FormatError {
    /// The file is not a valid dataset document (malformed JSON, unknown keys,
    /// parent references on the wrong level). Usually means it was edited by hand.
    #[error("dataset '{dataset}' could not be parsed: {source}")]
    Malformed {
        dataset: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataset '{dataset}' could not be serialized: {source}")]
    Serialize {
        dataset: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn parse_dataset(
    descriptor: &DatasetDescriptor,
    content: &str,
) -> Result<TaxonomyDataset, FormatError> {
    let items: Vec<TaxonomyItem> =
        serde_json::from_str(content).map_err(|source| FormatError::Malformed {
            dataset: descriptor.name.clone(),
            source,
        })?;
    Ok(TaxonomyDataset::new(
        descriptor.name.clone(),
        descriptor.kind,
        items,
    ))
}

pub fn serialize_dataset(dataset: &TaxonomyDataset) -> Result<String, FormatError> {
    let mut out =
        serde_json::to_string_pretty(&dataset.items).map_err(|source| FormatError::Serialize {
            dataset: dataset.name.clone(),
            source,
        })?;
    out.push('\n');
    Ok(out)
}

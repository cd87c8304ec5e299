use anyhow::Result;

use crate::logic::validate::validate_dataset;
use crate::model::format::serialize_dataset;
use crate::model::{DatasetDescriptor, NewCommit, UserContext};
use crate::store::{RepositoryError, RepositoryHost};

pub mod data;

pub use data::sample_dataset;

/// Commit sample content for every dataset whose file does not exist on `branch`
/// yet. Existing files are left alone.
pub async fn load_seed_data<R: RepositoryHost>(
    repository: &R,
    branch: &str,
    descriptors: &[DatasetDescriptor],
) -> Result<usize> {
    let author = UserContext::system().commit_author();
    let mut written = 0;

    for descriptor in descriptors {
        match repository.get_file_at_ref(&descriptor.path, branch).await {
            Ok(_) => {
                log::info!("Seed: '{}' already exists, skipping", descriptor.path);
                continue;
            }
            Err(RepositoryError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let dataset = sample_dataset(descriptor);
        if let Err(errors) = validate_dataset(&dataset) {
            anyhow::bail!("seed data for '{}' is invalid: {:?}", descriptor.name, errors);
        }
        let content = serialize_dataset(&dataset)?;

        repository
            .create_commit(NewCommit {
                path: descriptor.path.clone(),
                content,
                message: format!("taxonomy: seed {} with {} items", descriptor.name, dataset.len()),
                branch: branch.to_string(),
                expected_blob_sha: None,
                author: author.clone(),
            })
            .await?;
        written += 1;
    }

    Ok(written)
}

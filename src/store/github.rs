//! GitHub contents API client
//!
//! Reads dataset files at a ref, compares refs and writes a file as a single commit
//! with the blob sha as the write precondition.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RepositoryConfig;
use crate::model::{CommitInfo, CreatedCommit, NewCommit, RefComparison, RemoteFile};
use crate::store::traits::{RepositoryError, RepositoryHost};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    ahead_by: u32,
    behind_by: u32,
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
struct CompareFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<GitActor>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    html_url: Option<String>,
    commit: CommitDetail,
}

#[derive(Debug, Serialize)]
struct PutCommitter<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    committer: Option<PutCommitter<'a>>,
}

#[derive(Debug, Deserialize)]
struct PutContentBlob {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutCommit {
    sha: String,
    message: String,
    html_url: Option<String>,
    author: Option<GitActor>,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    content: PutContentBlob,
    commit: PutCommit,
}

pub struct GitHubRepository {
    client: Client,
    api_base: String,
    owner: String,
    name: String,
}

impl GitHubRepository {
    pub fn new(config: &RepositoryConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        if let Some(token) = config.resolved_token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            log::warn!("No repository token configured; deploys will be rejected by the host");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            name: config.name.clone(),
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.name, tail)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
        git_ref: &str,
    ) -> Result<Response, RepositoryError> {
        let response = request
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        log::debug!("GitHub returned {} for {}@{}: {}", status, path, git_ref, body);
        Err(error_for_status(status, &headers, &body, path, git_ref))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RepositoryError> {
        response
            .json::<T>()
            .await
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))
    }

    /// Files over the contents API size limit come back without inline content
    async fn fetch_blob(&self, path: &str, git_ref: &str, sha: &str) -> Result<String, RepositoryError> {
        let request = self.client.get(self.repo_url(&format!("git/blobs/{}", sha)));
        let response = self.send(request, path, git_ref).await?;
        let blob: BlobResponse = Self::read_json(response).await?;
        decode_content(&blob.content)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn error_for_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    path: &str,
    git_ref: &str,
) -> RepositoryError {
    let retry_after_secs = header_u64(headers, "retry-after");
    match status {
        StatusCode::TOO_MANY_REQUESTS => RepositoryError::RateLimited { retry_after_secs },
        StatusCode::FORBIDDEN if header_u64(headers, "x-ratelimit-remaining") == Some(0) => {
            RepositoryError::RateLimited { retry_after_secs }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RepositoryError::Unauthorized(format!("{}: {}", status, body))
        }
        StatusCode::NOT_FOUND => RepositoryError::NotFound {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RepositoryError::Conflict(format!("{}: {}", status, body))
        }
        s if s.is_server_error() => RepositoryError::Transport(format!("{}: {}", status, body)),
        _ => RepositoryError::InvalidResponse(format!("{}: {}", status, body)),
    }
}

/// The contents API wraps base64 at 60 columns
fn decode_content(encoded: &str) -> Result<String, RepositoryError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| RepositoryError::InvalidResponse(format!("bad base64 content: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| RepositoryError::InvalidResponse(format!("content is not UTF-8: {}", e)))
}

fn commit_info(sha: String, message: String, html_url: Option<String>, author: Option<GitActor>) -> CommitInfo {
    let (author, date) = match author {
        Some(actor) => (actor.name, actor.date.unwrap_or_default()),
        None => (None, String::new()),
    };
    CommitInfo {
        sha,
        message,
        author,
        date,
        url: html_url,
    }
}

#[async_trait::async_trait]
impl RepositoryHost for GitHubRepository {
    async fn get_file_at_ref(&self, path: &str, git_ref: &str) -> Result<RemoteFile, RepositoryError> {
        let request = self
            .client
            .get(self.repo_url(&format!("contents/{}", path)))
            .query(&[("ref", git_ref)]);
        let response = self.send(request, path, git_ref).await?;
        let body: ContentResponse = Self::read_json(response).await?;

        let content = if body.encoding == "base64" {
            decode_content(&body.content)?
        } else {
            self.fetch_blob(path, git_ref, &body.sha).await?
        };
        Ok(RemoteFile {
            path: path.to_string(),
            content,
            blob_sha: body.sha,
        })
    }

    async fn compare_refs(&self, base: &str, head: &str) -> Result<RefComparison, RepositoryError> {
        let range = format!("{}...{}", base, head);
        let request = self.client.get(self.repo_url(&format!("compare/{}", range)));
        let response = self.send(request, "", &range).await?;
        let body: CompareResponse = Self::read_json(response).await?;
        Ok(RefComparison {
            ahead_by: body.ahead_by,
            behind_by: body.behind_by,
            files: body.files.into_iter().map(|f| f.filename).collect(),
        })
    }

    async fn get_commits(&self, git_ref: &str, limit: usize) -> Result<Vec<CommitInfo>, RepositoryError> {
        let per_page = limit.clamp(1, MAX_PER_PAGE).to_string();
        let request = self
            .client
            .get(self.repo_url("commits"))
            .query(&[("sha", git_ref), ("per_page", per_page.as_str())]);
        let response = self
            .send(request, "", git_ref)
            .await
            .map_err(|e| match e {
                // unknown refs come back as 422 on this endpoint
                RepositoryError::Conflict(_) => RepositoryError::NotFound {
                    path: String::new(),
                    git_ref: git_ref.to_string(),
                },
                other => other,
            })?;
        let body: Vec<CommitResponse> = Self::read_json(response).await?;
        Ok(body
            .into_iter()
            .take(limit)
            .map(|c| commit_info(c.sha, c.commit.message, c.html_url, c.commit.author))
            .collect())
    }

    async fn create_commit(&self, commit: NewCommit) -> Result<CreatedCommit, RepositoryError> {
        let payload = PutContentRequest {
            message: &commit.message,
            content: STANDARD.encode(commit.content.as_bytes()),
            branch: &commit.branch,
            sha: commit.expected_blob_sha.as_deref(),
            committer: commit.author.as_ref().map(|a| PutCommitter {
                name: &a.name,
                email: &a.email,
            }),
        };
        let request = self
            .client
            .put(self.repo_url(&format!("contents/{}", commit.path)))
            .json(&payload);
        let response = self.send(request, &commit.path, &commit.branch).await?;
        let body: PutContentResponse = Self::read_json(response).await?;

        log::info!(
            "Committed {} to {} as {}",
            commit.path,
            commit.branch,
            body.commit.sha
        );
        Ok(CreatedCommit {
            commit: commit_info(
                body.commit.sha,
                body.commit.message,
                body.commit.html_url,
                body.commit.author,
            ),
            blob_sha: body.content.sha,
        })
    }
}

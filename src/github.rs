use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::{
    config::GitHubConfig,
    error::{Result, SessionError},
    source::{FileContentClient, RepositoryTreeClient},
    tree::{build_tree, ListedEntry, OrphanPolicy},
    types::{EntryType, RepositoryEntry},
};

/// GitHub-backed repository client
///
/// Uses:
/// - the GitHub REST API for repository metadata and recursive trees
/// - raw.githubusercontent.com (or a configured mirror) for file contents
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    raw_base: String,
    orphans: OrphanPolicy,
}

#[derive(Deserialize)]
struct RepositoryResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    sha: String,
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    sha: String,
}

impl GitHubClient {
    /// Create a client pointed at github.com
    pub fn new() -> Self {
        Self::from_config(&GitHubConfig::default())
    }

    /// Create a client from configuration
    ///
    /// # Arguments
    /// * `config` - API and raw content base addresses, user agent, and the
    ///   policy for listing entries whose parent directory is missing
    pub fn from_config(config: &GitHubConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_base: config.raw_base.clone(),
            orphans: config.orphans,
        }
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, owner, repo)
    }

    fn tree_url(&self, owner: &str, repo: &str, branch: &str) -> String {
        format!("{}/repos/{}/{}/git/trees/{}", self.api_base, owner, repo, branch)
    }

    fn authorize(request: RequestBuilder, credential: Option<&str>) -> RequestBuilder {
        match credential.map(str::trim).filter(|c| !c.is_empty()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn api_get(&self, url: &str, credential: Option<&str>) -> Result<Response> {
        tracing::debug!(url, authenticated = credential.is_some(), "GitHub API request");
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        Ok(Self::authorize(request, credential).send().await?)
    }

    /// Map a non-success hosting API response onto the error taxonomy
    async fn api_error(response: Response, resource: String) -> SessionError {
        let status = response.status();
        let rate_limited = is_rate_limited(status, response.headers());
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::NOT_FOUND => SessionError::NotFound { resource },
            _ if rate_limited => SessionError::transport(format!(
                "GitHub API rate limit exceeded while reading {}",
                resource
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SessionError::Unauthorized {
                message: format!("{} for {}: {}", status, resource, body),
            },
            status => SessionError::transport(format!(
                "unexpected status {} for {}: {}",
                status, resource, body
            )),
        }
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted)
}

/// Build the raw content address `<base>/<owner>/<repo>/<branch>/<path>`
pub fn raw_content_url(base: &Url, owner: &str, repo: &str, branch: &str, path: &str) -> Result<String> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            SessionError::invalid_input(format!("'{}' cannot be used as a raw content base", base))
        })?;
        segments.pop_if_empty();
        segments.extend([owner, repo]);
        segments.extend(branch.split('/'));
        segments.extend(path.split('/'));
    }
    Ok(url.to_string())
}

fn listed_entry(item: TreeItem) -> Option<ListedEntry> {
    let entry_type = match item.item_type.as_str() {
        "blob" => EntryType::File,
        "tree" => EntryType::Directory,
        other => {
            // submodules ("commit") have no content to show
            tracing::debug!(path = %item.path, kind = other, "skipping tree entry");
            return None;
        }
    };
    Some(ListedEntry {
        path: item.path,
        entry_type,
        identity_hash: item.sha,
    })
}

#[async_trait]
impl RepositoryTreeClient for GitHubClient {
    async fn resolve_default_branch(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<String> {
        let response = self.api_get(&self.repo_url(owner, repo), credential).await?;

        if response.status() != StatusCode::OK {
            return Err(Self::api_error(response, format!("{}/{}", owner, repo)).await);
        }

        let info: RepositoryResponse = response.json().await?;
        tracing::debug!(owner, repo, branch = %info.default_branch, "resolved default branch");
        Ok(info.default_branch)
    }

    async fn fetch_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        credential: Option<&str>,
    ) -> Result<Vec<RepositoryEntry>> {
        let url = format!("{}?recursive=1", self.tree_url(owner, repo, branch));
        let response = self.api_get(&url, credential).await?;

        if response.status() != StatusCode::OK {
            return Err(Self::api_error(response, format!("{}/{}@{}", owner, repo, branch)).await);
        }

        let listing: TreeResponse = response.json().await?;
        if listing.truncated {
            tracing::warn!(
                owner,
                repo,
                sha = %listing.sha,
                entries = listing.tree.len(),
                "tree listing was truncated by the server"
            );
        }

        let raw_base = Url::parse(&self.raw_base).map_err(|e| {
            SessionError::invalid_input(format!("invalid raw content base '{}': {}", self.raw_base, e))
        })?;
        let entries: Vec<ListedEntry> = listing.tree.into_iter().filter_map(listed_entry).collect();

        build_tree(entries, self.orphans, |path| {
            raw_content_url(&raw_base, owner, repo, branch, path)
        })
    }
}

#[async_trait]
impl FileContentClient for GitHubClient {
    async fn fetch_content(&self, url: &str, credential: Option<&str>) -> Result<String> {
        tracing::debug!(url, "fetching file content");
        let response = Self::authorize(self.client.get(url), credential).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.text().await?),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(SessionError::Unauthorized {
                    message: format!("{} while reading {}", status, url),
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SessionError::transport(format!(
                    "unexpected status {} for {}: {}",
                    status, url, body
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_raw_content_url() {
        let base = Url::parse("https://raw.githubusercontent.com").unwrap();
        assert_eq!(
            raw_content_url(&base, "acme", "widgets", "main", "src/lib.rs").unwrap(),
            "https://raw.githubusercontent.com/acme/widgets/main/src/lib.rs"
        );
    }

    #[test]
    fn test_raw_content_url_with_prefix_and_nested_branch() {
        let base = Url::parse("http://127.0.0.1:1234/raw/").unwrap();
        assert_eq!(
            raw_content_url(&base, "acme", "widgets", "feature/x", "docs/read me.md").unwrap(),
            "http://127.0.0.1:1234/raw/acme/widgets/feature/x/docs/read%20me.md"
        );
    }

    #[test]
    fn test_api_urls() {
        let client = GitHubClient::new();
        assert_eq!(client.repo_url("acme", "widgets"), "https://api.github.com/repos/acme/widgets");
        assert_eq!(
            client.tree_url("acme", "widgets", "main"),
            "https://api.github.com/repos/acme/widgets/git/trees/main"
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &headers));

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, &headers));
        assert!(!is_rate_limited(StatusCode::UNAUTHORIZED, &headers));
    }

    #[test]
    fn test_submodules_are_not_listed() {
        let item = TreeItem {
            path: "vendor/lib".to_string(),
            item_type: "commit".to_string(),
            sha: "abc".to_string(),
        };
        assert!(listed_entry(item).is_none());

        let item = TreeItem {
            path: "src".to_string(),
            item_type: "tree".to_string(),
            sha: "def".to_string(),
        };
        assert_eq!(listed_entry(item).unwrap().entry_type, EntryType::Directory);
    }
}

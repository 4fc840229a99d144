use reqwest::Url;

use crate::error::{Result, SessionError};

/// A parsed repository locator
///
/// Accepts `https://<host>/<owner>/<repo>[.git][/...]`; anything after the
/// repository segment (a `tree/<branch>/...` suffix, a query, a fragment) is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocator {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepositoryLocator {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = || {
            SessionError::invalid_input(format!(
                "'{}' is not a repository URL of the form https://<host>/<owner>/<repo>",
                input
            ))
        };

        let url = Url::parse(input).map_err(|_| invalid())?;
        if url.scheme() != "https" {
            return Err(invalid());
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;

        let mut segments = url.path_segments().ok_or_else(invalid)?;
        let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Canonical form of the locator; parsing it yields the same locator
    pub fn url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// `owner/repo` label used in logs and messages
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

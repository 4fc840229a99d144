use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{error::Result, types::RepositoryEntry};

/// Incremental assistant answer
///
/// Finite and not restartable. Chunk boundaries carry no meaning; the answer
/// is the in-order concatenation of every chunk.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Read-only access to a hosted repository's structure
///
/// Implementors talk to a source-hosting service (GitHub and compatible APIs)
#[async_trait]
pub trait RepositoryTreeClient: Send + Sync {
    /// Resolve the branch to browse when the user gave none
    ///
    /// Returns `SessionError::NotFound` if the repository does not exist or is
    /// not visible with the given credential
    async fn resolve_default_branch(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<String>;

    /// Fetch the full tree of a branch, nested and sorted
    ///
    /// # Arguments
    /// * `owner` - Repository owner (user or organization)
    /// * `repo` - Repository name
    /// * `branch` - Branch to list, usually from `resolve_default_branch`
    /// * `credential` - Access token for private repositories
    async fn fetch_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        credential: Option<&str>,
    ) -> Result<Vec<RepositoryEntry>>;
}

/// Fetches the raw text of a single file
#[async_trait]
pub trait FileContentClient: Send + Sync {
    /// Fetch file text from a content URL produced by the tree client
    ///
    /// Never cached; every call goes to the network
    async fn fetch_content(&self, url: &str, credential: Option<&str>) -> Result<String>;
}

/// Everything the assistant gets to see for one question
#[derive(Debug, Clone, Copy)]
pub struct AssistantRequest<'a> {
    pub tree: &'a [RepositoryEntry],
    pub selected_path: Option<&'a str>,
    pub selected_content: Option<&'a str>,
    pub query: &'a str,
}

/// A hosted language model answering questions about the repository
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Ask a question and wait for the whole answer
    async fn ask(&self, request: AssistantRequest<'_>) -> Result<String>;

    /// Ask a question and receive the answer as it is produced
    ///
    /// Errors that happen before the first chunk are returned directly;
    /// later ones arrive as an `Err` item in the stream
    async fn ask_stream(&self, request: AssistantRequest<'_>) -> Result<TextStream>;

    /// Human-readable identifier of the backend (for logging)
    fn identifier(&self) -> String;
}

pub mod assistant;
pub mod config;
pub mod credential;
pub mod error;
pub mod github;
pub mod language;
pub mod locator;
pub mod prompt;
pub mod session;
pub mod source;
pub mod store;
pub mod tree;
pub mod types;

pub use assistant::{GeminiClient, EMPTY_ANSWER};
pub use config::{Config, GenerationConfig, ReselectPolicy, SessionOptions};
pub use credential::{CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use error::{Result, SessionError};
pub use github::GitHubClient;
pub use language::language_for_path;
pub use locator::RepositoryLocator;
pub use session::{Outcome, RejectReason, SessionController, SessionEvent, SessionServices, SessionState};
pub use source::{AssistantClient, AssistantRequest, FileContentClient, RepositoryTreeClient, TextStream};
pub use store::{FileStore, MemoryStore, NullStore, SavedSession, SessionStore};
pub use tree::{build_tree, flatten_paths, render_tree, ListedEntry, OrphanPolicy};
pub use types::{ChatMessage, EntryType, MessageBody, RepositoryEntry, RepositoryRef, Role};

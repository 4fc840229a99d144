//! Session orchestration.
//!
//! [`SessionController`] owns the [`SessionState`] of one browsing session and
//! is the only thing that mutates it. Each user intent is a method; each
//! method returns an [`Outcome`] instead of an error, and the user-facing
//! error text lands in [`SessionState::last_error`].
//!
//! Repository fetches, file fetches and chat turns each carry a generation
//! number taken when they are issued. A completion is applied only if its
//! generation is still current, so a newer request always wins over an older
//! one regardless of which network call finishes first. In-flight calls are
//! never aborted; their results are simply dropped.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::{
    assistant::EMPTY_ANSWER,
    config::{ReselectPolicy, SessionOptions},
    credential::CredentialProvider,
    error::Result,
    language::language_for_path,
    locator::RepositoryLocator,
    source::{AssistantClient, AssistantRequest, FileContentClient, RepositoryTreeClient},
    store::{SavedSession, SessionStore},
    tree::{count_files, find_entry},
    types::{ChatMessage, RepositoryEntry, RepositoryRef, Role},
};

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_CAPACITY: usize = 1024;

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    /// Locator as last typed by the user
    pub locator: String,
    /// Hosting-service access token typed alongside the locator
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    /// Repository the tree belongs to
    pub repository: Option<RepositoryRef>,
    pub tree: Vec<RepositoryEntry>,
    pub selected_file_path: Option<String>,
    /// Always the latest successful fetch for `selected_file_path`
    pub current_file_content: Option<String>,
    pub chat_history: Vec<ChatMessage>,
    /// A repository or file fetch is in flight
    pub is_loading: bool,
    pub is_assistant_busy: bool,
    pub is_credential_selected: bool,
    pub last_error: Option<String>,
}

impl SessionState {
    /// Highlighting tag for the open file
    pub fn current_language(&self) -> Option<&'static str> {
        self.current_file_content.as_ref()?;
        self.selected_file_path.as_deref().map(language_for_path)
    }
}

/// Notifications published after each state change, in mutation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CredentialChanged { selected: bool },
    RepositoryLoading { locator: String },
    RepositoryLoaded { repository: RepositoryRef, files: usize },
    RepositoryFailed { message: String },
    FileLoading { path: String },
    FileLoaded { path: String, language: &'static str },
    FileFailed { path: String, message: String },
    MessageAdded { index: usize, role: Role },
    /// Full text of a streaming message after a chunk was appended
    ChatUpdated { index: usize, text: String },
    ChatCompleted { index: usize },
    ChatFailed { index: usize, message: String },
    Cleared,
}

/// Why an intent was refused without touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    CredentialNotSelected,
    AssistantBusy,
    EmptyQuery,
    NotAFile,
}

/// Result of a user intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The intent ran and its result is now in the state
    Applied,
    /// Nothing needed to change
    Unchanged,
    /// A newer intent of the same kind replaced this one before it finished
    Superseded,
    /// Refused locally
    Rejected(RejectReason),
    /// Failed; the message is also in `last_error`
    Failed(String),
}

/// Collaborators the controller coordinates
pub struct SessionServices {
    pub trees: Arc<dyn RepositoryTreeClient>,
    pub files: Arc<dyn FileContentClient>,
    pub assistant: Arc<dyn AssistantClient>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub store: Arc<dyn SessionStore>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    tree_generation: u64,
    file_generation: u64,
    chat_generation: u64,
    tree_pending: bool,
    file_pending: bool,
    /// Hosting credential the loaded tree was fetched with; used for file fetches
    tree_credential: Option<String>,
}

impl Inner {
    fn sync_loading(&mut self) {
        self.state.is_loading = self.tree_pending || self.file_pending;
    }

    fn reset_selection(&mut self) {
        self.file_generation += 1;
        self.file_pending = false;
        self.state.selected_file_path = None;
        self.state.current_file_content = None;
        self.sync_loading();
    }

    fn reset_chat(&mut self) {
        self.chat_generation += 1;
        self.state.chat_history.clear();
        self.state.is_assistant_busy = false;
    }
}

pub struct SessionController {
    services: SessionServices,
    options: SessionOptions,
    streaming: bool,
    inner: RwLock<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(services: SessionServices) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            services,
            options: SessionOptions::default(),
            streaming: true,
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether answers are requested as a stream (default) or in one piece
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Subscribe to state-change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Startup: check the credential gate, then resume the last session
    pub async fn initialize(&self) -> Outcome {
        let selected = match self.services.credentials.has_credential().await {
            Ok(selected) => selected,
            Err(e) => {
                tracing::warn!(error = %e, "credential check failed, treating as not selected");
                false
            }
        };
        self.set_credential_selected(selected).await;

        if !selected {
            return Outcome::Rejected(RejectReason::CredentialNotSelected);
        }
        self.resume().await
    }

    async fn resume(&self) -> Outcome {
        let saved = match self.services.store.saved_session().await {
            Ok(Some(saved)) => saved,
            Ok(None) => return Outcome::Unchanged,
            Err(e) => {
                tracing::warn!(error = %e, "could not read saved session");
                return Outcome::Unchanged;
            }
        };

        tracing::info!(locator = %saved.locator, "resuming previous session");
        self.load_repository(&saved.locator, saved.credential.as_deref())
            .await
    }

    /// Let the user pick an assistant credential and reopen the gate
    pub async fn reselect_credential(&self) -> Outcome {
        match self.services.credentials.request_credential().await {
            Ok(()) => {
                // the host's selection flow does not report its result; assume success
                self.set_credential_selected(true).await;
                self.inner.write().await.state.last_error = None;
                Outcome::Applied
            }
            Err(e) => {
                let message = e.user_message();
                self.inner.write().await.state.last_error = Some(message.clone());
                Outcome::Failed(message)
            }
        }
    }

    async fn set_credential_selected(&self, selected: bool) {
        let mut inner = self.inner.write().await;
        if inner.state.is_credential_selected != selected {
            inner.state.is_credential_selected = selected;
            self.emit(SessionEvent::CredentialChanged { selected });
        }
    }

    /// Load a repository's tree, replacing whatever was loaded before
    pub async fn load_repository(&self, locator: &str, credential: Option<&str>) -> Outcome {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);

        let (generation, parsed) = {
            let mut inner = self.inner.write().await;
            if !inner.state.is_credential_selected {
                return Outcome::Rejected(RejectReason::CredentialNotSelected);
            }

            inner.state.locator = locator.trim().to_string();
            inner.state.credential = credential.clone();

            let parsed = match RepositoryLocator::parse(locator) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // supersedes any load still in flight
                    inner.tree_generation += 1;
                    inner.tree_pending = false;
                    inner.sync_loading();
                    let message = e.user_message();
                    inner.state.last_error = Some(message.clone());
                    self.emit(SessionEvent::RepositoryFailed {
                        message: message.clone(),
                    });
                    return Outcome::Failed(message);
                }
            };

            inner.tree_generation += 1;
            inner.tree_pending = true;
            inner.state.last_error = None;
            inner.sync_loading();
            self.emit(SessionEvent::RepositoryLoading {
                locator: inner.state.locator.clone(),
            });
            (inner.tree_generation, parsed)
        };

        tracing::info!(repository = %parsed.slug(), generation, "loading repository");
        let result = self.fetch_repository(&parsed, credential.as_deref()).await;

        let mut inner = self.inner.write().await;
        if inner.tree_generation != generation {
            tracing::debug!(repository = %parsed.slug(), generation, "dropping superseded repository load");
            return Outcome::Superseded;
        }
        inner.tree_pending = false;

        match result {
            Ok((branch, tree)) => {
                let repository = RepositoryRef {
                    owner: parsed.owner,
                    name: parsed.repo,
                    branch,
                };
                let files = count_files(&tree);
                inner.state.repository = Some(repository.clone());
                inner.state.tree = tree;
                inner.tree_credential = credential.clone();
                inner.state.last_error = None;
                inner.reset_selection();
                inner.reset_chat();
                self.emit(SessionEvent::RepositoryLoaded { repository, files });
                drop(inner);

                self.remember(locator.trim(), credential.as_deref()).await;
                Outcome::Applied
            }
            Err(e) => {
                tracing::warn!(repository = %parsed.slug(), error = %e, "repository load failed");
                let message = e.user_message();
                inner.state.repository = None;
                inner.state.tree.clear();
                inner.tree_credential = None;
                inner.state.last_error = Some(message.clone());
                inner.reset_selection();
                self.emit(SessionEvent::RepositoryFailed {
                    message: message.clone(),
                });
                Outcome::Failed(message)
            }
        }
    }

    async fn fetch_repository(
        &self,
        locator: &RepositoryLocator,
        credential: Option<&str>,
    ) -> Result<(String, Vec<RepositoryEntry>)> {
        let trees = &self.services.trees;
        let branch = trees
            .resolve_default_branch(&locator.owner, &locator.repo, credential)
            .await?;
        let tree = trees
            .fetch_tree(&locator.owner, &locator.repo, &branch, credential)
            .await?;
        Ok((branch, tree))
    }

    async fn remember(&self, locator: &str, credential: Option<&str>) {
        let session = SavedSession {
            locator: locator.to_string(),
            credential: credential.map(String::from),
        };
        if let Err(e) = self.services.store.save_session(&session).await {
            tracing::warn!(error = %e, "could not save session");
        }
    }

    /// Open a file from the loaded tree
    pub async fn select_file(&self, path: &str) -> Outcome {
        let (generation, path, url, credential) = {
            let mut inner = self.inner.write().await;
            let (path, url) = match find_entry(&inner.state.tree, path) {
                Some(entry) if entry.is_file() => match &entry.content_url {
                    Some(url) => (entry.path.clone(), url.clone()),
                    None => return Outcome::Rejected(RejectReason::NotAFile),
                },
                _ => return Outcome::Rejected(RejectReason::NotAFile),
            };

            let already_open = inner.state.selected_file_path.as_deref() == Some(path.as_str())
                && inner.state.current_file_content.is_some();
            if already_open && self.options.reselect == ReselectPolicy::SkipIfLoaded {
                return Outcome::Unchanged;
            }

            inner.state.selected_file_path = Some(path.clone());
            inner.state.current_file_content = None;
            inner.state.last_error = None;
            inner.file_generation += 1;
            inner.file_pending = true;
            inner.sync_loading();
            self.emit(SessionEvent::FileLoading { path: path.clone() });
            (inner.file_generation, path, url, inner.tree_credential.clone())
        };

        let result = self
            .services
            .files
            .fetch_content(&url, credential.as_deref())
            .await;

        let mut inner = self.inner.write().await;
        if inner.file_generation != generation {
            tracing::debug!(path = %path, generation, "dropping superseded file fetch");
            return Outcome::Superseded;
        }
        inner.file_pending = false;
        inner.sync_loading();

        match result {
            Ok(content) => {
                inner.state.current_file_content = Some(content);
                self.emit(SessionEvent::FileLoaded {
                    language: language_for_path(&path),
                    path,
                });
                Outcome::Applied
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "file fetch failed");
                let message = e.user_message();
                inner.state.selected_file_path = None;
                inner.state.current_file_content = None;
                inner.state.last_error = Some(message.clone());
                self.emit(SessionEvent::FileFailed {
                    path,
                    message: message.clone(),
                });
                Outcome::Failed(message)
            }
        }
    }

    /// Ask the assistant a question about the loaded repository
    ///
    /// Refused while another answer is still in flight
    pub async fn send_message(&self, query: &str) -> Outcome {
        let query = query.trim();
        if query.is_empty() {
            return Outcome::Rejected(RejectReason::EmptyQuery);
        }

        let (generation, index, tree, selected_path, selected_content) = {
            let mut inner = self.inner.write().await;
            if !inner.state.is_credential_selected {
                return Outcome::Rejected(RejectReason::CredentialNotSelected);
            }
            if inner.state.is_assistant_busy {
                return Outcome::Rejected(RejectReason::AssistantBusy);
            }

            inner.state.chat_history.push(ChatMessage::user(query));
            self.emit(SessionEvent::MessageAdded {
                index: inner.state.chat_history.len() - 1,
                role: Role::User,
            });
            inner.state.chat_history.push(ChatMessage::pending_assistant());
            let index = inner.state.chat_history.len() - 1;
            self.emit(SessionEvent::MessageAdded {
                index,
                role: Role::Assistant,
            });

            inner.state.is_assistant_busy = true;
            inner.state.last_error = None;

            let content = inner.state.current_file_content.clone();
            let path = content
                .as_ref()
                .and(inner.state.selected_file_path.clone());
            (inner.chat_generation, index, inner.state.tree.clone(), path, content)
        };

        let request = AssistantRequest {
            tree: &tree,
            selected_path: selected_path.as_deref(),
            selected_content: selected_content.as_deref(),
            query,
        };
        tracing::debug!(
            assistant = %self.services.assistant.identifier(),
            streaming = self.streaming,
            "sending chat message"
        );
        let result = self.collect_answer(generation, index, request).await;

        let mut inner = self.inner.write().await;
        if inner.chat_generation != generation {
            tracing::debug!(generation, "dropping superseded chat answer");
            return Outcome::Superseded;
        }
        inner.state.is_assistant_busy = false;

        match result {
            Ok(()) => {
                if let Some(message) = inner.state.chat_history.get_mut(index) {
                    message.complete(EMPTY_ANSWER);
                }
                self.emit(SessionEvent::ChatCompleted { index });
                Outcome::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                if let Some(message) = inner.state.chat_history.get_mut(index) {
                    message.interrupt();
                }
                let message = e.user_message();
                inner.state.last_error = Some(message.clone());
                if e.requires_new_credential() && inner.state.is_credential_selected {
                    inner.state.is_credential_selected = false;
                    self.emit(SessionEvent::CredentialChanged { selected: false });
                }
                self.emit(SessionEvent::ChatFailed {
                    index,
                    message: message.clone(),
                });
                Outcome::Failed(message)
            }
        }
    }

    /// Feed the answer into the placeholder at `index`
    ///
    /// Stops early, without error, once the chat has been superseded
    async fn collect_answer(
        &self,
        generation: u64,
        index: usize,
        request: AssistantRequest<'_>,
    ) -> Result<()> {
        let assistant = &self.services.assistant;
        if !self.streaming {
            let answer = assistant.ask(request).await?;
            self.append_chunk(generation, index, &answer).await;
            return Ok(());
        }

        let mut chunks = assistant.ask_stream(request).await?;
        while let Some(chunk) = chunks.next().await {
            let chunk: String = chunk?;
            if !self.append_chunk(generation, index, &chunk).await {
                break;
            }
        }
        Ok(())
    }

    /// Returns false when the chat turn is no longer current
    async fn append_chunk(&self, generation: u64, index: usize, chunk: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.chat_generation != generation {
            return false;
        }
        if let Some(message) = inner.state.chat_history.get_mut(index) {
            if !chunk.is_empty() && message.append(chunk) {
                let text = message.text().to_string();
                self.emit(SessionEvent::ChatUpdated { index, text });
            }
        }
        true
    }

    /// Forget the repository, the selection, the conversation and the saved session
    ///
    /// The credential gate keeps its state.
    pub async fn clear_session(&self) -> Outcome {
        {
            let mut inner = self.inner.write().await;
            let is_credential_selected = inner.state.is_credential_selected;
            inner.tree_generation += 1;
            inner.tree_pending = false;
            inner.tree_credential = None;
            inner.reset_selection();
            inner.reset_chat();
            inner.state = SessionState {
                is_credential_selected,
                ..SessionState::default()
            };
            self.emit(SessionEvent::Cleared);
        }

        if let Err(e) = self.services.store.clear().await {
            tracing::warn!(error = %e, "could not clear saved session");
        }
        Outcome::Applied
    }
}

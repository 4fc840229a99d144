//! Hand-written collaborators for driving the session controller without network access
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Notify;

use repo_assistant::{
    build_tree, render_tree, AssistantClient, AssistantRequest, EntryType, FileContentClient,
    ListedEntry, MemoryStore, OrphanPolicy, RepositoryEntry, RepositoryTreeClient, Result,
    SavedSession, SessionController, SessionError, SessionServices, SessionStore, StaticCredentialProvider,
    TextStream,
};

/// Holds a call open until the test releases it
#[derive(Default)]
pub struct Gate {
    started: Notify,
    release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub fn content_url(owner: &str, repo: &str, branch: &str, path: &str) -> String {
    format!("mock://{}/{}/{}/{}", owner, repo, branch, path)
}

#[derive(Default)]
pub struct MockTrees {
    repos: HashMap<String, (String, Vec<ListedEntry>)>,
    gates: HashMap<String, Arc<Gate>>,
    denied: Vec<String>,
    pub calls: AtomicUsize,
    pub credentials: Mutex<Vec<Option<String>>>,
}

impl MockTrees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, slug: &str, branch: &str, items: &[(&str, EntryType)]) -> Self {
        let listing = items
            .iter()
            .enumerate()
            .map(|(i, (path, kind))| ListedEntry::new(*path, *kind, format!("{:040}", i)))
            .collect();
        self.repos.insert(slug.to_string(), (branch.to_string(), listing));
        self
    }

    pub fn with_gate(mut self, slug: &str, gate: Arc<Gate>) -> Self {
        self.gates.insert(slug.to_string(), gate);
        self
    }

    pub fn with_denied(mut self, slug: &str) -> Self {
        self.denied.push(slug.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryTreeClient for MockTrees {
    async fn resolve_default_branch(
        &self,
        owner: &str,
        repo: &str,
        credential: Option<&str>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(String::from));

        let slug = format!("{}/{}", owner, repo);
        if let Some(gate) = self.gates.get(&slug) {
            gate.pass().await;
        }
        if self.denied.contains(&slug) {
            return Err(SessionError::Unauthorized {
                message: "401 Bad credentials".to_string(),
            });
        }
        self.repos
            .get(&slug)
            .map(|(branch, _)| branch.clone())
            .ok_or(SessionError::NotFound { resource: slug })
    }

    async fn fetch_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        _credential: Option<&str>,
    ) -> Result<Vec<RepositoryEntry>> {
        let slug = format!("{}/{}", owner, repo);
        let (_, listing) = self
            .repos
            .get(&slug)
            .ok_or_else(|| SessionError::NotFound { resource: slug.clone() })?;
        build_tree(listing.clone(), OrphanPolicy::Skip, |path| {
            Ok(content_url(owner, repo, branch, path))
        })
    }
}

#[derive(Default)]
pub struct MockFiles {
    contents: HashMap<String, String>,
    gates: HashMap<String, Arc<Gate>>,
    denied: Vec<String>,
    pub calls: AtomicUsize,
    pub credentials: Mutex<Vec<Option<String>>>,
}

impl MockFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: String, content: &str) -> Self {
        self.contents.insert(url, content.to_string());
        self
    }

    pub fn with_gate(mut self, url: String, gate: Arc<Gate>) -> Self {
        self.gates.insert(url, gate);
        self
    }

    pub fn with_denied(mut self, url: String) -> Self {
        self.denied.push(url);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileContentClient for MockFiles {
    async fn fetch_content(&self, url: &str, credential: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(String::from));
        if let Some(gate) = self.gates.get(url) {
            gate.pass().await;
        }
        if self.denied.iter().any(|d| d == url) {
            return Err(SessionError::Unauthorized {
                message: format!("403 while reading {}", url),
            });
        }
        self.contents
            .get(url)
            .cloned()
            .ok_or_else(|| SessionError::Transport {
                message: format!("unexpected status 404 Not Found for {}", url),
            })
    }
}

/// What the mock assistant does with the next question
pub enum Script {
    Answer(Vec<&'static str>),
    FailBefore(fn() -> SessionError),
    FailAfter(Vec<&'static str>, fn() -> SessionError),
}

/// What the assistant was shown for one question
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub tree: String,
    pub selected_path: Option<String>,
    pub selected_content: Option<String>,
    pub query: String,
}

#[derive(Default)]
pub struct MockAssistant {
    scripts: Mutex<VecDeque<Script>>,
    gate: Option<Arc<Gate>>,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, script: Script) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    async fn begin(&self, request: &AssistantRequest<'_>) -> Script {
        self.seen.lock().unwrap().push(SeenRequest {
            tree: render_tree(request.tree),
            selected_path: request.selected_path.map(String::from),
            selected_content: request.selected_content.map(String::from),
            query: request.query.to_string(),
        });
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Answer(vec!["ok"]))
    }
}

#[async_trait]
impl AssistantClient for MockAssistant {
    async fn ask(&self, request: AssistantRequest<'_>) -> Result<String> {
        match self.begin(&request).await {
            Script::Answer(chunks) => Ok(chunks.concat()),
            Script::FailBefore(error) | Script::FailAfter(_, error) => Err(error()),
        }
    }

    async fn ask_stream(&self, request: AssistantRequest<'_>) -> Result<TextStream> {
        let items: Vec<Result<String>> = match self.begin(&request).await {
            Script::Answer(chunks) => chunks.into_iter().map(|c| Ok(c.to_string())).collect(),
            Script::FailBefore(error) => return Err(error()),
            Script::FailAfter(chunks, error) => chunks
                .into_iter()
                .map(|c| Ok(c.to_string()))
                .chain(std::iter::once(Err(error())))
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }

    fn identifier(&self) -> String {
        "mock".to_string()
    }
}

pub struct Harness {
    pub trees: Arc<MockTrees>,
    pub files: Arc<MockFiles>,
    pub assistant: Arc<MockAssistant>,
    pub credentials: Arc<StaticCredentialProvider>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(trees: MockTrees, files: MockFiles, assistant: MockAssistant) -> Self {
        Self {
            trees: Arc::new(trees),
            files: Arc::new(files),
            assistant: Arc::new(assistant),
            credentials: Arc::new(StaticCredentialProvider::new(true)),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Start from a session saved by an earlier run
    pub fn with_saved(mut self, session: SavedSession) -> Self {
        self.store = Arc::new(MemoryStore::with_session(session));
        self
    }

    pub fn without_credential(mut self) -> Self {
        self.credentials = Arc::new(StaticCredentialProvider::new(false));
        self
    }

    pub fn controller(&self) -> SessionController {
        SessionController::new(SessionServices {
            trees: self.trees.clone(),
            files: self.files.clone(),
            assistant: self.assistant.clone(),
            credentials: self.credentials.clone(),
            store: self.store.clone(),
        })
    }

    /// A controller that has already passed the credential gate
    pub async fn ready_controller(&self) -> SessionController {
        let controller = self.controller();
        controller.initialize().await;
        controller
    }

    pub async fn saved(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap()
    }
}

pub fn widgets_repo() -> MockTrees {
    MockTrees::new().with_repo(
        "acme/widgets",
        "main",
        &[
            ("README.md", EntryType::File),
            ("src", EntryType::Directory),
            ("src/lib.rs", EntryType::File),
            ("src/app.ts", EntryType::File),
        ],
    )
}

pub fn widgets_url(path: &str) -> String {
    content_url("acme", "widgets", "main", path)
}

//! Repository Assistant - ask questions about a GitHub repository from the terminal
//!
//! # Usage
//! ```bash
//! GEMINI_API_KEY=... repo-assistant https://github.com/owner/repo
//! repo-assistant --state-file ~/.cache/repo-assistant.json   # resume last repository
//! ```
//!
//! Lines typed at the prompt are questions, except for these commands:
//! `:open <path>`, `:tree`, `:clear`, `:key`, `:quit`.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repo_assistant::{
    render_tree, Config, FileStore, GeminiClient, GitHubClient, MemoryStore, Outcome,
    RejectReason, SessionController, SessionEvent, SessionServices, SessionStore,
    StaticCredentialProvider,
};

/// Browse a GitHub repository and ask an LLM about it
#[derive(Parser)]
#[command(name = "repo-assistant")]
#[command(about = "Ask an assistant about a GitHub repository", long_about = None)]
struct Cli {
    /// Repository address, e.g. https://github.com/owner/repo
    #[arg(value_name = "LOCATOR")]
    locator: Option<String>,

    /// Access token for private repositories (defaults to $GITHUB_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Wait for whole answers instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Remember the last repository in this file between runs
    #[arg(long, value_name = "FILE")]
    state_file: Option<PathBuf>,
}

/// Renders session events as plain terminal output
#[derive(Default)]
struct Printer {
    /// Characters of the streaming answer already written
    shown: usize,
}

impl Printer {
    fn print(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::CredentialChanged { selected: false } => {
                eprintln!("assistant key is no longer selected; use :key after fixing it");
            }
            SessionEvent::CredentialChanged { selected: true } => {}
            SessionEvent::RepositoryLoading { locator } => eprintln!("loading {}...", locator),
            SessionEvent::RepositoryLoaded { repository, files } => {
                println!(
                    "{}/{} ({}), {} files",
                    repository.owner, repository.name, repository.branch, files
                );
            }
            SessionEvent::RepositoryFailed { message } => eprintln!("error: {}", message),
            SessionEvent::FileLoading { path } => eprintln!("opening {}...", path),
            SessionEvent::FileLoaded { path, language } => println!("{} [{}]", path, language),
            SessionEvent::FileFailed { path, message } => eprintln!("{}: {}", path, message),
            SessionEvent::MessageAdded { .. } => self.shown = 0,
            SessionEvent::ChatUpdated { text, .. } => {
                if let Some(delta) = text.get(self.shown..) {
                    print!("{}", delta);
                    let _ = std::io::stdout().flush();
                }
                self.shown = text.len();
            }
            SessionEvent::ChatCompleted { .. } => println!(),
            SessionEvent::ChatFailed { message, .. } => {
                println!();
                eprintln!("error: {}", message);
            }
            SessionEvent::Cleared => println!("session cleared"),
        }
    }

    fn drain(&mut self, events: &mut broadcast::Receiver<SessionEvent>) {
        loop {
            match events.try_recv() {
                Ok(event) => self.print(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal fell behind session events");
                }
                Err(_) => break,
            }
        }
    }

    /// Drive an intent to completion while printing the events it produces
    async fn run<F>(&mut self, events: &mut broadcast::Receiver<SessionEvent>, intent: F) -> Outcome
    where
        F: Future<Output = Outcome>,
    {
        tokio::pin!(intent);
        let outcome = loop {
            tokio::select! {
                outcome = &mut intent => break outcome,
                Ok(event) = events.recv() => self.print(event),
            }
        };
        self.drain(events);
        outcome
    }
}

fn explain(outcome: &Outcome) {
    match outcome {
        Outcome::Rejected(RejectReason::CredentialNotSelected) => {
            eprintln!("no assistant key selected; set GEMINI_API_KEY and use :key");
        }
        Outcome::Rejected(RejectReason::AssistantBusy) => eprintln!("still answering"),
        Outcome::Rejected(RejectReason::NotAFile) => eprintln!("not a file in the loaded tree"),
        // failures were already printed from their events
        _ => {}
    }
}

#[tokio::main]
async fn main() -> repo_assistant::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env();
    let streaming = config.assistant.streaming && !cli.no_stream;
    let token = cli.token.clone().or_else(|| config.github.token.clone());

    let github = Arc::new(GitHubClient::from_config(&config.github));
    let assistant = GeminiClient::new(&config.assistant, config.generation.clone());
    let credentials = Arc::new(StaticCredentialProvider::new(
        config.assistant.api_key.is_some(),
    ));
    let store: Arc<dyn SessionStore> = match &cli.state_file {
        Some(path) => Arc::new(FileStore::new(path.clone()).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let controller = SessionController::new(SessionServices {
        trees: github.clone(),
        files: github,
        assistant: Arc::new(assistant),
        credentials,
        store,
    })
    .with_options(config.session)
    .with_streaming(streaming);

    let mut events = controller.subscribe();
    let mut printer = Printer::default();

    let outcome = printer.run(&mut events, controller.initialize()).await;
    explain(&outcome);
    if let Some(locator) = &cli.locator {
        let outcome = printer
            .run(&mut events, controller.load_repository(locator, token.as_deref()))
            .await;
        explain(&outcome);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let outcome = match line.split_once(' ').unwrap_or((line, "")) {
            (":quit", _) | (":q", _) => break,
            (":tree", _) => {
                print!("{}", render_tree(&controller.state().await.tree));
                continue;
            }
            (":open", path) => printer.run(&mut events, controller.select_file(path.trim())).await,
            (":load", locator) => {
                printer
                    .run(
                        &mut events,
                        controller.load_repository(locator.trim(), token.as_deref()),
                    )
                    .await
            }
            (":clear", _) => printer.run(&mut events, controller.clear_session()).await,
            (":key", _) => printer.run(&mut events, controller.reselect_credential()).await,
            _ => printer.run(&mut events, controller.send_message(line)).await,
        };
        explain(&outcome);
    }

    Ok(())
}

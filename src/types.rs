use serde::{Deserialize, Serialize};

/// A single file or directory node in a repository tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Last path component
    pub name: String,
    /// Slash-joined path relative to the repository root
    pub path: String,
    /// Type of entry
    pub entry_type: EntryType,
    /// Raw content address, present on every file entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    /// Object hash reported by the hosting service
    pub identity_hash: String,
    /// Ordered children, present on every directory entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<RepositoryEntry>>,
}

impl RepositoryEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Children of a directory, empty for files
    pub fn children(&self) -> &[RepositoryEntry] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Type of repository entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// Owner, name and branch of the repository a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Text of a chat message together with its delivery state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MessageBody {
    /// Answer still arriving; text only ever grows
    Streaming { partial_text: String },
    /// Final text, never mutated again
    Complete { text: String },
    /// Answer cut short by an error; keeps whatever arrived
    Interrupted { partial_text: String },
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub body: MessageBody,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::Complete { text: text.into() },
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Complete { text: text.into() },
        }
    }

    /// An assistant placeholder that chunks get appended to
    pub fn pending_assistant() -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Streaming {
                partial_text: String::new(),
            },
        }
    }

    pub fn text(&self) -> &str {
        match &self.body {
            MessageBody::Streaming { partial_text } => partial_text,
            MessageBody::Complete { text } => text,
            MessageBody::Interrupted { partial_text } => partial_text,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, MessageBody::Streaming { .. })
    }

    /// Append a chunk to a streaming message
    ///
    /// Returns false (and leaves the message untouched) once the message is final
    pub(crate) fn append(&mut self, chunk: &str) -> bool {
        match &mut self.body {
            MessageBody::Streaming { partial_text } => {
                partial_text.push_str(chunk);
                true
            }
            _ => false,
        }
    }

    /// Freeze a streaming message as complete
    pub(crate) fn complete(&mut self, fallback: &str) {
        if let MessageBody::Streaming { partial_text } = &mut self.body {
            let text = if partial_text.trim().is_empty() {
                fallback.to_string()
            } else {
                std::mem::take(partial_text)
            };
            self.body = MessageBody::Complete { text };
        }
    }

    /// Freeze a streaming message after a failure, keeping the partial text
    pub(crate) fn interrupt(&mut self) {
        if let MessageBody::Streaming { partial_text } = &mut self.body {
            self.body = MessageBody::Interrupted {
                partial_text: std::mem::take(partial_text),
            };
        }
    }
}

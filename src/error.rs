use thiserror::Error;

/// Errors that can occur while browsing a repository or talking to the assistant
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid repository locator: {message}")]
    InvalidInput { message: String },

    #[error("Repository not found: {resource}")]
    NotFound { resource: String },

    #[error("Access denied by the hosting service: {message}")]
    Unauthorized { message: String },

    #[error("No assistant API key is configured")]
    MissingCredential,

    #[error("The assistant API key was rejected: {message}")]
    InvalidCredential { message: String },

    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        SessionError::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        SessionError::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether this is a generic network / non-2xx failure
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SessionError::Transport { .. }
                | SessionError::Network(_)
                | SessionError::Serialization(_)
        )
    }

    /// Whether the user must pick a new assistant credential before retrying
    pub fn requires_new_credential(&self) -> bool {
        matches!(self, SessionError::InvalidCredential { .. })
    }

    /// Text shown to the user in the error banner
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidCredential { .. } => {
                "The assistant API key is invalid or was not found. Please select a valid key and try again."
                    .to_string()
            }
            SessionError::MissingCredential => {
                "No assistant API key is configured. Please select a key first.".to_string()
            }
            SessionError::Unauthorized { .. } => {
                "Access denied. Check that your access token is valid and can read this repository."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SessionError::transport("boom").is_transport());
        assert!(!SessionError::MissingCredential.is_transport());
        assert!(SessionError::InvalidCredential {
            message: "API key not valid".to_string()
        }
        .requires_new_credential());
        assert!(!SessionError::Unauthorized {
            message: "bad token".to_string()
        }
        .requires_new_credential());
    }

    #[test]
    fn test_user_message_mentions_key_on_invalid_credential() {
        let err = SessionError::InvalidCredential {
            message: "Requested entity was not found.".to_string(),
        };
        assert!(err.user_message().contains("select a valid key"));

        let err = SessionError::NotFound {
            resource: "acme/widgets".to_string(),
        };
        assert_eq!(err.user_message(), "Repository not found: acme/widgets");
    }
}

//! Runtime configuration.
//!
//! Defaults target github.com and the public Gemini endpoint. A JSON file may
//! override any subset of fields; environment variables are applied last.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::OrphanPolicy;

/// Environment variables consulted for the assistant key, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const MODEL_VAR: &str = "REPO_ASSISTANT_MODEL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub assistant: AssistantConfig,
    pub generation: GenerationConfig,
    pub session: SessionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    pub raw_base: String,
    pub user_agent: String,
    /// Default access token for private repositories
    pub token: Option<String>,
    pub orphans: OrphanPolicy,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            user_agent: concat!("repo-assistant/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
            orphans: OrphanPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Render answers incrementally instead of waiting for the full text
    pub streaming: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            streaming: true,
        }
    }
}

/// Sampling parameters, identical for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
        }
    }
}

/// How the controller treats a click on the file that is already open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReselectPolicy {
    /// Keep the loaded content, no network call
    #[default]
    SkipIfLoaded,
    /// Fetch the file again
    AlwaysRefetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub reselect: ReselectPolicy,
}

impl Config {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overlay values from the process environment
    pub fn apply_env(mut self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok());
        self
    }

    fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = API_KEY_VARS.iter().find_map(|name| present(*name)) {
            self.assistant.api_key = Some(key);
        }
        if let Some(token) = present(GITHUB_TOKEN_VAR) {
            self.github.token = Some(token);
        }
        if let Some(model) = present(MODEL_VAR) {
            self.assistant.model = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"assistant": {{"model": "gemini-test", "streaming": false}},
                "generation": {{"topK": 40}},
                "github": {{"orphans": "reject"}},
                "session": {{"reselect": "always_refetch"}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.assistant.model, "gemini-test");
        assert!(!config.assistant.streaming);
        assert_eq!(config.assistant.base_url, AssistantConfig::default().base_url);
        assert_eq!(config.generation.top_k, 40);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.github.orphans, OrphanPolicy::Reject);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert_eq!(config.session.reselect, ReselectPolicy::AlwaysRefetch);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("API_KEY", "fallback-key"),
            ("GEMINI_API_KEY", "  "),
            ("GITHUB_TOKEN", "ghp_123"),
        ]);
        let mut config = Config::default();
        config.apply_vars(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.assistant.api_key.as_deref(), Some("fallback-key"));
        assert_eq!(config.github.token.as_deref(), Some("ghp_123"));
        assert_eq!(config.assistant.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = Config::default();
        config.assistant.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AssistantConfig, GenerationConfig},
    error::{Result, SessionError},
    prompt::build_prompt,
    source::{AssistantClient, AssistantRequest, TextStream},
};

/// Answer used when the model returns no text at all
pub const EMPTY_ANSWER: &str = "No response received from the assistant.";

/// Client for the Gemini generative-language API
///
/// - `models/{model}:generateContent` for whole answers
/// - `models/{model}:streamGenerateContent?alt=sse` for incremental answers
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    generation: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

impl GeminiClient {
    /// Create a new Gemini client
    ///
    /// # Arguments
    /// * `config` - API base address, model name and key (a blank key counts as missing)
    /// * `generation` - Sampling parameters sent with every request
    pub fn new(config: &AssistantConfig, generation: GenerationConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            generation,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    async fn post(&self, url: &str, request: &AssistantRequest<'_>) -> Result<Response> {
        let api_key = self.api_key.as_deref().ok_or(SessionError::MissingCredential)?;
        let prompt = build_prompt(request);
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
            generation_config: &self.generation,
        };

        tracing::debug!(
            url,
            prompt_chars = prompt.len(),
            has_file = request.selected_content.is_some(),
            "assistant request"
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }
}

/// Map a failed model API response onto the error taxonomy
async fn api_error(response: Response) -> SessionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.clone());

    if is_credential_failure(status, parsed.as_ref().map(|e| &e.error)) {
        tracing::warn!(%status, "assistant API rejected the credential");
        SessionError::InvalidCredential { message }
    } else {
        SessionError::transport(format!("assistant API returned {}: {}", status, message))
    }
}

fn is_credential_failure(status: StatusCode, error: Option<&ErrorBody>) -> bool {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return true;
    }
    let Some(error) = error else {
        return false;
    };
    let invalid_key = error.message.contains("API key not valid")
        || error
            .details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"));
    let unknown_key = status == StatusCode::NOT_FOUND
        && error.message.contains("Requested entity was not found");
    (status == StatusCode::BAD_REQUEST && invalid_key) || unknown_key
}

fn chunk_text(payload: &str) -> Result<Option<String>> {
    let response: GenerateResponse = serde_json::from_str(payload)?;
    let text = response.text();
    Ok((!text.is_empty()).then_some(text))
}

fn stream_error(error: EventStreamError<reqwest::Error>) -> SessionError {
    match error {
        EventStreamError::Transport(e) => e.into(),
        other => SessionError::transport(format!("malformed answer stream: {}", other)),
    }
}

/// Turn a server-sent-events response body into text chunks in arrival order
fn text_chunks(response: Response) -> TextStream {
    response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| async move {
            match event {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => chunk_text(&event.data).transpose(),
                Err(e) => Some(Err(stream_error(e))),
            }
        })
        .boxed()
}

#[async_trait]
impl AssistantClient for GeminiClient {
    async fn ask(&self, request: AssistantRequest<'_>) -> Result<String> {
        let response = self.post(&self.endpoint("generateContent"), &request).await?;
        let answer: GenerateResponse = response.json().await?;
        let text = answer.text();

        if text.trim().is_empty() {
            tracing::warn!(model = %self.model, "assistant returned an empty answer");
            return Ok(EMPTY_ANSWER.to_string());
        }
        Ok(text)
    }

    async fn ask_stream(&self, request: AssistantRequest<'_>) -> Result<TextStream> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, &request).await?;
        Ok(text_chunks(response))
    }

    fn identifier(&self) -> String {
        format!("gemini://{}", self.model)
    }
}

use crate::completion::{
    extractor_format_schema, Client, CompletionError, CompletionModel, Extractor, Message,
    MessageHistory, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument};

const URL: &str = "http://localhost:11434/api/chat";
const DEFAULT_MODEL: &str = "gemma3:1b";
const DEFAULT_TEMP: f64 = 0.5;
const DEFAULT_TOKENS: usize = 2400;
// negative keep_alive keeps the model resident between requests
const DEFAULT_KEEP_ALIVE: i64 = -1;

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ModelConfig {
    api_url: Option<String>,
    model: Option<String>,
    keep_alive: Option<i64>,
}

/// Completion model served by a locally reachable
/// [Ollama](https://ollama.com) daemon.
///
/// No API key handling: the endpoint is local.
pub struct OllamaCompletionModel {
    api_url: String,
    client: reqwest::Client,
    model: String,
    keep_alive: i64,
}

impl OllamaCompletionModel {
    /// Creates a new `OllamaCompletionModel`, optionally configured with a
    /// json string holding any of `api_url`, `model` and `keep_alive`.
    ///
    /// # Panics
    /// Panics if the provided json is malformed or contains unknown fields.
    #[instrument]
    #[must_use]
    pub fn new(json_config: Option<&str>) -> Self {
        let (api_url, model, keep_alive) = if let Some(json) = json_config {
            let config = match serde_json::from_str::<ModelConfig>(json) {
                Ok(config) => config,
                Err(e) => {
                    let e = format!("Failed to deserialize json config: {e}");
                    error!(e);
                    panic!("{e}");
                }
            };
            (
                config.api_url.unwrap_or(URL.to_string()),
                config.model.unwrap_or(DEFAULT_MODEL.to_string()),
                config.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE),
            )
        } else {
            (URL.to_string(), DEFAULT_MODEL.to_string(), DEFAULT_KEEP_ALIVE)
        };
        Self {
            api_url,
            client: reqwest::Client::new(),
            model,
            keep_alive,
        }
    }
}

#[derive(Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "role", content = "content")]
#[allow(non_camel_case_types)]
enum OllamaMessage {
    system(String),
    user(String),
    assistant(String),
}

impl From<Message> for OllamaMessage {
    fn from(value: Message) -> OllamaMessage {
        match value {
            Message::Preamble(s) => OllamaMessage::system(s),
            Message::User(s) => Self::user(s),
            Message::Assistant(s) => Self::assistant(s),
        }
    }
}

// Ollama omits the eval counts on prompt cache hits, so absent counts map
// to `None` instead of a parse error.
fn parse_token_usage(response_json: &serde_json::Value) -> TokenUsage {
    let prompt_tokens = response_json["prompt_eval_count"].as_u64();
    let completion_tokens = response_json["eval_count"].as_u64();
    let total_tokens = match (prompt_tokens, completion_tokens) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    };
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    }
}

#[allow(refining_impl_trait)]
#[async_trait]
impl CompletionModel for OllamaCompletionModel {
    fn build_client(self, preamble: impl AsRef<str>) -> Client<Self> {
        Client::new(self, preamble, DEFAULT_TEMP, DEFAULT_TOKENS)
    }

    #[instrument(
        skip(self, history, temperature),
        fields(history_len = history.len())
    )]
    async fn send(
        &mut self,
        message: Message,
        history: &MessageHistory,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<(Message, TokenUsage), CompletionError> {
        let mut messages = history.clone();
        messages.push(message);
        let messages: Vec<_> = messages
            .into_iter()
            .map(Into::<OllamaMessage>::into)
            .collect();

        let request_body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "keep_alive": self.keep_alive,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        debug!(request_body = ?request_body, "Sending request to Ollama");

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Request failed");
                CompletionError::RequestError(e.to_string())
            })?;

        let status = response.status();
        debug!(%status, "Received API response");

        if !status.is_success() {
            let error_msg = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error (failed to read response body)".to_string());

            error!(
                status = %status,
                error = %error_msg,
                "API returned error response"
            );

            return Err(CompletionError::ProviderError(status.into(), error_msg));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            error!(error = ?e, "Failed to parse response JSON");
            CompletionError::ParseError(e.to_string())
        })?;

        let resp_msg_json = &response_json["message"]["content"];
        let mut response_message = String::new();
        if !resp_msg_json.is_null() {
            response_message = resp_msg_json
                .as_str()
                .ok_or(CompletionError::ParseError(
                    "Invalid response body".to_string(),
                ))?
                .to_string();
        }

        let token_usage = parse_token_usage(&response_json);
        info!(
            prompt_tokens = token_usage.prompt_tokens,
            completion_tokens = token_usage.completion_tokens,
            total_tokens = token_usage.total_tokens,
            "Token usage recorded"
        );

        Ok((Message::Assistant(response_message), token_usage))
    }

    #[instrument(
        skip(self, history, temperature),
        fields(history_len = history.len())
    )]
    async fn extract<T: Extractor>(
        &mut self,
        message: Message,
        history: &MessageHistory,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<T, CompletionError> {
        let mut messages = history.clone();
        messages.push(message);
        let messages: Vec<_> = messages
            .into_iter()
            .map(Into::<OllamaMessage>::into)
            .collect();
        info!(
            message_count = messages.len(),
            "Preparing extraction request"
        );

        let format = extractor_format_schema::<T>().map_err(|e| {
            error!(error = ?e, "Failed to serialize extractor");
            CompletionError::ParseError(format!("Failed to serialize extractor: {e}"))
        })?;

        let request_body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "keep_alive": self.keep_alive,
            "format": format,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });
        debug!(request_body = ?request_body, "Sending extraction request");

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CompletionError::RequestError(e.to_string()))?;

        let status = response.status();
        debug!(%status, "Received extraction response");

        if !status.is_success() {
            let error_msg = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error (failed to read response body)".to_string());

            error!(
                status = %status,
                error = %error_msg,
                "Extraction API returned error"
            );
            return Err(CompletionError::ProviderError(status.into(), error_msg));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            error!(error = ?e, "Failed to parse extraction response JSON");
            CompletionError::ParseError(e.to_string())
        })?;

        let extracted_str = response_json["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                error!("Missing content in extraction response");
                CompletionError::ParseError("Missing content".to_string())
            })?;

        let extracted: T = serde_json::from_str(extracted_str)
            .map_err(|e| {
                error!(error = ?e, raw_response = %extracted_str, "Failed to deserialize extracted content");
                CompletionError::ParseError(e.to_string())})?;

        info!(
            extractor_type = std::any::type_name::<T>(),
            "Successfully extracted data"
        );
        Ok(extracted)
    }
}

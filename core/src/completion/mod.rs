use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Message that'll be sent in Completions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// System prompt
    Preamble(String),
    /// Message sent by the user
    User(String),
    /// Response from the assistant
    Assistant(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

pub(crate) type MessageHistory = Vec<Message>;

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Provider error -> HTTP Status {0}: {1}")]
    ProviderError(u16, String),
    #[error("RequestError: {0}")]
    RequestError(String),
    #[error("ParseError: {0}")]
    ParseError(String),
    #[error(transparent)]
    ExtractorError(#[from] ExtractionError),
}

/// Types the LLM can be asked to shape its output into
pub trait Extractor: schemars::JsonSchema + serde::de::DeserializeOwned {}

#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("Model does not support extraction")]
    ExtractionNotSupported,
}

#[async_trait]
pub trait CompletionModel: Send {
    /// Build the completion model
    fn build_client(self, preamble: impl AsRef<str>) -> Client<impl CompletionModel>;

    /// Send message to LLM and get a reply
    async fn send(
        &mut self,
        message: Message,
        history: &MessageHistory,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<(Message, TokenUsage), CompletionError>;

    #[allow(unused)]
    /// Send message to the LLM and have the response deserialized to the type you specified
    async fn extract<T: Extractor>(
        &mut self,
        message: Message,
        history: &MessageHistory,
        temperature: f64,
        max_tokens: usize,
    ) -> Result<T, CompletionError> {
        Err(CompletionError::ExtractorError(
            ExtractionError::ExtractionNotSupported,
        ))
    }
}

pub struct Client<M: CompletionModel> {
    completion_model: Arc<RwLock<M>>,

    // the preamble, kept as a one-message history
    history: MessageHistory,

    // common prompt parameters
    temperature: f64,
    max_tokens: usize,

    token_usage: TokenUsage,
}

pub struct PromptBuilder<'a, M: CompletionModel> {
    prompt: String,
    client: &'a mut Client<M>,
}

impl<'a, M: CompletionModel> PromptBuilder<'a, M> {
    fn new(client: &'a mut Client<M>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            client,
        }
    }

    /// Prompt the LLM and have the response deserialized into the type you specified
    pub async fn extract<T: Extractor>(self) -> Result<T, crate::error::Error> {
        let message = Message::User(self.prompt);

        let model = self.client.completion_model.clone();
        let mut guard = model.write().await;

        guard
            .extract::<T>(
                message,
                &self.client.history,
                self.client.temperature,
                self.client.max_tokens,
            )
            .await
            .map_err(Into::into)
    }

    /// Sends the prompt to the LLM
    pub async fn send(self) -> Result<Message, crate::error::Error> {
        let message = Message::User(self.prompt);

        let model = self.client.completion_model.clone();
        let (response, token_usage) = {
            let mut guard = model.write().await;
            guard
                .send(
                    message,
                    &self.client.history,
                    self.client.temperature,
                    self.client.max_tokens,
                )
                .await?
        };

        self.client.update_token_usage(&token_usage);
        if token_usage.total_tokens.is_some() {
            info!(
                "Prompt used up: {:?} tokens, Total tokens used: {:?}",
                token_usage.total_tokens, self.client.token_usage.total_tokens
            );
        }

        Ok(response)
    }
}

impl<M: CompletionModel> Client<M> {
    pub fn new(
        completion_model: M,
        preamble: impl AsRef<str>,
        temperature: f64,
        max_tokens: usize,
    ) -> Self {
        Self {
            completion_model: Arc::new(RwLock::new(completion_model)),
            history: vec![Message::Preamble(String::from(preamble.as_ref()))],
            temperature,
            max_tokens,
            token_usage: TokenUsage::default(),
        }
    }

    /// Creates a `PromptBuilder` instance.
    ///
    /// Prompts are one-shot: neither the prompt nor the response is appended
    /// to the client's history.
    pub fn prompt(&mut self, prompt: impl Into<String>) -> PromptBuilder<M> {
        PromptBuilder::new(self, prompt)
    }

    /// Token counts accumulated across every prompt sent through this client
    #[must_use]
    pub fn token_usage(&self) -> &TokenUsage {
        &self.token_usage
    }

    fn update_token_usage(&mut self, usage: &TokenUsage) {
        self.token_usage.prompt_tokens =
            combine_options(self.token_usage.prompt_tokens, usage.prompt_tokens);
        self.token_usage.completion_tokens =
            combine_options(self.token_usage.completion_tokens, usage.completion_tokens);
        self.token_usage.total_tokens =
            combine_options(self.token_usage.total_tokens, usage.total_tokens);
    }
}

/// Renders `T`'s schema the way providers expect it in a `format`-style
/// constraint: subschemas inlined, objects closed
pub fn extractor_format_schema<T: schemars::JsonSchema>(
) -> Result<serde_json::Value, serde_json::error::Error> {
    let settings = SchemaSettings::default().with(|s| {
        s.inline_subschemas = true;
    });
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut schema_value = serde_json::to_value(&schema)?;

    if let Some(obj) = schema_value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("format");
        obj.remove("title");
    }
    process_json_value(&mut schema_value);
    Ok(schema_value)
}

fn process_json_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(obj) => {
            let fields_to_remove = ["$schema", "format", "title", "minimum"];
            for &f in &fields_to_remove {
                if obj.get(f).map_or(false, |v| v.is_string() || v.is_number()) {
                    obj.remove(f);
                }
            }
            if let Some(v) = obj.get("oneOf").cloned() {
                obj.remove("oneOf");
                obj.insert("anyOf".to_string(), v);
            };

            if obj.contains_key("properties") {
                obj.insert("additionalProperties".to_string(), serde_json::json!(false));
            }
            for (_, v) in obj.iter_mut() {
                process_json_value(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for elem in arr.iter_mut() {
                process_json_value(elem);
            }
        }
        _ => {}
    }
}

fn combine_options(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a_val), Some(b_val)) => Some(a_val + b_val),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[allow(unused)]
    #[derive(JsonSchema, Deserialize)]
    struct Attendee {
        name: String,
        #[schemars(required)]
        email: Option<String>,
    }

    #[allow(unused)]
    #[derive(JsonSchema, Deserialize)]
    struct Meeting {
        purpose: String,
        attendees: Vec<Attendee>,
    }

    #[allow(unused)]
    #[derive(JsonSchema, Deserialize)]
    enum Reminder {
        Once { date: String },
        Repeating { weekday: String, count: u8 },
    }

    #[test]
    fn format_schema_strips_metadata_and_closes_objects() {
        let schema = extractor_format_schema::<Meeting>().unwrap();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("$schema"));
        assert!(!obj.contains_key("title"));
        assert!(!obj.contains_key("definitions"));
        assert_eq!(obj["additionalProperties"], json!(false));

        let attendee = &schema["properties"]["attendees"]["items"];
        assert_eq!(attendee["additionalProperties"], json!(false));
        assert!(attendee["properties"]["email"].is_object());
    }

    #[test]
    fn format_schema_never_emits_one_of() {
        let schema = extractor_format_schema::<Reminder>().unwrap();
        assert!(!schema.to_string().contains("\"oneOf\""));
    }

    #[test]
    fn token_usage_combines_only_when_both_sides_present() {
        assert_eq!(combine_options(Some(2), Some(3)), Some(5));
        assert_eq!(combine_options(Some(2), None), None);
        assert_eq!(combine_options(None, Some(3)), None);
        assert_eq!(combine_options(None, None), None);
    }

    struct EchoModel;

    #[async_trait]
    impl CompletionModel for EchoModel {
        fn build_client(self, preamble: impl AsRef<str>) -> Client<impl CompletionModel> {
            Client::new(self, preamble, 0.0, 16)
        }

        async fn send(
            &mut self,
            message: Message,
            history: &MessageHistory,
            _temperature: f64,
            _max_tokens: usize,
        ) -> Result<(Message, TokenUsage), CompletionError> {
            assert!(matches!(history.first(), Some(Message::Preamble(_))));
            let Message::User(content) = message else {
                return Err(CompletionError::RequestError(
                    "expected a user message".to_string(),
                ));
            };
            Ok((
                Message::Assistant(content),
                TokenUsage {
                    prompt_tokens: Some(2),
                    completion_tokens: Some(3),
                    total_tokens: Some(5),
                },
            ))
        }
    }

    #[tokio::test]
    async fn send_accumulates_token_usage_across_prompts() {
        let mut client = EchoModel.build_client("You are a helpful assistant");
        let reply = client.prompt("hello").send().await.unwrap();
        assert_eq!(reply, Message::Assistant("hello".to_string()));

        client.prompt("again").send().await.unwrap();
        assert_eq!(client.token_usage().prompt_tokens, Some(4));
        assert_eq!(client.token_usage().total_tokens, Some(10));
    }

    #[tokio::test]
    async fn prompts_do_not_grow_the_history() {
        let mut client = EchoModel.build_client("preamble");
        client.prompt("one").send().await.unwrap();
        client.prompt("two").send().await.unwrap();
        assert_eq!(client.history.len(), 1);
    }

    #[tokio::test]
    async fn extract_defaults_to_not_supported() {
        #[derive(JsonSchema, Deserialize, Debug)]
        struct Probe {
            #[allow(unused)]
            value: u32,
        }
        impl Extractor for Probe {}

        let mut model = EchoModel;
        let err = model
            .extract::<Probe>(Message::User("anything".to_string()), &vec![], 0.0, 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::ExtractorError(ExtractionError::ExtractionNotSupported)
        ));
    }
}

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::conversation::{ConversationMessage, Role};
use crate::retry::{retry, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport failure or non-success status from the completion API.
    #[error("completion API error: {0}")]
    Api(String),

    #[error("completion API returned no content")]
    EmptyCompletion,

    #[error("could not build completion request: {0}")]
    Request(String),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ConversationMessage]) -> Result<String, LlmError>;
}

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.llm_url)
            .with_api_key(&config.llm_api_key);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http),
            model: config.llm_model.clone(),
            retry: config.retry_policy(),
        })
    }

    fn to_request_messages(
        messages: &[ConversationMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let built: Result<ChatCompletionRequestMessage, _> = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.as_str())
                        .build()
                        .map(Into::into),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.as_str())
                        .build()
                        .map(Into::into),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.as_str())
                        .build()
                        .map(Into::into),
                };
                built.map_err(|e| LlmError::Request(e.to_string()))
            })
            .collect()
    }

    async fn complete_once(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(|text| text.trim_start_matches('\n'))
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }

        Ok(content.to_string())
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, messages: &[ConversationMessage]) -> Result<String, LlmError> {
        let request_messages = Self::to_request_messages(messages)?;
        debug!("Requesting completion for {} messages", request_messages.len());

        retry(
            self.retry,
            "chat completion",
            |e: &LlmError| matches!(e, LlmError::Api(_)),
            || self.complete_once(request_messages.clone()),
        )
        .await
    }
}

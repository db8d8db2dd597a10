use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionTool,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Represents a tool call requested by the LLM.
pub type ToolCall = async_openai::types::ChatCompletionMessageToolCall;

/// Represents the events that can be yielded from a streaming text response.
#[derive(Debug, Clone)]
pub enum LLMStreamEvent {
    TextChunk(String),
}

/// A stream of text chunks from the LLM.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent, OpenAIError>> + Send>>;

/// Represents the two possible outcomes of the LLM's initial decision-making turn.
#[derive(Debug, Clone)]
pub enum LLMAction {
    /// The LLM decided to respond directly with text.
    TextResponse(String),
    /// The LLM decided to call one or more tools.
    ToolCall(Vec<ToolCall>),
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call to the LLM to decide on the next action.
    async fn decide_action(
        &self,
        system_prompt: String,
        history_with_user_message: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction>;

    /// Makes a streaming call to the LLM after tools have been executed.
    async fn stream_after_tools(
        &self,
        system_prompt: String,
        history_with_tool_results: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream>;
}

/// Drains an `LLMStream` into the full response text.
pub async fn collect_stream(mut stream: LLMStream) -> Result<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        let LLMStreamEvent::TextChunk(chunk) = event?;
        text.push_str(&chunk);
    }
    Ok(text)
}

/// Prepends the system prompt, if any, to a message history.
fn with_system_prompt(
    system_prompt: String,
    mut messages: Vec<ChatCompletionRequestMessage>,
) -> Result<Vec<ChatCompletionRequestMessage>> {
    if !system_prompt.is_empty() {
        messages.insert(
            0,
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        );
    }
    Ok(messages)
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn decide_action(
        &self,
        system_prompt: String,
        history_with_user_message: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(with_system_prompt(system_prompt, history_with_user_message)?)
            .tools(tools)
            .tool_choice("auto")
            .build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .context("No response choice from LLM")?;

        match (&choice.message.tool_calls, &choice.message.content) {
            (Some(tool_calls), _) if !tool_calls.is_empty() => {
                Ok(LLMAction::ToolCall(tool_calls.clone()))
            }
            (_, Some(content)) => Ok(LLMAction::TextResponse(content.clone())),
            _ => Err(anyhow!(
                "LLM response had neither text content nor tool calls."
            )),
        }
    }

    async fn stream_after_tools(
        &self,
        system_prompt: String,
        history_with_tool_results: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(with_system_prompt(system_prompt, history_with_tool_results)?)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => {
                    let content = response.choices.first()?.delta.content.clone()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(LLMStreamEvent::TextChunk(content)))
                    }
                }
                Err(e) => Some(Err(e)),
            }
        })))
    }
}

/// A deterministic `LLMClient` for running the service without a provider.
///
/// It never requests tools and answers every turn with a short, friendly
/// acknowledgement.
pub struct OfflineLLMClient;

const OFFLINE_REPLY: &str =
    "Thanks for sharing! I'm running in offline mode, but I'm happy to keep chatting.";

#[async_trait]
impl LLMClient for OfflineLLMClient {
    async fn decide_action(
        &self,
        _system_prompt: String,
        _history_with_user_message: Vec<ChatCompletionRequestMessage>,
        _tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMAction> {
        Ok(LLMAction::TextResponse(OFFLINE_REPLY.to_string()))
    }

    async fn stream_after_tools(
        &self,
        _system_prompt: String,
        _history_with_tool_results: Vec<ChatCompletionRequestMessage>,
    ) -> Result<LLMStream> {
        let chunks: Vec<Result<LLMStreamEvent, OpenAIError>> =
            vec![Ok(LLMStreamEvent::TextChunk(OFFLINE_REPLY.to_string()))];
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_joins_chunks() {
        let chunks: Vec<Result<LLMStreamEvent, OpenAIError>> = vec![
            Ok(LLMStreamEvent::TextChunk("Hello, ".to_string())),
            Ok(LLMStreamEvent::TextChunk("Ana!".to_string())),
        ];
        let stream: LLMStream = Box::pin(tokio_stream::iter(chunks));
        assert_eq!(collect_stream(stream).await.unwrap(), "Hello, Ana!");
    }

    #[tokio::test]
    async fn test_offline_client_replies_with_text() {
        let action = OfflineLLMClient
            .decide_action(String::new(), vec![], vec![])
            .await
            .unwrap();
        assert!(matches!(action, LLMAction::TextResponse(text) if text == OFFLINE_REPLY));
    }
}

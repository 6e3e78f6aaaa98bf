use async_trait::async_trait;
use log::{ debug, info };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::chat::{ ChatMessage, ChatRole, MessageType };

use super::{ full_response_as_stream, BoxError, ChatClient, ChatError, ChatRequest, TextStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::Role;

/// Providers reached through `rllm`. They answer in one piece, delivered as a
/// single-fragment stream.
pub struct HostedChatClient {
    llm_type: LlmType,
    backend: LLMBackend,
    api_key: String,
    model: String,
    base_url: Option<String>,
}

fn backend_for(llm_type: LlmType) -> Option<(LLMBackend, &'static str)> {
    match llm_type {
        LlmType::OpenAI => Some((LLMBackend::OpenAI, "gpt-4o-mini")),
        LlmType::Anthropic => Some((LLMBackend::Anthropic, "claude-3-5-haiku-latest")),
        LlmType::DeepSeek => Some((LLMBackend::DeepSeek, "deepseek-chat")),
        LlmType::XAI => Some((LLMBackend::XAI, "grok-2-latest")),
        LlmType::Groq => Some((LLMBackend::Groq, "llama-3.3-70b-versatile")),
        LlmType::Gemini | LlmType::Ollama => None,
    }
}

fn to_chat_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = request.history
        .iter()
        .filter(|m| !m.is_streaming && !m.content.is_empty())
        .map(|m| ChatMessage {
            role: match m.role {
                Role::User => ChatRole::User,
                Role::Model => ChatRole::Assistant,
            },
            content: m.content.clone(),
            message_type: MessageType::Text,
        })
        .collect();
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: request.message.clone(),
        message_type: MessageType::Text,
    });
    messages
}

impl HostedChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let (backend, default_model) = backend_for(config.llm_type).ok_or_else(||
            format!("{} is not served through rllm", config.llm_type)
        )?;
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ChatError::MissingApiKey(config.llm_type))?;

        Ok(Self {
            llm_type: config.llm_type,
            backend,
            api_key,
            model: config.completion_model.clone().unwrap_or_else(|| default_model.to_string()),
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ChatClient for HostedChatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, BoxError> {
        info!(
            "HostedChatClient::stream_chat() → type={} model={} base_url={:?}",
            self.llm_type,
            self.model,
            self.base_url
        );
        if request.image.is_some() {
            debug!("{} client ignores image attachments", self.llm_type);
        }

        let backend = self.backend.clone();
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let base_url = self.base_url.clone();
        let messages = to_chat_messages(&request);
        let system = request.system_instruction;
        let temperature = request.temperature;

        Ok(
            full_response_as_stream(move || async move {
                let mut builder = LLMBuilder::new()
                    .backend(backend)
                    .api_key(api_key)
                    .model(&model)
                    .system(system)
                    .stream(false);
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                if let Some(temp) = temperature {
                    builder = builder.temperature(temp);
                }
                let provider = builder.build()?;

                let resp = provider.chat(&messages).await.map_err(|e| Box::new(e) as BoxError)?;
                Ok(
                    resp
                        .text()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| resp.to_string())
                )
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn llm_type(&self) -> LlmType {
        self.llm_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::ModeFlags;
    use crate::models::chat::Message;

    #[test]
    fn requires_api_key_and_supported_backend() {
        let no_key = LlmConfig { llm_type: LlmType::OpenAI, ..LlmConfig::default() };
        assert!(HostedChatClient::from_config(&no_key).is_err());

        let gemini = LlmConfig {
            llm_type: LlmType::Gemini,
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        assert!(HostedChatClient::from_config(&gemini).is_err());

        let groq = LlmConfig {
            llm_type: LlmType::Groq,
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        let client = HostedChatClient::from_config(&groq).unwrap();
        assert_eq!(client.get_model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn history_skips_empty_messages() {
        let mut empty = Message::placeholder("m");
        empty.is_streaming = false;
        let request = ChatRequest {
            message: "now".into(),
            history: vec![Message::user("before", None), empty],
            image: None,
            model_id: "m".into(),
            modes: ModeFlags::default(),
            system_instruction: String::new(),
            temperature: None,
        };
        let messages = to_chat_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "now");
    }
}

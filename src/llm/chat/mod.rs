pub mod gemini;
pub mod hosted;
pub mod ollama;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType };
use self::gemini::GeminiChatClient;
use self::hosted::HostedChatClient;
use self::ollama::OllamaClient;
use crate::models::chat::Message;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Lazy, ordered, finite sequence of text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0} API key is missing")]
    MissingApiKey(LlmType),

    #[error("model '{0}' is not available")]
    ModelUnavailable(String),

    #[error("HTTP {status}: {body}")] Http {
        status: u16,
        body: String,
    },

    #[error("request failed: {0}")] Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtMode {
    #[default]
    Normal,
    Deep,
    Code,
}

impl fmt::Display for ThoughtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThoughtMode::Normal => write!(f, "normal"),
            ThoughtMode::Deep => write!(f, "deep"),
            ThoughtMode::Code => write!(f, "code"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub thought: ThoughtMode,
    pub web_search: bool,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    /// Prior transcript; never contains a message that is still streaming.
    pub history: Vec<Message>,
    pub image: Option<String>,
    pub model_id: String,
    pub modes: ModeFlags,
    pub system_instruction: String,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, BoxError>;

    fn get_model(&self) -> String;

    fn llm_type(&self) -> LlmType;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TextStream
    where
        F: FnOnce(mpsc::Sender<Result<String, BoxError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Wraps a one-shot completion as a single-fragment stream.
pub fn full_response_as_stream<F, Fut>(response_fn: F) -> TextStream
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static
{
    create_streaming_response(move |tx| async move {
        let _ = tx.send(response_fn().await).await;
    })
}

/// POSTs `payload` and feeds every complete response line through
/// `line_parser`. Lines split across network chunks are reassembled.
pub fn http_stream_generate(
    http: reqwest::Client,
    url: String,
    payload: impl Serialize + Send + 'static,
    line_parser: fn(&str) -> Option<String>,
    headers: Vec<(String, String)>
) -> TextStream {
    create_streaming_response(move |tx| async move {
        let mut req = http.post(&url).json(&payload);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let _ = tx.send(Err(Box::new(ChatError::Transport(e)) as BoxError)).await;
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = ChatError::Http { status: status.as_u16(), body };
            let _ = tx.send(Err(Box::new(err) as BoxError)).await;
            return;
        }

        let mut pending: Vec<u8> = Vec::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.extend_from_slice(&buf);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        if let Some(tok) = line_parser(line.trim_end()) {
                            if tx.send(Ok(tok)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(Box::new(ChatError::Transport(e)) as BoxError)).await;
                    return;
                }
            }
        }

        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            if let Some(tok) = line_parser(line.trim_end()) {
                let _ = tx.send(Ok(tok)).await;
            }
        }
    })
}

/// Splits a `data:<mime>;base64,<payload>` URL. Bare base64 is assumed to be JPEG.
pub fn split_data_url(image: &str) -> (String, String) {
    if let Some(rest) = image.strip_prefix("data:") {
        if let Some((meta, data)) = rest.split_once(',') {
            let mime = meta.split(';').next().filter(|m| !m.is_empty()).unwrap_or("image/jpeg");
            return (mime.to_string(), data.to_string());
        }
    }
    ("image/jpeg".to_string(), image.to_string())
}

const IMAGE_VERBS: &[&str] = &["generate", "draw", "create", "make"];
const IMAGE_NOUNS: &[&str] = &["image", "picture", "photo", "art"];

/// True when the prompt asks for a picture: a creation verb followed, anywhere
/// later in the text, by an image noun.
pub fn wants_image_generation(message: &str) -> bool {
    let lower = message.to_lowercase();
    let verb_end = IMAGE_VERBS.iter()
        .filter_map(|v| lower.find(v).map(|pos| pos + v.len()))
        .min();
    match verb_end {
        Some(end) => IMAGE_NOUNS.iter().any(|n| lower[end..].contains(n)),
        None => false,
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => Arc::new(GeminiChatClient::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        LlmType::OpenAI | LlmType::Anthropic | LlmType::DeepSeek | LlmType::XAI | LlmType::Groq => {
            Arc::new(HostedChatClient::from_config(config)?)
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_urls() {
        assert_eq!(
            split_data_url("data:image/png;base64,AAAA"),
            ("image/png".to_string(), "AAAA".to_string())
        );
        assert_eq!(split_data_url("BBBB"), ("image/jpeg".to_string(), "BBBB".to_string()));
    }

    #[test]
    fn detects_image_generation_prompts() {
        assert!(wants_image_generation("Please draw me a picture of a cat"));
        assert!(wants_image_generation("GENERATE an image"));
        assert!(!wants_image_generation("What is a picture? Please create one sentence"));
        assert!(!wants_image_generation("hello there"));
    }

    #[tokio::test]
    async fn full_response_becomes_one_fragment() {
        let mut stream = full_response_as_stream(|| async { Ok("whole answer".to_string()) });
        assert_eq!(stream.next().await.unwrap().unwrap(), "whole answer");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn full_response_error_is_forwarded() {
        let mut stream = full_response_as_stream(|| async {
            Err::<String, BoxError>("boom".into())
        });
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}

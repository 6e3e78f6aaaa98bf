use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, split_data_url, BoxError, ChatClient, ChatRequest, TextStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::Role;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize, Debug)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatStreamRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
}

fn parse_ollama_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(resp) => {
            if resp.done {
                debug!("Ollama stream reported done");
            }
            resp.message.map(|m| m.content).filter(|c| !c.is_empty())
        }
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, line);
            None
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "cogito:3b".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    fn build_request(&self, request: &ChatRequest) -> ChatStreamRequest {
        let mut messages = vec![OllamaMessage {
            role: "system".to_string(),
            content: request.system_instruction.clone(),
            images: Vec::new(),
        }];

        for msg in request.history.iter().filter(|m| !m.is_streaming) {
            if msg.content.is_empty() && msg.image.is_none() {
                continue;
            }
            let role = match msg.role {
                Role::User => "user",
                Role::Model => "assistant",
            };
            messages.push(OllamaMessage {
                role: role.to_string(),
                content: msg.content.clone(),
                images: msg.image
                    .iter()
                    .map(|i| split_data_url(i).1)
                    .collect(),
            });
        }

        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: request.message.clone(),
            images: request.image
                .iter()
                .map(|i| split_data_url(i).1)
                .collect(),
        });

        ChatStreamRequest {
            model: self.completion_model.clone(),
            messages,
            stream: true,
            options: request.temperature.map(|temperature| OllamaOptions { temperature }),
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, BoxError> {
        info!(
            "OllamaClient::stream_chat() → model={} base_url={}",
            self.completion_model,
            self.base_url
        );
        let payload = self.build_request(&request);
        let url = format!("{}/api/chat", self.base_url);
        Ok(http_stream_generate(self.http.clone(), url, payload, parse_ollama_line, Vec::new()))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::ModeFlags;
    use crate::models::chat::Message;

    #[test]
    fn parses_ndjson_lines() {
        assert_eq!(
            parse_ollama_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#).as_deref(),
            Some("Hi")
        );
        assert_eq!(parse_ollama_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#), None);
        assert_eq!(parse_ollama_line("garbage"), None);
    }

    #[test]
    fn request_has_system_history_and_current_turn() {
        let client = OllamaClient::new(None, Some("llama3".into()));
        let mut reply = Message::placeholder("model-gemini");
        reply.content = "Sure".into();
        reply.is_streaming = false;
        let request = ChatRequest {
            message: "next".into(),
            history: vec![Message::user("first", Some("data:image/jpeg;base64,SU1H".into())), reply],
            image: None,
            model_id: "model-gemini".into(),
            modes: ModeFlags::default(),
            system_instruction: "sys".into(),
            temperature: None,
        };
        let json = serde_json::to_value(client.build_request(&request)).unwrap();
        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json["messages"][1]["images"][0], "SU1H");
        assert_eq!(json["model"], "llama3");
        assert!(json.get("options").is_none());
    }
}

use async_trait::async_trait;
use futures::StreamExt;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{
    full_response_as_stream,
    http_stream_generate,
    split_data_url,
    wants_image_generation,
    BoxError,
    ChatClient,
    ChatError,
    ChatRequest,
    TextStream,
    ThoughtMode,
};
use crate::llm::models::{ resolve_model, IMAGE_MODEL };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ Message, Role };

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

fn image_part(image: &str) -> Part {
    let (mime_type, data) = split_data_url(image);
    Part {
        text: None,
        inline_data: Some(InlineData { mime_type, data }),
    }
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        inline_data: None,
    }
}

/// Maps a settled message to a Gemini turn; messages with nothing to send are dropped.
fn message_to_content(msg: &Message) -> Option<Content> {
    let mut parts = Vec::new();
    if let Some(image) = &msg.image {
        parts.push(image_part(image));
    }
    if !msg.content.is_empty() {
        parts.push(text_part(&msg.content));
    }
    if parts.is_empty() {
        return None;
    }
    let role = match msg.role {
        Role::User => "user",
        Role::Model => "model",
    };
    Some(Content { role: Some(role.to_string()), parts })
}

fn render_parts(parts: &[Part]) -> String {
    let mut out = String::new();
    for part in parts {
        if let Some(inline) = &part.inline_data {
            let mime = if inline.mime_type.is_empty() { "image/png" } else { &inline.mime_type };
            out.push_str(&format!("\n\n![Generated Image](data:{};base64,{})\n\n", mime, inline.data));
        }
        if let Some(text) = &part.text {
            out.push_str(text);
        }
    }
    out
}

fn parse_gemini_sse_line(line: &str) -> Option<String> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let chunk = serde_json::from_str::<GenerateContentResponse>(payload).ok()?;
    let text = chunk.candidates
        .first()
        .map(|c| render_parts(&c.content.parts))
        .unwrap_or_default();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model_override: Option<String>,
}

impl GeminiChatClient {
    pub fn new(api_key: String, base_url: Option<String>, model_override: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key,
            base_url: base_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model_override,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ChatError::MissingApiKey(LlmType::Gemini))?;
        Ok(Self::new(api_key, config.base_url.clone(), config.completion_model.clone()))
    }

    fn endpoint(&self, model: &str, action: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, action)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("x-goog-api-key".to_string(), self.api_key.clone())
        ]
    }

    fn build_request(request: &ChatRequest) -> GenerateContentRequest {
        let profile = resolve_model(&request.model_id);

        let mut contents: Vec<Content> = request.history
            .iter()
            .filter(|m| !m.is_streaming)
            .filter_map(message_to_content)
            .collect();

        let mut current = Vec::new();
        if let Some(image) = &request.image {
            current.push(image_part(image));
        }
        current.push(text_part(&request.message));
        contents.push(Content { role: Some("user".to_string()), parts: current });

        let mut tools = Vec::new();
        if request.modes.web_search || profile.always_search {
            tools.push(serde_json::json!({ "googleSearch": {} }));
        }

        let thinking_config = match request.modes.thought {
            ThoughtMode::Deep => None,
            ThoughtMode::Normal | ThoughtMode::Code => Some(ThinkingConfig { thinking_budget: 0 }),
        };

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![text_part(&request.system_instruction)],
            }),
            tools,
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                thinking_config,
            }),
        }
    }

    fn generate_image(&self, prompt: String) -> TextStream {
        let http = self.http.clone();
        let url = self.endpoint(IMAGE_MODEL, "generateContent");
        let headers = self.headers();
        info!("GeminiChatClient::generate_image() → model={}", IMAGE_MODEL);

        full_response_as_stream(move || async move {
            let body = GenerateContentRequest {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![text_part(&prompt)],
                }],
                system_instruction: None,
                tools: Vec::new(),
                generation_config: None,
            };
            let mut req = http.post(&url).json(&body);
            for (name, value) in headers {
                req = req.header(name, value);
            }
            let resp = req.send().await.map_err(ChatError::Transport)?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(map_status(status.as_u16(), body, IMAGE_MODEL));
            }
            let parsed: GenerateContentResponse = resp.json().await.map_err(ChatError::Transport)?;
            let text = parsed.candidates
                .first()
                .map(|c| render_parts(&c.content.parts))
                .unwrap_or_default();
            if text.is_empty() {
                return Err(Box::new(ChatError::Decode("image model returned no content".into())) as BoxError);
            }
            Ok(text)
        })
    }
}

fn map_status(status: u16, body: String, model: &str) -> BoxError {
    if status == 404 || body.contains("NOT_FOUND") {
        Box::new(ChatError::ModelUnavailable(model.to_string()))
    } else {
        Box::new(ChatError::Http { status, body })
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, BoxError> {
        if wants_image_generation(&request.message) {
            return Ok(self.generate_image(request.message));
        }

        let profile = resolve_model(&request.model_id);
        let model = self.model_override.clone().unwrap_or_else(|| profile.backend_model.to_string());
        info!(
            "GeminiChatClient::stream_chat() → persona={} model={} history={} modes={:?}",
            profile.id,
            model,
            request.history.len(),
            request.modes
        );

        let payload = Self::build_request(&request);
        let url = format!("{}?alt=sse", self.endpoint(&model, "streamGenerateContent"));
        let stream = http_stream_generate(
            self.http.clone(),
            url,
            payload,
            parse_gemini_sse_line,
            self.headers()
        );

        Ok(
            Box::pin(
                stream.map(move |item| {
                    item.map_err(|e| match e.downcast::<ChatError>() {
                        Ok(chat_err) =>
                            match *chat_err {
                                ChatError::Http { status, body } => map_status(status, body, &model),
                                other => Box::new(other) as BoxError,
                            }
                        Err(e) => e,
                    })
                })
            )
        )
    }

    fn get_model(&self) -> String {
        self.model_override.clone().unwrap_or_else(|| resolve_model("").backend_model.to_string())
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Gemini
    }
}

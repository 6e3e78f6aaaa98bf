use chrono::Utc;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::sync::atomic::{ AtomicI64, Ordering };

static LAST_ID: AtomicI64 = AtomicI64::new(0);

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Returns a millisecond-timestamp identifier that is strictly greater than
/// every identifier previously handed out by this process.
pub fn next_id() -> String {
    let now = now_millis();
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = if now > prev { now } else { prev + 1 };
        match LAST_ID.compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => {
                return candidate.to_string();
            }
            Err(actual) => {
                prev = actual;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_streaming: bool,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_liked: bool,
}

impl Message {
    pub fn user(content: &str, image: Option<String>) -> Self {
        Self {
            id: next_id(),
            role: Role::User,
            content: content.to_string(),
            image,
            is_streaming: false,
            timestamp: now_millis(),
            model_id: None,
            is_liked: false,
        }
    }

    /// An empty model message that fragments will be written into.
    pub fn placeholder(model_id: &str) -> Self {
        Self {
            id: next_id(),
            role: Role::Model,
            content: String::new(),
            image: None,
            is_streaming: true,
            timestamp: now_millis(),
            model_id: Some(model_id.to_string()),
            is_liked: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: i64,
    pub model_id: String,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub user_defined_title: bool,
}

impl Session {
    pub fn streaming_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_streaming)
            .count()
    }

    pub fn matches_term(&self, lower_term: &str) -> bool {
        self.title.to_lowercase().contains(lower_term) ||
            self.messages.iter().any(|m| m.content.to_lowercase().contains(lower_term))
    }
}

/// What the conversation side hands to the store on every transcript change.
#[derive(Clone, Debug)]
pub struct SessionUpdate {
    pub id: String,
    pub messages: Vec<Message>,
    pub model_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let ids: Vec<i64> = (0..500).map(|_| next_id().parse().unwrap()).collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn message_json_uses_camel_case_field_names() {
        let mut msg = Message::placeholder("model-gemini");
        msg.content = "hi".to_string();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "model");
        assert_eq!(json["isStreaming"], true);
        assert_eq!(json["modelId"], "model-gemini");
        assert!(json.get("isLiked").is_none());
        assert!(json.get("image").is_none());
    }

    #[test]
    fn session_defaults_missing_flags() {
        let raw =
            r#"{"id":"1","title":"t","messages":[{"id":"2","role":"user","content":"x","timestamp":5}],"updatedAt":9,"modelId":"m"}"#;
        let session: Session = serde_json::from_str(raw).unwrap();
        assert!(!session.is_pinned);
        assert!(!session.user_defined_title);
        assert!(!session.messages[0].is_streaming);
        assert_eq!(session.messages[0].role, Role::User);
    }
}

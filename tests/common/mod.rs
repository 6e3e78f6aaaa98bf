#![allow(dead_code)]

use async_trait::async_trait;
use bev_chat::config::settings::AppSettings;
use bev_chat::conversation::ConversationController;
use bev_chat::history::{ SessionStore, SharedSessionStore };
use bev_chat::llm::chat::{ BoxError, ChatClient, ChatRequest, TextStream };
use bev_chat::llm::LlmType;
use bev_chat::storage::{ FileStorage, KeyValueStore, MemoryStorage, StorageError };
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// What the scripted client answers for one call, in order.
pub enum Reply {
    Fragments(Vec<&'static str>),
    FailAfter(Vec<&'static str>, &'static str),
    Manual(mpsc::Receiver<Result<String, BoxError>>),
    Refuse(&'static str),
}

#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, BoxError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front().ok_or("scripted client has no replies left")?;
        Ok(match reply {
            Reply::Fragments(parts) => {
                Box::pin(futures::stream::iter(parts.into_iter().map(|p| Ok(p.to_string()))))
            }
            Reply::FailAfter(parts, error) => {
                let mut items: Vec<Result<String, BoxError>> = parts
                    .into_iter()
                    .map(|p| Ok(p.to_string()))
                    .collect();
                items.push(Err(error.into()));
                Box::pin(futures::stream::iter(items))
            }
            Reply::Manual(rx) => ReceiverStream::new(rx).boxed(),
            Reply::Refuse(error) => {
                return Err(error.into());
            }
        })
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn llm_type(&self) -> LlmType {
        LlmType::Gemini
    }
}

/// Accepts reads but refuses every write, like a full browser quota.
pub struct FullStorage;

impl KeyValueStore for FullStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, value: &str) -> Result<(), StorageError> {
        Err(StorageError::QuotaExceeded { size: value.len(), limit: 0 })
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

pub fn memory_store() -> SharedSessionStore {
    SessionStore::new(Arc::new(MemoryStorage::new())).into_shared()
}

pub fn create_temp_storage() -> (Arc<dyn KeyValueStore>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let storage = FileStorage::open(dir.path().to_path_buf(), None).expect("open file storage");
    (Arc::new(storage), dir)
}

pub fn controller(store: SharedSessionStore, client: Arc<ScriptedClient>) -> ConversationController {
    ConversationController::new(store, client, AppSettings::default())
}

mod turn;

pub use turn::{ TurnOutcome, TurnState };

use self::turn::TurnHandle;
use crate::config::prompt::build_system_instruction;
use crate::config::settings::AppSettings;
use crate::history::SharedSessionStore;
use crate::llm::chat::{ ChatClient, ChatRequest, ModeFlags, ThoughtMode };
use crate::llm::models::resolve_model;
use crate::models::chat::{ next_id, Message, SessionUpdate };
use crate::models::event::ConversationEvent;
use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::Arc;
use tokio::sync::{ broadcast, Mutex };

const EVENT_CAPACITY: usize = 1024;

struct ActiveConversation {
    session_id: Option<String>,
    model_id: String,
    transcript: Vec<Message>,
    generation: u64,
    state: TurnState,
    modes: ModeFlags,
}

impl ActiveConversation {
    fn is_current(&self, turn: &TurnHandle) -> bool {
        self.generation == turn.generation && self.session_id.as_deref() == Some(turn.session_id.as_str())
    }

    /// Freezes whatever message is still streaming and returns its id.
    fn freeze_streaming(&mut self) -> Option<String> {
        let mut frozen = None;
        for msg in self.transcript.iter_mut().filter(|m| m.is_streaming) {
            msg.is_streaming = false;
            frozen = Some(msg.id.clone());
        }
        frozen
    }

    fn update(&self) -> Option<SessionUpdate> {
        let id = self.session_id.clone()?;
        Some(SessionUpdate {
            id,
            messages: self.transcript.clone(),
            model_id: self.model_id.clone(),
        })
    }
}

/// Owns the active transcript and drives turns against the chat client. The
/// handle is cheap to clone; clones share the same conversation.
#[derive(Clone)]
pub struct ConversationController {
    active: Arc<Mutex<ActiveConversation>>,
    store: SharedSessionStore,
    client: Arc<dyn ChatClient>,
    settings: Arc<AppSettings>,
    events: broadcast::Sender<ConversationEvent>,
}

impl ConversationController {
    pub fn new(store: SharedSessionStore, client: Arc<dyn ChatClient>, settings: AppSettings) -> Self {
        let thought = if settings.deep_research_enabled { ThoughtMode::Deep } else { ThoughtMode::Normal };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            active: Arc::new(
                Mutex::new(ActiveConversation {
                    session_id: None,
                    model_id: resolve_model(&settings.default_model_id).id.to_string(),
                    transcript: Vec::new(),
                    generation: 0,
                    state: TurnState::Idle,
                    modes: ModeFlags { thought, web_search: false },
                })
            ),
            store,
            client,
            settings: Arc::new(settings),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    pub async fn state(&self) -> TurnState {
        self.active.lock().await.state
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.active.lock().await.session_id.clone()
    }

    pub async fn model_id(&self) -> String {
        self.active.lock().await.model_id.clone()
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.active.lock().await.transcript.clone()
    }

    pub async fn modes(&self) -> ModeFlags {
        self.active.lock().await.modes
    }

    pub async fn set_modes(&self, modes: ModeFlags) {
        self.active.lock().await.modes = modes;
    }

    pub async fn set_thought_mode(&self, thought: ThoughtMode) {
        self.active.lock().await.modes.thought = thought;
    }

    /// Flips web-search grounding and returns the new value.
    pub async fn toggle_web_search(&self) -> bool {
        let mut active = self.active.lock().await;
        active.modes.web_search = !active.modes.web_search;
        active.modes.web_search
    }

    /// Starts an empty conversation. It reaches the store only once the
    /// first message is sent.
    pub async fn new_session(&self, model_id: &str) -> String {
        let mut active = self.active.lock().await;
        self.abandon(&mut active).await;
        let id = self.activate_empty(&mut active, model_id);
        info!("Started new session {} with {}", id, active.model_id);
        id
    }

    /// Loads a stored session as the active transcript. Unknown ids are ignored.
    pub async fn select_session(&self, id: &str) -> bool {
        let mut active = self.active.lock().await;
        let Some(session) = self.store.lock().await.get(id).cloned() else {
            debug!("select_session: no session {}", id);
            return false;
        };
        self.abandon(&mut active).await;

        active.session_id = Some(session.id.clone());
        active.model_id = session.model_id.clone();
        active.transcript = session.messages;
        active.state = TurnState::Idle;
        if active.freeze_streaming().is_some() {
            self.reconcile(&active).await;
        }

        self.emit(ConversationEvent::SessionActivated {
            session_id: session.id,
            model_id: session.model_id,
        });
        true
    }

    /// Removes the active session from the store and moves on to a fresh one
    /// with the same model.
    pub async fn delete_active_session(&self) -> bool {
        let mut active = self.active.lock().await;
        self.abandon(&mut active).await;
        let deleted = match active.session_id.clone() {
            Some(id) => self.store.lock().await.delete(&id),
            None => false,
        };
        let model_id = active.model_id.clone();
        self.activate_empty(&mut active, &model_id);
        deleted
    }

    pub async fn toggle_like(&self, message_id: &str) -> bool {
        let mut active = self.active.lock().await;
        let Some(msg) = active.transcript.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        msg.is_liked = !msg.is_liked;
        self.reconcile(&active).await;
        true
    }

    /// Tears down the in-flight turn, if any. Fragments that arrive later are
    /// dropped. Returns whether a turn was still running.
    pub async fn shutdown(&self) -> bool {
        let mut active = self.active.lock().await;
        let was_running = active.state.is_in_flight();
        if was_running {
            info!("Abandoning turn in flight ({})", active.state);
        }
        self.abandon(&mut active).await;
        was_running
    }

    /// Runs one turn: appends the user message and a streaming placeholder,
    /// then copies the growing answer into the placeholder fragment by fragment.
    pub async fn send_message(&self, text: &str, image: Option<String>) -> TurnOutcome {
        if text.trim().is_empty() && image.is_none() {
            return TurnOutcome::Rejected;
        }

        let (turn, request) = self.begin_turn(text, image).await;

        let mut stream = match self.client.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                return self.finish(&turn, Some(e.to_string())).await;
            }
        };

        let mut accumulated = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    accumulated.push_str(&fragment);
                    if !self.apply_fragment(&turn, &accumulated).await {
                        debug!("Dropping late fragments for {}", turn.placeholder_id);
                        return TurnOutcome::Superseded { message_id: turn.placeholder_id };
                    }
                }
                Err(e) => {
                    return self.finish(&turn, Some(e.to_string())).await;
                }
            }
        }

        self.finish(&turn, None).await
    }

    async fn begin_turn(&self, text: &str, image: Option<String>) -> (TurnHandle, ChatRequest) {
        let mut active = self.active.lock().await;

        if active.session_id.is_none() {
            let model_id = active.model_id.clone();
            self.activate_empty(&mut active, &model_id);
        }
        if let Some(previous) = active.freeze_streaming() {
            debug!("New turn supersedes streaming message {}", previous);
            self.emit(ConversationEvent::TurnAbandoned { message_id: previous });
        }
        active.generation += 1;

        let history: Vec<Message> = active.transcript
            .iter()
            .filter(|m| !m.is_streaming)
            .cloned()
            .collect();

        let user = Message::user(text, image.clone());
        let user_id = user.id.clone();
        active.transcript.push(user);
        self.reconcile(&active).await;

        let placeholder = Message::placeholder(&active.model_id);
        let placeholder_id = placeholder.id.clone();
        active.transcript.push(placeholder);
        active.state = TurnState::AwaitingFirstChunk;
        self.reconcile(&active).await;

        let session_id = active.session_id.clone().unwrap_or_default();
        self.emit(ConversationEvent::TurnStarted {
            session_id: session_id.clone(),
            user_message_id: user_id,
            message_id: placeholder_id.clone(),
        });

        let profile = resolve_model(&active.model_id);
        let request = ChatRequest {
            message: text.to_string(),
            history,
            image,
            model_id: active.model_id.clone(),
            modes: active.modes,
            system_instruction: build_system_instruction(profile, &self.settings, active.modes.thought),
            temperature: self.settings.temperature,
        };
        let turn = TurnHandle {
            generation: active.generation,
            session_id,
            placeholder_id,
        };
        (turn, request)
    }

    /// Overwrites the placeholder with the full text received so far. Returns
    /// false once the turn no longer owns the placeholder.
    async fn apply_fragment(&self, turn: &TurnHandle, content: &str) -> bool {
        let mut active = self.active.lock().await;
        if !active.is_current(turn) {
            return false;
        }
        let Some(msg) = active.transcript
            .iter_mut()
            .find(|m| m.id == turn.placeholder_id && m.is_streaming) else {
            return false;
        };
        msg.content = content.to_string();
        active.state = TurnState::Streaming;
        self.reconcile(&active).await;

        self.emit(ConversationEvent::Fragment {
            message_id: turn.placeholder_id.clone(),
            content: content.to_string(),
        });
        true
    }

    async fn finish(&self, turn: &TurnHandle, error: Option<String>) -> TurnOutcome {
        let mut active = self.active.lock().await;
        let superseded = TurnOutcome::Superseded { message_id: turn.placeholder_id.clone() };
        if !active.is_current(turn) {
            if let Some(e) = error {
                debug!("Superseded turn {} failed late: {}", turn.placeholder_id, e);
            }
            return superseded;
        }
        let Some(msg) = active.transcript
            .iter_mut()
            .find(|m| m.id == turn.placeholder_id && m.is_streaming) else {
            return superseded;
        };
        msg.is_streaming = false;
        let content = msg.content.clone();
        active.state = if error.is_some() { TurnState::Idle } else { TurnState::Settled };
        self.reconcile(&active).await;

        match error {
            None => {
                self.emit(ConversationEvent::TurnSettled {
                    message_id: turn.placeholder_id.clone(),
                    content: content.clone(),
                });
                TurnOutcome::Settled { message_id: turn.placeholder_id.clone(), content }
            }
            Some(error) => {
                warn!("Turn {} failed after {} bytes: {}", turn.placeholder_id, content.len(), error);
                self.emit(ConversationEvent::TurnFailed {
                    message_id: turn.placeholder_id.clone(),
                    error: error.clone(),
                });
                TurnOutcome::Failed {
                    message_id: turn.placeholder_id.clone(),
                    partial: content,
                    error,
                }
            }
        }
    }

    /// Invalidates the in-flight turn and settles its placeholder as-is.
    async fn abandon(&self, active: &mut ActiveConversation) {
        active.generation += 1;
        active.state = TurnState::Idle;
        if let Some(message_id) = active.freeze_streaming() {
            self.reconcile(active).await;
            self.emit(ConversationEvent::TurnAbandoned { message_id });
        }
    }

    fn activate_empty(&self, active: &mut ActiveConversation, model_id: &str) -> String {
        let id = next_id();
        active.session_id = Some(id.clone());
        active.model_id = resolve_model(model_id).id.to_string();
        active.transcript.clear();
        active.state = TurnState::Idle;
        self.emit(ConversationEvent::SessionActivated {
            session_id: id.clone(),
            model_id: active.model_id.clone(),
        });
        id
    }

    /// Writes the active transcript into the store.
    async fn reconcile(&self, active: &ActiveConversation) {
        if let Some(update) = active.update() {
            self.store.lock().await.upsert(update);
        }
    }

    fn emit(&self, event: ConversationEvent) {
        let _ = self.events.send(event);
    }
}

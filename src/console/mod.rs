use crate::config::settings::AppSettings;
use crate::conversation::{ ConversationController, TurnOutcome };
use crate::identity::IdentityProvider;
use crate::llm::chat::{ BoxError, ThoughtMode };
use crate::llm::models::AVAILABLE_MODELS;
use crate::models::chat::{ Message, Role };
use crate::models::command::{ Command, HELP };
use crate::models::event::ConversationEvent;
use crate::storage::KeyValueStore;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{ debug, error, info, warn };
use std::collections::HashMap;
use std::io::Write;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::future::Future;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, BufReader, Lines };
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Turns conversation events into terminal output. Fragments carry the whole
/// reply so far; only the part not yet printed is emitted.
#[derive(Default)]
pub struct EventRenderer {
    json: bool,
    printed: HashMap<String, usize>,
}

impl EventRenderer {
    pub fn new(json: bool) -> Self {
        Self { json, printed: HashMap::new() }
    }

    pub fn render(&mut self, event: &ConversationEvent) -> Option<String> {
        if self.json {
            return match serde_json::to_string(event) {
                Ok(line) => Some(format!("{}\n", line)),
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    None
                }
            };
        }

        match event {
            ConversationEvent::SessionActivated { session_id, model_id } => {
                Some(format!("[chat {} · {}]\n", session_id, model_id))
            }
            ConversationEvent::TurnStarted { message_id, .. } => {
                self.printed.insert(message_id.clone(), 0);
                Some("bev> ".to_string())
            }
            ConversationEvent::Fragment { message_id, content } => self.suffix(message_id, content),
            ConversationEvent::TurnSettled { message_id, content } => {
                let rest = self.suffix(message_id, content).unwrap_or_default();
                self.printed.remove(message_id);
                Some(format!("{}\n", rest))
            }
            ConversationEvent::TurnFailed { message_id, error } => {
                self.printed.remove(message_id);
                Some(format!("\n[error: {}]\n", error))
            }
            ConversationEvent::TurnAbandoned { message_id } => {
                self.printed.remove(message_id).map(|_| "\n[stopped]\n".to_string())
            }
        }
    }

    fn suffix(&mut self, message_id: &str, content: &str) -> Option<String> {
        let printed = self.printed.entry(message_id.to_string()).or_insert(0);
        let rest = content.get(*printed..).filter(|r| !r.is_empty())?.to_string();
        *printed = content.len();
        Some(rest)
    }
}

fn spawn_printer(mut events: broadcast::Receiver<ConversationEvent>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = EventRenderer::new(json);
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(text) = renderer.render(&event) {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Printer skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    })
}

/// Reads an image file into a data URL suitable for `Message::image`.
pub async fn image_data_url(path: &Path) -> Result<String, BoxError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
    let mime = match
        path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Waits for the next input line. An interrupt at the prompt ends input
/// the same way end-of-file does.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
    where R: AsyncBufRead + Unpin, F: Future<Output = ()>
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

fn print_transcript(messages: &[Message]) {
    for msg in messages {
        let who = match msg.role {
            Role::User => "you",
            Role::Model => "bev",
        };
        let liked = if msg.is_liked { " ♥" } else { "" };
        println!("{}> {}{}  ({})", who, msg.content, liked, msg.id);
    }
}

pub struct Console {
    controller: ConversationController,
    settings: AppSettings,
    storage: Arc<dyn KeyValueStore>,
    export_dir: PathBuf,
    json_events: bool,
    pending_image: Option<String>,
}

impl Console {
    pub fn new(
        controller: ConversationController,
        settings: AppSettings,
        storage: Arc<dyn KeyValueStore>,
        export_dir: PathBuf,
        json_events: bool
    ) -> Self {
        Self {
            controller,
            settings,
            storage,
            export_dir,
            json_events,
            pending_image: None,
        }
    }

    pub async fn run(mut self, identity: &dyn IdentityProvider) -> Result<(), BoxError> {
        let user = identity.subscribe().borrow().clone();
        let name = user
            .as_ref()
            .and_then(|u| u.greeting_name().map(str::to_string))
            .or_else(|| self.settings.user_name.clone())
            .unwrap_or_else(|| "there".to_string());
        {
            let store = self.controller.store().lock().await;
            println!(
                "Hi {}! {} saved chats ({} KB). Type /help for commands.",
                name,
                store.len(),
                store.footprint_bytes() / 1024
            );
        }

        let printer = spawn_printer(self.controller.subscribe(), self.json_events);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let interrupt = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let Some(line) = next_input(&mut lines, interrupt).await? else {
                break;
            };
            if line.trim().is_empty() && self.pending_image.is_none() {
                continue;
            }
            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            if let Err(e) = self.handle(command).await {
                error!("Command failed: {}", e);
                println!("error: {}", e);
            }
        }

        self.controller.shutdown().await;
        printer.abort();
        info!("Console closed");
        Ok(())
    }

    async fn handle(&mut self, command: Command) -> Result<(), BoxError> {
        match command {
            Command::Send(text) => self.send(text).await,
            Command::New { model_id } => {
                let model_id = match model_id {
                    Some(id) => {
                        if self.settings.remember_default_model(&id, self.storage.as_ref()) {
                            info!("Default model is now {}", self.settings.default_model_id);
                        }
                        id
                    }
                    None => self.controller.model_id().await,
                };
                self.controller.new_session(&model_id).await;
            }
            Command::Open { target } => {
                let id = self.controller
                    .store()
                    .lock().await
                    .find_by_title(&target)
                    .map(|s| s.id.clone());
                let opened = match id {
                    Some(id) => self.controller.select_session(&id).await,
                    None => false,
                };
                if opened {
                    print_transcript(&self.controller.transcript().await);
                } else {
                    println!("No chat matches '{}'", target);
                }
            }
            Command::List { filter, search } => {
                let active = self.controller.active_session_id().await;
                let store = self.controller.store().lock().await;
                let sessions = store.list(filter, search.as_deref());
                if sessions.is_empty() {
                    println!("No chats found");
                }
                for s in sessions {
                    let marker = if active.as_deref() == Some(s.id.as_str()) { "*" } else { " " };
                    let pin = if s.is_pinned { "📌" } else { "  " };
                    println!("{}{} {}  {}  ({} messages)", marker, pin, s.id, s.title, s.messages.len());
                }
            }
            Command::Rename { id, title } => {
                if !self.controller.store().lock().await.rename(&id, &title) {
                    println!("Nothing renamed");
                }
            }
            Command::Pin { id } => {
                if !self.controller.store().lock().await.toggle_pin(&id) {
                    println!("No chat {}", id);
                }
            }
            Command::Delete { id } => {
                let deleted = if self.controller.active_session_id().await.as_deref() == Some(id.as_str()) {
                    self.controller.delete_active_session().await
                } else {
                    self.controller.store().lock().await.delete(&id)
                };
                if !deleted {
                    println!("No chat {}", id);
                }
            }
            Command::Export { dir } => {
                let dir = dir.unwrap_or_else(|| self.export_dir.clone());
                let path = self.controller.store().lock().await.export_to_dir(&dir)?;
                println!("Backup written to {}", path.display());
            }
            Command::Restore { path } => {
                let document = tokio::fs::read_to_string(&path).await?;
                let count = self.controller.store().lock().await.restore(&document)?;
                println!("Restored {} chats", count);
                self.reset_if_gone().await;
            }
            Command::Clear => {
                self.controller.store().lock().await.clear();
                self.reset_if_gone().await;
                println!("History cleared");
            }
            Command::Deep => self.toggle_thought(ThoughtMode::Deep).await,
            Command::Code => self.toggle_thought(ThoughtMode::Code).await,
            Command::Search => {
                let on = self.controller.toggle_web_search().await;
                println!("Web search {}", if on { "on" } else { "off" });
            }
            Command::Image { path } => {
                self.pending_image = Some(image_data_url(&path).await?);
                println!("Image attached to your next message");
            }
            Command::Like { message_id } => {
                if !self.controller.toggle_like(&message_id).await {
                    println!("No message {}", message_id);
                }
            }
            Command::Models => {
                let current = self.controller.model_id().await;
                for m in AVAILABLE_MODELS {
                    let marker = if m.id == current { "*" } else { " " };
                    println!("{} {:<16} {} ({}) · {}", marker, m.id, m.name, m.nickname, m.specialty);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    async fn send(&mut self, text: String) {
        let image = self.pending_image.take();
        let turn = self.controller.send_message(&text, image);
        tokio::pin!(turn);

        tokio::select! {
            outcome = &mut turn => {
                match outcome {
                    TurnOutcome::Rejected => println!("Nothing to send"),
                    TurnOutcome::Failed { error, .. } => debug!("Turn failed: {}", error),
                    TurnOutcome::Settled { .. } | TurnOutcome::Superseded { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if self.controller.shutdown().await {
                    info!("Interrupted; abandoned the current reply");
                }
            }
        }
    }

    async fn toggle_thought(&self, mode: ThoughtMode) {
        let current = self.controller.modes().await.thought;
        let next = if current == mode { ThoughtMode::Normal } else { mode };
        self.controller.set_thought_mode(next).await;
        println!("Thinking mode: {}", next);
    }

    /// Moves to a fresh chat when the active one no longer exists in the store.
    async fn reset_if_gone(&self) {
        let Some(active) = self.controller.active_session_id().await else {
            return;
        };
        let gone = self.controller.store().lock().await.get(&active).is_none();
        if gone {
            let model_id = self.controller.model_id().await;
            self.controller.new_session(&model_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(content: &str) -> ConversationEvent {
        ConversationEvent::Fragment { message_id: "m".into(), content: content.into() }
    }

    #[test]
    fn prints_only_new_text() {
        let mut r = EventRenderer::new(false);
        r.render(
            &(ConversationEvent::TurnStarted {
                session_id: "s".into(),
                user_message_id: "u".into(),
                message_id: "m".into(),
            })
        );
        assert_eq!(r.render(&fragment("Hi")).as_deref(), Some("Hi"));
        assert_eq!(r.render(&fragment("Hi there")).as_deref(), Some(" there"));
        assert_eq!(r.render(&fragment("Hi there")), None);
        let settled = ConversationEvent::TurnSettled { message_id: "m".into(), content: "Hi there!".into() };
        assert_eq!(r.render(&settled).as_deref(), Some("!\n"));
    }

    #[test]
    fn abandon_only_reported_for_printed_turns() {
        let mut r = EventRenderer::new(false);
        let abandoned = ConversationEvent::TurnAbandoned { message_id: "m".into() };
        assert_eq!(r.render(&abandoned), None);
        r.render(&fragment("partial"));
        assert_eq!(r.render(&abandoned).as_deref(), Some("\n[stopped]\n"));
    }

    #[test]
    fn json_mode_emits_one_line_per_event() {
        let mut r = EventRenderer::new(true);
        let line = r.render(&fragment("x")).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["type"], "fragment");
        assert_eq!(value["content"], "x");
    }

    #[tokio::test]
    async fn interrupt_at_prompt_ends_input() {
        let mut lines = BufReader::new(&b"hello\n"[..]).lines();
        let line = next_input(&mut lines, std::future::pending()).await.unwrap();
        assert_eq!(line.as_deref(), Some("hello"));

        let (_writer, reader) = tokio::io::duplex(64);
        let mut idle = BufReader::new(reader).lines();
        assert_eq!(next_input(&mut idle, async {}).await.unwrap(), None);
    }

    #[tokio::test]
    async fn images_become_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.PNG");
        std::fs::write(&path, b"IMG").unwrap();
        assert_eq!(image_data_url(&path).await.unwrap(), "data:image/png;base64,SU1H");
        assert!(image_data_url(&dir.path().join("missing.jpg")).await.is_err());
    }
}

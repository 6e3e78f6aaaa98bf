pub mod cli;
pub mod config;
pub mod console;
pub mod conversation;
pub mod history;
pub mod identity;
pub mod llm;
pub mod models;
pub mod storage;

use cli::Args;
use config::settings::AppSettings;
use console::Console;
use conversation::ConversationController;
use history::SessionStore;
use identity::StaticIdentity;
use llm::chat::new_client;
use llm::{ LlmConfig, LlmType };
use log::info;
use std::error::Error;
use storage::create_storage;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(provider default)"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("(provider default)"));
    if args.in_memory {
        info!("Storage: in-memory");
    } else {
        info!("Data Directory: {}", args.resolve_data_dir().display());
    }
    if args.storage_quota_bytes > 0 {
        info!("Storage Quota: {} bytes", args.storage_quota_bytes);
    }
    info!("JSON Events: {}", args.json_events);
    info!("-------------------------");

    let storage = create_storage(&args)?;
    let settings = AppSettings::load(storage.as_ref());
    let store = SessionStore::load(storage.clone()).into_shared();

    let llm_type: LlmType = args.chat_llm_type.parse()?;
    let config = LlmConfig {
        llm_type,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
    };
    let client = new_client(&config)?;
    info!("Chat client ready: {} ({})", client.llm_type(), client.get_model());

    let identity = StaticIdentity::from_parts(args.user_name.clone(), args.user_email.clone());
    let controller = ConversationController::new(store, client, settings.clone());
    let console = Console::new(controller, settings, storage, args.resolve_data_dir(), args.json_events);
    console.run(&identity).await
}

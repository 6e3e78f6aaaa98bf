use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Storage Args ---
    /// Directory holding the saved chats and settings. Defaults to the platform data dir.
    #[arg(long, env = "BEV_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk
    #[arg(long, env = "BEV_IN_MEMORY", default_value = "false")]
    pub in_memory: bool,

    /// Largest value the storage accepts, in bytes. 0 disables the limit.
    #[arg(long, env = "STORAGE_QUOTA_BYTES", default_value = "0")]
    pub storage_quota_bytes: usize,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, ollama, openai, anthropic, deepseek, xai, groq)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Backend model override (e.g., gemini-2.5-flash, llama3, gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Identity Args ---
    /// Display name used in the greeting
    #[arg(long, env = "USER_NAME")]
    pub user_name: Option<String>,

    #[arg(long, env = "USER_EMAIL")]
    pub user_email: Option<String>,

    // --- General App Args ---
    /// Print every conversation event as one JSON line instead of plain text
    #[arg(long, env = "JSON_EVENTS", default_value = "false")]
    pub json_events: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        ProjectDirs::from("app", "bev", "bev-chat")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".bev-chat"))
    }
}

use crate::llm::models::{ resolve_model, DEFAULT_MODEL_ID };
use crate::storage::{ KeyValueStore, SETTINGS_KEY };
use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiLanguage {
    #[default]
    En,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLanguage {
    #[default]
    Auto,
    En,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Auto,
    Egyptian,
    Saudi,
    Lebanese,
    Emirati,
    Msa,
}

/// User preferences persisted next to the sessions. Missing keys take their
/// defaults; keys this crate does not know about are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub language: UiLanguage,
    pub response_language: ResponseLanguage,
    pub dialect: Dialect,
    pub enable_personality: bool,
    pub deep_research_enabled: bool,
    pub default_model_id: String,
    pub custom_instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub onboarding_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: UiLanguage::En,
            response_language: ResponseLanguage::Auto,
            dialect: Dialect::Auto,
            enable_personality: true,
            deep_research_enabled: false,
            default_model_id: DEFAULT_MODEL_ID.to_string(),
            custom_instruction: String::new(),
            temperature: None,
            onboarding_complete: false,
            user_name: None,
            extra: Map::new(),
        }
    }
}

impl AppSettings {
    /// Never fails: absence or corruption yields the defaults.
    pub fn load(storage: &dyn KeyValueStore) -> Self {
        match storage.get(SETTINGS_KEY) {
            Ok(Some(raw)) =>
                match serde_json::from_str::<AppSettings>(&raw) {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("Saved settings are malformed, using defaults: {}", e);
                        Self::default()
                    }
                }
            Ok(None) => {
                info!("No saved settings, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Makes `model_id` the persona new sessions start with and saves the
    /// change. Returns false when it already was the default.
    pub fn remember_default_model(&mut self, model_id: &str, storage: &dyn KeyValueStore) -> bool {
        let id = resolve_model(model_id).id;
        if self.default_model_id == id {
            return false;
        }
        self.default_model_id = id.to_string();
        self.save(storage);
        true
    }

    pub fn save(&self, storage: &dyn KeyValueStore) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize settings: {}", e);
                return;
            }
        };
        if let Err(e) = storage.set(SETTINGS_KEY, &json) {
            warn!("Failed to persist settings: {}", e);
        }
    }
}

//! Built-in model personas. Every persona is backed by the same hosted
//! model and differs only in its instruction and tool defaults.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    General,
    Research,
    Creative,
    Coding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub nickname: &'static str,
    pub backend_model: &'static str,
    pub category: ModelCategory,
    pub specialty: &'static str,
    pub instruction: &'static str,
    /// Grounds every answer with web search regardless of the user's toggle.
    pub always_search: bool,
}

pub const DEFAULT_MODEL_ID: &str = "model-chatgpt4";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

pub const AVAILABLE_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "model-chatgpt4",
        name: "ChatGPT-4",
        nickname: "GPT-4",
        backend_model: "gemini-2.5-flash",
        category: ModelCategory::General,
        specialty: "General Chat",
        instruction: "PERSONA: General conversation.\nSTYLE: Friendly, versatile, comprehensive.\nSPECIALTY: Everyday tasks and clear explanations.",
        always_search: false,
    },
    ModelProfile {
        id: "model-deepseek",
        name: "DeepSeek",
        nickname: "DeepSeek",
        backend_model: "gemini-2.5-flash",
        category: ModelCategory::Research,
        specialty: "Deep Research",
        instruction: "PERSONA: Research and analysis.\nSTYLE: Rigorous and logical, strong at code and math.\nSPECIALTY: Deep research, data analysis, complex reasoning.",
        always_search: true,
    },
    ModelProfile {
        id: "model-claude",
        name: "Claude 3",
        nickname: "Claude",
        backend_model: "gemini-2.5-flash",
        category: ModelCategory::Creative,
        specialty: "Creative Writing",
        instruction: "PERSONA: Creative writing.\nSTYLE: Nuanced, literary, empathetic.\nSPECIALTY: Writing, translation, summarization.",
        always_search: false,
    },
    ModelProfile {
        id: "model-gemini",
        name: "Google Gemini",
        nickname: "Gemini",
        backend_model: "gemini-2.5-flash",
        category: ModelCategory::General,
        specialty: "Speed & Accuracy",
        instruction: "PERSONA: Speed and accuracy.\nSTYLE: Fast, factual, multimodal.\nSPECIALTY: Quick information and real-time knowledge.",
        always_search: false,
    },
    ModelProfile {
        id: "model-copilot",
        name: "GitHub Copilot",
        nickname: "Copilot",
        backend_model: "gemini-2.5-flash",
        category: ModelCategory::Coding,
        specialty: "Coding",
        instruction: "PERSONA: Coding specialist.\nSTYLE: Concise, code-first, efficient.\nSPECIALTY: Programming, debugging, optimization.",
        always_search: false,
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelProfile> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// Unknown ids resolve to the first profile.
pub fn resolve_model(id: &str) -> &'static ModelProfile {
    find_model(id).unwrap_or(&AVAILABLE_MODELS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default() {
        assert_eq!(resolve_model("model-nope").id, DEFAULT_MODEL_ID);
        assert_eq!(resolve_model("model-copilot").nickname, "Copilot");
        assert!(find_model("model-nope").is_none());
    }

    #[test]
    fn only_research_persona_forces_search() {
        let forced: Vec<&str> = AVAILABLE_MODELS.iter()
            .filter(|m| m.always_search)
            .map(|m| m.id)
            .collect();
        assert_eq!(forced, vec!["model-deepseek"]);
    }
}

use crate::config::settings::{ AppSettings, Dialect, ResponseLanguage };
use crate::llm::chat::ThoughtMode;
use crate::llm::models::ModelProfile;

pub const IDENTITY_INSTRUCTION: &str =
    "CORE PROTOCOL:\n\
You are \"Bev\", a capable assistant. Adapt your personality to the active persona.\n\n\
RULES:\n\
1. Do not repeat the user's message unless asked.\n\
2. No filler openings such as \"You said:\".\n\
3. Answer directly and concisely.\n\
4. Reply in the language the user writes in.";

const DEEP_THINK_DIRECTIVE: &str =
    "DEEP THINK MODE: Think carefully before answering. Put your reasoning inside a <thinking> tag.";
const CODE_DIRECTIVE: &str = "CODE EXPERT MODE: Provide optimal, documented code.";

fn dialect_directive(dialect: Dialect) -> Option<&'static str> {
    match dialect {
        Dialect::Auto => None,
        Dialect::Egyptian => Some("When replying in Arabic, use the Egyptian dialect."),
        Dialect::Saudi => Some("When replying in Arabic, use the Saudi dialect."),
        Dialect::Lebanese => Some("When replying in Arabic, use the Lebanese dialect."),
        Dialect::Emirati => Some("When replying in Arabic, use the Emirati dialect."),
        Dialect::Msa => Some("When replying in Arabic, use Modern Standard Arabic."),
    }
}

/// Assembles the system instruction sent with every turn.
pub fn build_system_instruction(
    profile: &ModelProfile,
    settings: &AppSettings,
    thought: ThoughtMode
) -> String {
    let mut sections = vec![IDENTITY_INSTRUCTION.to_string()];

    if settings.enable_personality {
        sections.push(profile.instruction.to_string());
    }

    match settings.response_language {
        ResponseLanguage::Auto => {}
        ResponseLanguage::En => sections.push("Always reply in English.".to_string()),
        ResponseLanguage::Ar => sections.push("Always reply in Arabic.".to_string()),
    }
    if let Some(directive) = dialect_directive(settings.dialect) {
        sections.push(directive.to_string());
    }

    let custom = settings.custom_instruction.trim();
    if !custom.is_empty() {
        sections.push(custom.to_string());
    }

    match thought {
        ThoughtMode::Normal => {}
        ThoughtMode::Deep => sections.push(DEEP_THINK_DIRECTIVE.to_string()),
        ThoughtMode::Code => sections.push(CODE_DIRECTIVE.to_string()),
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::resolve_model;

    #[test]
    fn persona_can_be_disabled() {
        let profile = resolve_model("model-copilot");
        let mut settings = AppSettings::default();
        assert!(build_system_instruction(profile, &settings, ThoughtMode::Normal).contains(profile.instruction));

        settings.enable_personality = false;
        let text = build_system_instruction(profile, &settings, ThoughtMode::Normal);
        assert!(!text.contains(profile.instruction));
        assert!(text.starts_with(IDENTITY_INSTRUCTION));
    }

    #[test]
    fn language_custom_and_mode_directives_are_appended_in_order() {
        let settings = AppSettings {
            response_language: ResponseLanguage::Ar,
            dialect: Dialect::Egyptian,
            custom_instruction: "  Keep it short.  ".to_string(),
            ..AppSettings::default()
        };
        let text = build_system_instruction(resolve_model("model-gemini"), &settings, ThoughtMode::Deep);
        let arabic = text.find("Always reply in Arabic.").unwrap();
        let dialect = text.find("Egyptian").unwrap();
        let custom = text.find("Keep it short.").unwrap();
        let deep = text.find("DEEP THINK MODE").unwrap();
        assert!(arabic < dialect && dialect < custom && custom < deep);
    }
}

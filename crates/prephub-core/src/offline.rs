//! Offline payloads substituted when every backend has failed.
//!
//! Text payloads carry a visible "AI Offline" banner so a learner never
//! mistakes a placeholder for generated content. Structured payloads are
//! empty values of the expected type.

/// Banner shared by all text placeholders.
pub const OFFLINE_BANNER: &str = "> **⚠️ AI Offline**";

/// Placeholder for a section explanation.
pub fn explanation(topic: &str, section: &str) -> String {
    format!(
        "### {}\n\n{}: Unable to generate content at this time.\n\nPlease consult the official documentation regarding **{}**.",
        section, OFFLINE_BANNER, topic
    )
}

/// Placeholder for an answered question.
pub fn answer() -> String {
    format!("### AI Offline\n\n{}: Please check system status.", OFFLINE_BANNER)
}

/// Placeholder for a code analysis.
pub fn code_analysis() -> String {
    format!(
        "### Analysis Failed\n\n{}: Unable to analyze code at this time.",
        OFFLINE_BANNER
    )
}

/// Whether `text` is one of the placeholders above.
pub fn is_offline_text(text: &str) -> bool {
    text.contains(OFFLINE_BANNER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_labelled() {
        assert!(is_offline_text(&explanation("React", "Hooks")));
        assert!(is_offline_text(&answer()));
        assert!(is_offline_text(&code_analysis()));
        assert!(!is_offline_text("### Hooks\n\nGenerated body"));
    }

    #[test]
    fn test_explanation_mentions_subject() {
        let text = explanation("React", "Hooks");
        assert!(text.starts_with("### Hooks"));
        assert!(text.contains("**React**"));
    }
}

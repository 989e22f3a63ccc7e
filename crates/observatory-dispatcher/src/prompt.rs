//! Prompt construction (spec §4.4 step 3). The template is treated as a
//! versioned artifact (spec §9 Open Question 3): the version is folded
//! into `result.model_identifier` so a stored result records exactly
//! which prompt produced it.

use observatory_jobs::AnalysisOptions;

/// Bumped whenever the instruction text below changes in a way that could
/// alter model output.
pub const PROMPT_VERSION: u32 = 1;

const SYSTEM_INSTRUCTIONS: &str = "You are a conversation analysis engine. Given a human-AI \
conversation transcript, identify dialectic patterns, recurring themes, and overall sentiment. \
Respond with a single JSON object matching the requested schema. Do not include commentary \
outside the JSON object.";

pub struct PromptTemplate;

impl PromptTemplate {
    /// Renders the system instructions, the requested pattern types, and
    /// the (already length-validated) conversation text into one prompt
    /// string. Truncation never happens here — callers must reject
    /// oversized input at submission (spec §4.4 step 3).
    pub fn render(options: &AnalysisOptions, conversation_text: &str) -> String {
        let pattern_types = if options.pattern_types.is_empty() {
            "dialectic, themes, sentiment".to_string()
        } else {
            options.pattern_types.join(", ")
        };

        format!(
            "{SYSTEM_INSTRUCTIONS}\n\nRequested analysis: {pattern_types}\n\n\
             --- transcript begin ---\n{conversation_text}\n--- transcript end ---"
        )
    }

    /// `"{backend_model}@prompt-v{VERSION}"` — resolves Open Question 3.
    pub fn model_identifier(backend_model: &str) -> String {
        format!("{backend_model}@prompt-v{PROMPT_VERSION}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_transcript_and_pattern_types() {
        let mut opts = AnalysisOptions::default();
        opts.pattern_types = vec!["themes".to_string()];
        let rendered = PromptTemplate::render(&opts, "Human: hi\nAI: hello");
        assert!(rendered.contains("themes"));
        assert!(rendered.contains("Human: hi"));
    }

    #[test]
    fn model_identifier_folds_in_version() {
        assert_eq!(
            PromptTemplate::model_identifier("llama3"),
            format!("llama3@prompt-v{PROMPT_VERSION}")
        );
    }
}

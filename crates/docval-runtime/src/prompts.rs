//! Prompts sent to the validation backend.
//!
//! Prompts are laid out for cache efficiency:
//! 1. System prompt (identical for every call) - cached
//! 2. Document context (identical for every spec of one document) - cached
//! 3. The requirement (changes per spec) - not cached
//!
//! In [`PromptMode::SharedContext`] the document sits in its own turn, so a
//! backend with prompt caching reuses it across specifications.

use docval_core::ValidationSpec;
use std::fmt;
use std::str::FromStr;

use crate::providers::ChatMessage;

/// System prompt shared by every validation call.
pub const SYSTEM_PROMPT: &str = "You are a document validation expert. Analyze document \
structures and determine if they meet specific requirements. Provide clear, factual \
assessments based on the document structure data provided.";

/// The assistant turn that closes the document context in shared-context mode.
pub const CONTEXT_ACK: &str = "Document structure received and ready for validation.";

/// Answer format the backend is asked for; `docval_core::parse_verdict` reads it.
const ANSWER_FORMAT: &str = r#"Does the document meet this requirement? Respond with:
1. "PASS" or "FAIL"
2. A confidence score between 0.0 and 1.0
3. A brief explanation of your reasoning

Format your response as:
Result: PASS/FAIL
Confidence: 0.0-1.0
Reasoning: Your explanation here"#;

/// How each validation call is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptMode {
    /// `[system, user(structure + requirement)]`
    PerSpec,
    /// `[system, user(structure), assistant(ack), user(requirement)]`
    #[default]
    SharedContext,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::PerSpec => "per-spec",
            PromptMode::SharedContext => "shared-context",
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "per-spec" => Ok(PromptMode::PerSpec),
            "shared-context" | "shared" => Ok(PromptMode::SharedContext),
            other => Err(format!(
                "unknown prompt mode '{}': expected per-spec or shared-context",
                other
            )),
        }
    }
}

/// The document context turn of shared-context mode.
pub fn context_prompt(structure_json: &str) -> String {
    format!(
        "I will provide you with a document structure to analyze. After I provide the \
document, I will ask you a series of validation questions about it. Please analyze and \
remember this document structure.\n\n\
Document Structure:\n{}\n\n\
Please confirm you have received and understood the document structure by responding \
with: \"{}\"",
        structure_json, CONTEXT_ACK
    )
}

fn requirement_block(spec: &ValidationSpec) -> String {
    let mut block = format!(
        "Requirement Name: {}\nDescription: {}",
        spec.name(),
        spec.description()
    );
    if let Some(category) = spec.category() {
        block.push_str("\nCategory: ");
        block.push_str(category);
    }
    block
}

/// The requirement turn of shared-context mode; it does not repeat the document.
pub fn requirement_prompt(spec: &ValidationSpec) -> String {
    format!(
        "Now validate this requirement:\n\n{}\n\n{}",
        requirement_block(spec),
        ANSWER_FORMAT
    )
}

/// The single user turn of per-spec mode.
pub fn per_spec_prompt(structure_json: &str, spec: &ValidationSpec) -> String {
    format!(
        "Analyze the following document structure and determine if it meets this \
requirement:\n\n{}\n\nDocument Structure:\n{}\n\n{}",
        requirement_block(spec),
        structure_json,
        ANSWER_FORMAT
    )
}

/// Messages for one specification.
///
/// Nothing from earlier specifications is ever included.
pub fn build_messages(
    mode: PromptMode,
    structure_json: &str,
    spec: &ValidationSpec,
) -> Vec<ChatMessage> {
    match mode {
        PromptMode::PerSpec => vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(per_spec_prompt(structure_json, spec)),
        ],
        PromptMode::SharedContext => vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(context_prompt(structure_json)),
            ChatMessage::assistant(CONTEXT_ACK),
            ChatMessage::user(requirement_prompt(spec)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURE: &str = r#"{"metadata": {"title": null}}"#;

    #[test]
    fn test_prompt_mode_parsing() {
        assert_eq!("per-spec".parse::<PromptMode>().unwrap(), PromptMode::PerSpec);
        assert_eq!("PER_SPEC".parse::<PromptMode>().unwrap(), PromptMode::PerSpec);
        assert_eq!(
            "shared-context".parse::<PromptMode>().unwrap(),
            PromptMode::SharedContext
        );
        assert!("batched".parse::<PromptMode>().is_err());
        assert_eq!(PromptMode::default(), PromptMode::SharedContext);
        assert_eq!(PromptMode::PerSpec.to_string(), "per-spec");
    }

    #[test]
    fn test_per_spec_layout() {
        let spec = ValidationSpec::new("Has Title", "Document must contain a title");
        let messages = build_messages(PromptMode::PerSpec, STRUCTURE, &spec);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert!(messages[1].content.contains("Requirement Name: Has Title"));
        assert!(messages[1].content.contains(STRUCTURE));
        assert!(messages[1].content.contains("Result: PASS/FAIL"));
    }

    #[test]
    fn test_shared_context_layout() {
        let spec = ValidationSpec::new("Has Author", "Document must name an author");
        let messages = build_messages(PromptMode::SharedContext, STRUCTURE, &spec);

        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert!(messages[1].content.contains(STRUCTURE));
        assert_eq!(messages[2].content, CONTEXT_ACK);
        assert!(!messages[3].content.contains(STRUCTURE));
        assert!(messages[3].content.starts_with("Now validate this requirement"));
    }

    #[test]
    fn test_context_turn_identical_across_specs() {
        let a = build_messages(
            PromptMode::SharedContext,
            STRUCTURE,
            &ValidationSpec::new("A", "first"),
        );
        let b = build_messages(
            PromptMode::SharedContext,
            STRUCTURE,
            &ValidationSpec::new("B", "second"),
        );
        assert_eq!(a[..3], b[..3]);
        assert_ne!(a[3], b[3]);
    }

    #[test]
    fn test_category_included_when_present() {
        let spec = ValidationSpec::new("Has TOC", "Needs a table of contents").with_category("structure");
        assert!(requirement_prompt(&spec).contains("Category: structure"));

        let spec = ValidationSpec::new("Has TOC", "Needs a table of contents");
        assert!(!requirement_prompt(&spec).contains("Category:"));
    }
}

//! Question sanitation and answer cleanup.
//!
//! Both sides of the text boundary live here: the denylist tripwire that
//! rejects suspicious questions before any retrieval happens, and the
//! markdown stripping applied to every generated answer.
//!
//! The denylist is a blunt substring guard, not a security boundary. It has
//! known false positives ("tell me about the system" is rejected) and that
//! is accepted behavior.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::AssistantError;

/// Substrings (lowercase) that reject a question outright.
const DENYLIST: [&str; 6] = [
    "ignore previous",
    "delete",
    "shutdown",
    "system",
    "run code",
    "eval",
];

/// Validate and normalize a question.
///
/// Trims surrounding whitespace, then rejects in order: empty input,
/// input over `max_chars` characters, and input containing any denylisted
/// substring (case-insensitive). All three reject before the embedding
/// provider is ever invoked.
pub fn sanitize_question(question: &str, max_chars: usize) -> Result<String, AssistantError> {
    let trimmed = question.trim();

    if trimmed.is_empty() {
        return Err(AssistantError::QuestionEmpty);
    }

    let actual = trimmed.chars().count();
    if actual > max_chars {
        return Err(AssistantError::QuestionTooLong {
            limit: max_chars,
            actual,
        });
    }

    let lower = trimmed.to_lowercase();
    if DENYLIST.iter().any(|f| lower.contains(f)) {
        warn!(question = %trimmed, "unsafe input detected");
        return Err(AssistantError::UnsafeInput);
    }

    Ok(trimmed.to_string())
}

/// Strip markdown artifacts from a generated answer.
///
/// The substitution order matters: the language-tagged fence pattern must
/// run before the plain ``` removal, or a tag like `json` would survive as
/// a bare word. Bullet markers are rewritten to `•` wherever they appear.
pub fn clean_answer(text: &str) -> String {
    static FENCE_LANG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```[a-zA-Z]*").unwrap());

    let text = FENCE_LANG_RE.replace_all(text, "");
    let text = text.replace("```", "");
    let text = text.replace("###", "");
    let text = text.replace("**", "");
    let text = text.replace("* ", "• ");
    text.trim().to_string()
}

//! Prompt assembly and answer shaping.
//!
//! The synthesizer never sees raw documents. It renders the structured
//! records into a compact context block, wraps that in the fixed prompt
//! template, and chops finished answers into stream-sized chunks.

use crate::models::StructuredApiRecord;

/// Answer returned when generation fails. Retrieval results still
/// accompany it unchanged.
pub const DEGRADED_ANSWER: &str =
    "Sorry, the assistant had trouble generating a response. Please try again.";

/// Render structured records into the context block fed to the model.
///
/// One stanza per record, blank-line separated. A record without an
/// endpoint renders as `unknown`.
pub fn build_context(records: &[StructuredApiRecord]) -> String {
    records
        .iter()
        .map(|record| {
            format!(
                "API: {}\nEndpoint: {}\nExample: {}",
                record.api_name,
                record.endpoint.as_deref().unwrap_or("unknown"),
                record.example
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the full generation prompt for a question and its context.
///
/// The prompt asks for plain text; `clean_answer` enforces it on
/// whatever comes back.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a professional API assistant.\n\
         Answer the question clearly and professionally.\n\
         Explain endpoint, required payload, response format, and example.\n\
         Avoid markdown syntax like ### or ``` in the answer.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n"
    )
}

/// Split an answer into chunks of at most `chunk_chars` characters,
/// never splitting inside a multi-byte character. An empty answer
/// produces no chunks.
pub fn chunk_answer(text: &str, chunk_chars: usize) -> Vec<String> {
    if chunk_chars == 0 {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

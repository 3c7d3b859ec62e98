//! Turns retrieved documents into structured API records.
//!
//! Retrieval hands back prose with code blocks attached. Before synthesis
//! we distill each hit into a fixed-shape record: the API name, the first
//! versioned endpoint path found in the content, a request payload, a
//! response body, and a curl example. The synthesizer only ever sees these
//! records, never raw documents.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{RetrievedDocument, StructuredApiRecord};

/// Matches versioned REST paths like `/api/v2/tickets`.
static ENDPOINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/api/v\d+/\S+").unwrap());

/// Matches brace-delimited JSON candidates inside a code block. The lazy
/// quantifier stops at the first closing brace, so nested objects produce
/// unparseable candidates and are dropped. Flat payloads, which is what
/// the docs overwhelmingly contain, survive.
static JSON_CANDIDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*?\}").unwrap());

/// Build one structured record per retrieved document.
///
/// Every category is first-match-wins: once a payload, response body, or
/// example has been filled from an earlier code block, later blocks cannot
/// overwrite it. Blocks mentioning `post` or `request` are treated as
/// request payloads; otherwise blocks mentioning `response` or `return`
/// are treated as response bodies. A block matching both is a request.
pub fn extract_api_structure(docs: &[RetrievedDocument]) -> Vec<StructuredApiRecord> {
    docs.iter().map(structure_one).collect()
}

fn structure_one(doc: &RetrievedDocument) -> StructuredApiRecord {
    let mut record = StructuredApiRecord {
        api_name: doc.metadata.title.clone(),
        endpoint: ENDPOINT_RE
            .find(&doc.content)
            .map(|m| m.as_str().to_string()),
        required_payload: Map::new(),
        response_body: Map::new(),
        example: String::new(),
    };

    let code_blocks: Vec<String> =
        serde_json::from_str(&doc.metadata.code_blocks_json).unwrap_or_default();

    for block in &code_blocks {
        let lower = block.to_lowercase();

        if lower.contains("post") || lower.contains("request") {
            if record.required_payload.is_empty() {
                if let Some(payload) = extract_json(block) {
                    record.required_payload = payload;
                }
            }
        } else if lower.contains("response") || lower.contains("return") {
            if record.response_body.is_empty() {
                if let Some(body) = extract_json(block) {
                    record.response_body = body;
                }
            }
        }

        if record.example.is_empty() && lower.contains("curl") {
            record.example = block.clone();
        }
    }

    record
}

/// Scan a code block for brace-delimited candidates and return the first
/// one that parses to a non-empty JSON object. Candidates that fail to
/// parse are discarded without logging; doc snippets are full of pseudo
/// JSON and that is expected.
fn extract_json(block: &str) -> Option<Map<String, Value>> {
    for candidate in JSON_CANDIDATE_RE.find_iter(block) {
        if let Ok(map) = serde_json::from_str::<Map<String, Value>>(candidate.as_str()) {
            if !map.is_empty() {
                return Some(map);
            }
        }
    }
    None
}

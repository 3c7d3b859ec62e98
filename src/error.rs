//! Domain error types for the assistant pipeline.
//!
//! [`AssistantError`] covers everything the build and query paths can
//! surface to a caller. Build-path errors (`CorpusEmpty`, `CorpusFormat`,
//! `CollectionMissing`) are fatal and abort with a diagnostic. Question
//! validation errors (`QuestionEmpty`, `QuestionTooLong`, `UnsafeInput`)
//! are surfaced to the caller as rejected requests and never retried.
//! `GenerationFailed` is always recovered into a degraded answer before it
//! reaches a caller; it exists so the recovery site has something typed to
//! log.
//!
//! [`EmbedError`] is the per-provider contract used inside the embedding
//! chain; the chain folds provider exhaustion into
//! [`AssistantError::EmbeddingUnavailable`].

/// Errors surfaced by the build and query pipelines.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// The corpus file parsed but contained zero content sections.
    #[error("no content sections found in the corpus file")]
    CorpusEmpty,

    /// The corpus file could not be read or parsed.
    #[error("malformed corpus file: {0}")]
    CorpusFormat(String),

    /// The collection was queried before any successful build.
    #[error("collection '{0}' not found; run `askdocs build` first")]
    CollectionMissing(String),

    /// Every provider in the embedding chain failed for this text.
    #[error("no embedding provider could embed the text")]
    EmbeddingUnavailable,

    /// The question matched the injection denylist.
    #[error("unsafe or potentially malicious input detected")]
    UnsafeInput,

    /// The question was empty after trimming.
    #[error("question must not be empty")]
    QuestionEmpty,

    /// The question exceeded the configured maximum length.
    #[error("question is too long: {actual} chars (limit {limit})")]
    QuestionTooLong { limit: usize, actual: usize },

    /// The generation call failed. Recovered into a degraded answer by the
    /// synthesizer; never propagates out of a query.
    #[error("answer generation failed: {0}")]
    GenerationFailed(String),

    /// Index storage plumbing failed (SQLite errors and the like).
    #[error("index storage error: {0}")]
    Storage(String),
}

impl AssistantError {
    /// Wrap a storage-layer failure. Used by [`crate::index`] implementations
    /// to map backend errors without an orphan-rule `From` impl.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        AssistantError::Storage(err.to_string())
    }

    /// Short machine-readable kind name, used for `Failed(kind)` logging and
    /// the HTTP error contract.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::CorpusEmpty => "corpus_empty",
            AssistantError::CorpusFormat(_) => "corpus_format",
            AssistantError::CollectionMissing(_) => "collection_missing",
            AssistantError::EmbeddingUnavailable => "embeddings_unavailable",
            AssistantError::UnsafeInput => "unsafe_input",
            AssistantError::QuestionEmpty => "empty_question",
            AssistantError::QuestionTooLong { .. } => "question_too_long",
            AssistantError::GenerationFailed(_) => "generation_failed",
            AssistantError::Storage(_) => "internal",
        }
    }
}

/// Per-provider embedding failure, classified so the chain can decide
/// whether to trip a circuit breaker or just move on to the next provider.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Rate-limit or quota exhaustion. Trips the provider's breaker: no
    /// further calls to this provider for the rest of the process lifetime.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// Any other provider failure (transport, HTTP error, bad response).
    #[error("{0}")]
    Provider(String),

    /// The provider reported success but returned no vector values.
    #[error("provider returned an empty embedding")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(AssistantError::CorpusEmpty.kind(), "corpus_empty");
        assert_eq!(AssistantError::UnsafeInput.kind(), "unsafe_input");
        assert_eq!(
            AssistantError::QuestionTooLong {
                limit: 10,
                actual: 20
            }
            .kind(),
            "question_too_long"
        );
        assert_eq!(
            AssistantError::EmbeddingUnavailable.kind(),
            "embeddings_unavailable"
        );
    }

    #[test]
    fn too_long_message_includes_both_lengths() {
        let err = AssistantError::QuestionTooLong {
            limit: 500,
            actual: 712,
        };
        let msg = err.to_string();
        assert!(msg.contains("712"));
        assert!(msg.contains("500"));
    }
}

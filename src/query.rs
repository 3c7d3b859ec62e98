//! Query orchestration.
//!
//! [`Assistant`] wires the pipeline together: sanitize, embed, retrieve,
//! structure, synthesize. Each phase is logged with a `phase` field so a
//! stuck or failed query can be located from the logs alone.
//!
//! Sanitation failures, embedding exhaustion, and storage errors abort
//! the query with a typed error. Generation failure does not: the
//! orchestrator swaps in [`DEGRADED_ANSWER`] and completes with the
//! retrieval results intact.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::{self, EmbedderChain};
use crate::error::AssistantError;
use crate::generation::{self, AnswerGenerator};
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::{QueryResult, StructuredApiRecord};
use crate::sanitize::{clean_answer, sanitize_question};
use crate::structure::extract_api_structure;
use crate::synthesis::{build_context, build_prompt, DEGRADED_ANSWER};

pub struct Assistant {
    chain: Arc<EmbedderChain>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
    max_question_chars: usize,
}

impl Assistant {
    pub fn new(
        chain: Arc<EmbedderChain>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
        top_k: usize,
        max_question_chars: usize,
    ) -> Self {
        Self {
            chain,
            index,
            generator,
            top_k,
            max_question_chars,
        }
    }

    /// Assemble an assistant over the built index named in the config.
    ///
    /// The index is opened first so a missing collection surfaces before
    /// any provider is constructed.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let index = SqliteIndex::open_existing(&config.index.db_path, &config.index.collection)
            .await?;
        let chain = embedding::build_chain(&config.embedding)?;
        let generator = generation::build_generator(&config.generation)?;

        Ok(Self::new(
            Arc::new(chain),
            Arc::new(index),
            generator,
            config.retrieval.top_k,
            config.query.max_question_chars,
        ))
    }

    /// Answer one question end to end.
    pub async fn answer(&self, question: &str) -> Result<QueryResult, AssistantError> {
        match self.answer_inner(question).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(phase = "failed", kind = err.kind(), error = %err, "query failed");
                Err(err)
            }
        }
    }

    async fn answer_inner(&self, question: &str) -> Result<QueryResult, AssistantError> {
        debug!(phase = "received", "handling question");

        let question = sanitize_question(question, self.max_question_chars)?;
        debug!(phase = "sanitized");

        let vector = self.chain.embed(&question).await?;
        debug!(phase = "embedded", dims = vector.len());

        let matches = self.index.search(&vector, self.top_k).await?;
        debug!(phase = "retrieved", matches = matches.len());

        let records = extract_api_structure(&matches);
        debug!(phase = "structured", records = records.len());

        let answer = match self.synthesize(&question, &records).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "generation failed, returning degraded answer");
                DEGRADED_ANSWER.to_string()
            }
        };
        debug!(phase = "synthesized");

        info!(phase = "completed", matches = records.len(), "answered question");
        Ok(QueryResult {
            query: question,
            matches: records,
            answer,
        })
    }

    async fn synthesize(
        &self,
        question: &str,
        records: &[StructuredApiRecord],
    ) -> Result<String, AssistantError> {
        let context = build_context(records);
        let prompt = build_prompt(question, &context);
        let raw = self.generator.generate(&prompt).await?;
        Ok(clean_answer(&raw))
    }
}

/// `askdocs query` entry point.
pub async fn run_query(config: &Config, question: &str, json: bool) -> Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let result = assistant.answer(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    const RULE: &str = "--------------------------------------------";

    println!("{}", result.answer);

    for record in &result.matches {
        println!();
        println!("{RULE}");
        println!("API: {}", record.api_name);
        if let Some(endpoint) = &record.endpoint {
            println!("Endpoint: {endpoint}");
        }
        if !record.required_payload.is_empty() {
            println!("Required payload:");
            println!("{}", serde_json::to_string_pretty(&record.required_payload)?);
        }
        if !record.response_body.is_empty() {
            println!("Response body:");
            println!("{}", serde_json::to_string_pretty(&record.response_body)?);
        }
        if !record.example.is_empty() {
            println!("Example:");
            println!("{}", record.example);
        }
    }
    if !result.matches.is_empty() {
        println!("{RULE}");
    }

    Ok(())
}

/// `askdocs chat` entry point: a minimal REPL over [`Assistant::answer`].
pub async fn run_chat(config: &Config) -> Result<()> {
    let assistant = Assistant::from_config(config).await?;

    println!("Ask about the indexed API docs. Type 'exit' to quit.");
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match assistant.answer(question).await {
            Ok(result) => println!("{}\n", result.answer),
            Err(err) => eprintln!("error: {err}\n"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::embedding::EmbeddingProvider;
    use crate::error::EmbedError;
    use crate::generation::DisabledGenerator;
    use crate::index::InMemoryIndex;
    use crate::models::{DocumentMetadata, IndexedDocument};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    struct CannedGenerator {
        answer: &'static str,
    }

    #[async_trait]
    impl AnswerGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, AssistantError> {
            Ok(self.answer.to_string())
        }
    }

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        let docs = vec![
            IndexedDocument {
                doc_id: "doc_0".into(),
                content: "Create Ticket\nPOST /api/v2/tickets creates a ticket.".into(),
                embedding: vec![1.0, 0.0],
                metadata: DocumentMetadata {
                    section_id: "sec-1".into(),
                    title: "Create Ticket".into(),
                    source: "https://docs.example.com/tickets".into(),
                    code_blocks_json: r#"["curl -X POST /api/v2/tickets"]"#.into(),
                    tables_json: "[]".into(),
                },
            },
            IndexedDocument {
                doc_id: "doc_1".into(),
                content: "List Agents\nGET /api/v2/agents lists agents.".into(),
                embedding: vec![0.0, 1.0],
                metadata: DocumentMetadata {
                    section_id: "sec-2".into(),
                    title: "List Agents".into(),
                    source: "https://docs.example.com/agents".into(),
                    code_blocks_json: "[]".into(),
                    tables_json: "[]".into(),
                },
            },
        ];
        for doc in &docs {
            index.insert(doc).await.unwrap();
        }
        index
    }

    fn assistant(
        index: Arc<InMemoryIndex>,
        generator: Arc<dyn AnswerGenerator>,
        provider: Arc<CountingProvider>,
    ) -> Assistant {
        let chain = EmbedderChain::new(vec![provider], 16);
        Assistant::new(Arc::new(chain), index, generator, 2, 500)
    }

    #[tokio::test]
    async fn answers_with_cleaned_text_and_matches() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let generator = Arc::new(CannedGenerator {
            answer: "```http\nPOST /api/v2/tickets\n``` **Send the payload.**",
        });
        let a = assistant(seeded_index().await, generator, provider);

        let result = a.answer("  How do I create a ticket?  ").await.unwrap();
        assert_eq!(result.query, "How do I create a ticket?");
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.matches[0].api_name, "Create Ticket");
        assert!(!result.answer.contains("```"));
        assert!(!result.answer.contains("**"));
        assert!(result.answer.contains("Send the payload."));
    }

    #[tokio::test]
    async fn unsafe_question_never_reaches_the_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let generator = Arc::new(CannedGenerator { answer: "ok" });
        let a = assistant(seeded_index().await, generator, provider.clone());

        let err = a.answer("please delete everything").await.unwrap_err();
        assert!(matches!(err, AssistantError::UnsafeInput));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_question_never_reaches_the_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let generator = Arc::new(CannedGenerator { answer: "ok" });
        let a = assistant(seeded_index().await, generator, provider.clone());

        let long = "a ".repeat(600);
        let err = a.answer(&long).await.unwrap_err();
        assert!(matches!(err, AssistantError::QuestionTooLong { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_failure_degrades_but_keeps_matches() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let a = assistant(seeded_index().await, Arc::new(DisabledGenerator), provider);

        let result = a.answer("How do I create a ticket?").await.unwrap();
        assert_eq!(result.answer, DEGRADED_ANSWER);
        assert_eq!(result.matches.len(), 2);
    }

    #[tokio::test]
    async fn empty_index_yields_empty_matches() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let generator = Arc::new(CannedGenerator { answer: "no docs" });
        let a = assistant(Arc::new(InMemoryIndex::new()), generator, provider);

        let result = a.answer("anything at all?").await.unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.answer, "no docs");
    }
}

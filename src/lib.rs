//! # AskDocs
//!
//! A retrieval-augmented assistant for scraped API documentation.
//!
//! AskDocs ingests a JSON corpus of scraped documentation pages, embeds each
//! section through a provider chain (remote Gemini with a local fastembed
//! fallback), and answers questions by retrieving the closest sections,
//! extracting their API structure, and synthesizing a grounded answer with
//! an LLM. Exposed as a CLI and a JSON/SSE HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Corpus  │──▶│ Embed chain  │──▶│  SQLite  │
//! │  (JSON)  │   │ Gemini+local │   │ vectors  │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!                    ┌───────────────────┤
//!                    ▼                   ▼
//!               ┌──────────┐       ┌──────────┐
//!               │   CLI    │       │   HTTP   │
//!               │(askdocs) │       │ JSON/SSE │
//!               └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askdocs build                 # embed the corpus into SQLite
//! askdocs query "How do I create a ticket?"
//! askdocs chat                  # interactive loop
//! askdocs serve                 # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`corpus`] | Scraped corpus loading |
//! | [`embedding`] | Embedding provider chain with quota fallback |
//! | [`index`] | Vector index over SQLite (plus in-memory) |
//! | [`structure`] | API structure extraction from retrieved sections |
//! | [`generation`] | LLM answer generation |
//! | [`synthesis`] | Context and prompt assembly, answer chunking |
//! | [`sanitize`] | Question validation and answer cleanup |
//! | [`query`] | Query pipeline orchestration |
//! | [`build_cmd`] | Index build pipeline |
//! | [`server`] | HTTP API server |

pub mod build_cmd;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod query;
pub mod sanitize;
pub mod server;
pub mod structure;
pub mod synthesis;

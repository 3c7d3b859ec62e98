use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub query: QueryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Path to the scraper's JSON output.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// SQLite database file holding the vector collections.
    pub db_path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "api_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Remote embedding model submitted to the Generative Language API.
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Local fastembed model used when the remote provider yields nothing.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Remote input is truncated to this many characters before submission.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Attempts per remote call (quota errors short-circuit regardless).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Capacity of the process-wide embedding LRU cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embed_model(),
            fallback_model: default_fallback_model(),
            max_input_chars: default_max_input_chars(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            cache_size: default_cache_size(),
        }
    }
}

fn default_embed_model() -> String {
    "models/embedding-001".to_string()
}
fn default_fallback_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_size() -> usize {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest-neighbor sections retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Questions longer than this (in chars, after trimming) are rejected.
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_question_chars: default_max_question_chars(),
        }
    }
}

fn default_max_question_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Per-client-IP request budget over a sliding one-minute window.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Size of each SSE answer fragment, in characters.
    #[serde(default = "default_stream_chunk_chars")]
    pub stream_chunk_chars: usize,
    /// Serve the static frontend from `static_dir` when true.
    #[serde(default)]
    pub serve_static: bool,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_rate_limit_per_minute() -> u32 {
    60
}
fn default_stream_chunk_chars() -> usize {
    140
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate embedding
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }
    if config.embedding.max_attempts == 0 {
        anyhow::bail!("embedding.max_attempts must be >= 1");
    }
    if config.embedding.cache_size == 0 {
        anyhow::bail!("embedding.cache_size must be > 0");
    }

    // Validate retrieval and query limits
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.query.max_question_chars == 0 {
        anyhow::bail!("query.max_question_chars must be > 0");
    }

    // Validate server
    if config.server.stream_chunk_chars == 0 {
        anyhow::bail!("server.stream_chunk_chars must be > 0");
    }
    if config.index.collection.trim().is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askdocs.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    const MINIMAL: &str = r#"
[corpus]
path = "data/docs.json"

[index]
db_path = "data/index.db"

[server]
bind = "127.0.0.1:8000"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config(MINIMAL);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.index.collection, "api_docs");
        assert_eq!(cfg.embedding.max_input_chars, 8000);
        assert_eq!(cfg.embedding.max_attempts, 3);
        assert_eq!(cfg.embedding.cache_size, 2048);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.query.max_question_chars, 500);
        assert_eq!(cfg.server.stream_chunk_chars, 140);
        assert!(!cfg.server.serve_static);
        assert!(cfg.server.cors_origins.is_empty());
    }

    #[test]
    fn zero_top_k_rejected() {
        let content = format!("{}\n[retrieval]\ntop_k = 0\n", MINIMAL);
        let (_dir, path) = write_config(&content);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn zero_max_input_chars_rejected() {
        let content = format!("{}\n[embedding]\nmax_input_chars = 0\n", MINIMAL);
        let (_dir, path) = write_config(&content);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_input_chars"));
    }

    #[test]
    fn missing_file_is_context_error() {
        let err = load_config(Path::new("/nonexistent/askdocs.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

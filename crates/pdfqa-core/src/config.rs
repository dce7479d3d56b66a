//! Configuration handling for .pdfqa.json

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::index::Metric;
use crate::{
    PdfQaError, Result, DEFAULT_API_BASE, DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DEFAULT_HASH_DIM,
    DEFAULT_LOCAL_EMBEDDING_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SEPARATOR, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
};

/// Which backend turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    OpenAi,
    /// Deterministic feature hashing, no network
    Hash,
    /// On-device model via fastembed (`local` feature)
    FastEmbed,
}

/// Which backend writes the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// OpenAI-compatible `/chat/completions` endpoint
    #[default]
    OpenAi,
    /// Returns the best matching chunk verbatim, no network
    Extractive,
}

impl EmbeddingProvider {
    pub fn requires_credential(self) -> bool {
        matches!(self, Self::OpenAi)
    }
}

impl GenerationProvider {
    pub fn requires_credential(self) -> bool {
        matches!(self, Self::OpenAi)
    }
}

/// Configuration stored in .pdfqa.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Preferred break character when splitting
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Distance used to rank chunks
    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub embedding_provider: EmbeddingProvider,

    /// Embedding model name (provider specific)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector size of the hash embedder
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,

    /// Texts sent per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub generation_provider: GenerationProvider,

    /// Chat model used for answers
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Sampling temperature (0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout applied to each provider request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_hash_dimension() -> usize {
    DEFAULT_HASH_DIM
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
            top_k: default_top_k(),
            metric: Metric::default(),
            embedding_provider: EmbeddingProvider::default(),
            embedding_model: default_embedding_model(),
            hash_dimension: default_hash_dimension(),
            batch_size: default_batch_size(),
            generation_provider: GenerationProvider::default(),
            generation_model: default_generation_model(),
            temperature: default_temperature(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Config that needs no network or credential.
    pub fn offline() -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Hash,
            generation_provider: GenerationProvider::Extractive,
            ..Self::default()
        }
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the nearest .pdfqa.json above `start`, or the defaults.
    pub fn discover(start: &Path) -> Result<Self> {
        match crate::discover::find_config(start)? {
            Some(path) => {
                tracing::debug!("Using config {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Save config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PdfQaError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(PdfQaError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(PdfQaError::Config("top_k must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(PdfQaError::Config("batch_size must be positive".into()));
        }
        if self.hash_dimension == 0 {
            return Err(PdfQaError::Config("hash_dimension must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(PdfQaError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PdfQaError::Config(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Whether any configured provider needs an API key.
    pub fn requires_credential(&self) -> bool {
        self.embedding_provider.requires_credential()
            || self.generation_provider.requires_credential()
    }

    /// Embedding model for the selected provider.
    ///
    /// The fastembed provider cannot load the API default, so an unchanged
    /// default falls back to a local model.
    pub fn resolved_embedding_model(&self) -> &str {
        match self.embedding_provider {
            EmbeddingProvider::FastEmbed if self.embedding_model == DEFAULT_EMBEDDING_MODEL => {
                DEFAULT_LOCAL_EMBEDDING_MODEL
            }
            _ => &self.embedding_model,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

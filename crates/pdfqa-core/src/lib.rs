//! pdfqa-core: Question answering over a single PDF
//!
//! This library provides the retrieval pipeline behind `pdfqa`: PDF text
//! extraction, overlapping chunking, embedding, an in-memory vector index and
//! answer synthesis over the retrieved chunks.

pub mod answer;
pub mod chunk;
pub mod config;
pub mod consts;
pub mod credential;
pub mod discover;
pub mod embed;
pub mod extract;
pub mod index;
pub mod openai;
pub mod session;

pub use answer::AnswerGenerator;
pub use chunk::{Chunk, Chunker};
pub use config::Config;
pub use consts::*;
pub use credential::ApiKey;
pub use embed::Embedder;
pub use extract::Document;
pub use index::{Metric, SearchHit, VectorIndex};
pub use session::{
    Answer, DocumentSummary, ProgressCallback, ProgressEvent, Services, Session, SessionState,
    Source, Stage,
};

/// Why a call to an external provider failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("credential rejected by provider")]
    Unauthorized,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PdfQaError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(ServiceFailure),

    #[error("Generation service error: {0}")]
    GenerationService(ServiceFailure),

    #[error("No API key supplied")]
    MissingCredential,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No document loaded")]
    NoDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PdfQaError>;

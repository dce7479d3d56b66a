//! Embedding generation
//!
//! Three backends sit behind [`Embedder`]: an OpenAI-compatible HTTP client,
//! a deterministic feature-hashing embedder that needs no network, and (with
//! the `local` feature) an on-device fastembed model.

use crate::config::EmbeddingProvider;
use crate::openai::{EmbeddingRequest, EmbeddingResponse, OpenAiClient};
use crate::{ApiKey, Config, PdfQaError, Result, ServiceFailure};

/// Maps texts to vectors, one per input, in input order.
pub trait Embedder {
    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PdfQaError::EmbeddingService(ServiceFailure::InvalidResponse(
                    "no embedding generated".to_string(),
                ))
            })
    }

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Build the embedder selected in `config`.
pub fn from_config(config: &Config, credential: Option<&ApiKey>) -> Result<Box<dyn Embedder>> {
    match config.embedding_provider {
        EmbeddingProvider::OpenAi => {
            let key = credential.ok_or(PdfQaError::MissingCredential)?;
            Ok(Box::new(OpenAiEmbedder::new(config, key.clone())?))
        }
        EmbeddingProvider::Hash => Ok(Box::new(HashEmbedder::new(config.hash_dimension))),
        #[cfg(feature = "local")]
        EmbeddingProvider::FastEmbed => Ok(Box::new(LocalEmbedder::new(
            config.resolved_embedding_model(),
        )?)),
        #[cfg(not(feature = "local"))]
        EmbeddingProvider::FastEmbed => Err(PdfQaError::Config(
            "fastembed provider requires building with the `local` feature".to_string(),
        )),
    }
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &Config, api_key: ApiKey) -> Result<Self> {
        let client = OpenAiClient::new(&config.api_base, api_key, config.request_timeout())
            .map_err(PdfQaError::EmbeddingService)?;

        Ok(Self {
            client,
            model: config.embedding_model.clone(),
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Requesting {} embeddings from {}", texts.len(), self.model);

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut response: EmbeddingResponse = self
            .client
            .post("embeddings", &request)
            .map_err(PdfQaError::EmbeddingService)?;

        // The API tags each vector with its input position
        response.data.sort_by_key(|d| d.index);

        let in_order = response.data.iter().enumerate().all(|(i, d)| d.index == i);
        if response.data.len() != texts.len() || !in_order {
            return Err(PdfQaError::EmbeddingService(
                ServiceFailure::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.data.len()
                )),
            ));
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Deterministic bag-of-words embeddings using feature hashing.
///
/// Each lowercase alphanumeric token is hashed with blake3 into one signed
/// bucket; the result is L2-normalised. Texts sharing words land close
/// together, which is enough to exercise retrieval without a model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase());

        for token in tokens {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();

            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[slot] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// On-device embeddings via fastembed.
#[cfg(feature = "local")]
pub struct LocalEmbedder {
    model: fastembed::TextEmbedding,
    name: String,
}

#[cfg(feature = "local")]
impl LocalEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model_type = match model_name {
            "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            other => {
                return Err(PdfQaError::Config(format!(
                    "Unknown local model: {}. Supported: all-MiniLM-L6-v2, all-MiniLM-L12-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    other
                )));
            }
        };

        let model =
            TextEmbedding::try_new(InitOptions::new(model_type).with_show_download_progress(true))
                .map_err(|e| {
                    PdfQaError::EmbeddingService(ServiceFailure::InvalidResponse(e.to_string()))
                })?;

        Ok(Self {
            model,
            name: model_name.to_string(),
        })
    }
}

#[cfg(feature = "local")]
impl Embedder for LocalEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| PdfQaError::EmbeddingService(ServiceFailure::InvalidResponse(e.to_string())))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

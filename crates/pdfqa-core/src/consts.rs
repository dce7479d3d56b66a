/// Name of the config file looked up from the working directory upwards
pub const CONFIG_FILE: &str = ".pdfqa.json";

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default chunk overlap in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Default chunk separator
pub const DEFAULT_SEPARATOR: char = '\n';

/// Default number of chunks retrieved per question
pub const DEFAULT_TOP_K: usize = 4;

/// Default OpenAI-compatible API base URL
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Model used by the fastembed provider when none is configured
pub const DEFAULT_LOCAL_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default generation model
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o";

/// Most deterministic sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Inputs per embedding request
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Dimension of the offline hash embedder
pub const DEFAULT_HASH_DIM: usize = 256;

/// Per-request timeout for provider calls
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

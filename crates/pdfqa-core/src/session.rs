//! Session orchestration: credential, document, index, questions
//!
//! A session owns at most one document and the index built from it. Loading
//! is all-or-nothing: a failed load leaves the previous document and index in
//! place. Every failure moves the session into [`SessionState::Error`], which
//! remembers the stage to resume from; the next successful action leaves it.

use crate::{
    answer, embed, extract, AnswerGenerator, ApiKey, Chunker, Config, Document, Embedder,
    PdfQaError, Result, VectorIndex,
};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A provider needs an API key before documents can be processed.
    AwaitingCredential,
    /// Ready to load a PDF.
    AwaitingDocument,
    /// A document is indexed; questions can be asked.
    IndexReady,
    /// A question is being answered.
    AwaitingAnswer,
}

/// Stage plus the last failure, if the last action failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active(Stage),
    Error { message: String, resume: Stage },
}

impl SessionState {
    /// The stage the session acts from, looking through an error.
    pub fn stage(&self) -> Stage {
        match self {
            SessionState::Active(stage) => *stage,
            SessionState::Error { resume, .. } => *resume,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionState::Error { .. })
    }
}

/// Progress events emitted while loading documents and answering.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Reading text out of the PDF.
    Extracting,
    /// Splitting text into chunks.
    Chunking { chars: usize },
    /// Generating embeddings.
    Embedding { current: usize, total: usize },
    /// Building the vector index.
    Indexing { chunks: usize },
    /// Embedding the question and searching the index.
    Retrieving,
    /// Waiting on the answer generator.
    Generating,
}

/// Type alias for progress callback.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send>;

/// Embedding and generation backends used by a session.
pub struct Services {
    pub embedder: Box<dyn Embedder>,
    pub generator: Box<dyn AnswerGenerator>,
}

impl Services {
    /// Build the backends named in `config`, handing them the credential.
    pub fn from_config(config: &Config, credential: Option<&ApiKey>) -> Result<Self> {
        Ok(Self {
            embedder: embed::from_config(config, credential)?,
            generator: answer::from_config(config, credential)?,
        })
    }
}

/// Stats from loading a document.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub fingerprint: String,
    pub pages: usize,
    pub empty_pages: usize,
    pub chars: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// A retrieved chunk handed to the generator.
#[derive(Debug, Clone)]
pub struct Source {
    /// Position of the chunk in the document
    pub chunk_index: usize,
    /// Character offset of the chunk in the document text
    pub start: usize,
    /// Distance to the question under the index metric
    pub distance: f32,
    pub text: String,
}

/// An answer and the chunks it was grounded on, closest first.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

struct Loaded {
    document: Document,
    index: VectorIndex,
}

/// One user's question-answering session.
pub struct Session {
    config: Config,
    chunker: Chunker,
    credential: Option<ApiKey>,
    services: Option<Services>,
    injected: bool,
    loaded: Option<Loaded>,
    state: SessionState,
    progress_callback: Option<ProgressCallback>,
}

impl Session {
    /// Create a session whose backends are built from `config` on first use.
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a session with caller-provided backends.
    ///
    /// The credential guard still follows `config`.
    pub fn with_services(config: Config, services: Services) -> Result<Self> {
        Self::build(config, Some(services))
    }

    fn build(config: Config, services: Option<Services>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::from_config(&config)?;

        let stage = if config.requires_credential() {
            Stage::AwaitingCredential
        } else {
            Stage::AwaitingDocument
        };

        Ok(Self {
            config,
            chunker,
            credential: None,
            injected: services.is_some(),
            services,
            loaded: None,
            state: SessionState::Active(stage),
            progress_callback: None,
        })
    }

    /// Set a callback to receive progress updates.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    /// Emit a progress event if a callback is registered.
    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// The loaded document, if any.
    pub fn document(&self) -> Option<&Document> {
        self.loaded.as_ref().map(|l| &l.document)
    }

    /// The index of the loaded document, if any.
    pub fn index(&self) -> Option<&VectorIndex> {
        self.loaded.as_ref().map(|l| &l.index)
    }

    /// Supply the API key. An empty key is rejected and leaves the session
    /// otherwise unchanged.
    pub fn set_credential(&mut self, key: &str) -> Result<()> {
        let result = ApiKey::new(key);
        let key = self.settle(result)?;

        if !self.injected {
            // Clients hold the key they were built with
            self.services = None;
        }
        self.credential = Some(key);

        let next = match self.state.stage() {
            Stage::AwaitingCredential => Stage::AwaitingDocument,
            stage => stage,
        };
        self.state = SessionState::Active(next);
        tracing::info!("API key set");
        Ok(())
    }

    /// Extract, chunk, embed and index a PDF, replacing any loaded document.
    pub fn load_document(&mut self, bytes: &[u8]) -> Result<DocumentSummary> {
        let result = self.try_load(bytes);
        let (document, index) = self.settle(result)?;

        let summary = DocumentSummary {
            fingerprint: document.fingerprint.clone(),
            pages: document.page_count,
            empty_pages: document.empty_pages,
            chars: document.char_count(),
            chunks: index.len(),
            dimension: index.dimension(),
        };
        tracing::info!(
            "Indexed document {} ({} chars, {} chunks)",
            &summary.fingerprint[..12],
            summary.chars,
            summary.chunks
        );

        self.loaded = Some(Loaded { document, index });
        self.state = SessionState::Active(Stage::IndexReady);
        Ok(summary)
    }

    fn try_load(&mut self, bytes: &[u8]) -> Result<(Document, VectorIndex)> {
        // Nothing is read before the credential guard passes
        self.ensure_credential()?;

        self.emit_progress(ProgressEvent::Extracting);
        let document = extract::extract_text(bytes)?;
        if document.text.trim().is_empty() {
            return Err(PdfQaError::Extraction(format!(
                "no extractable text in {} page(s)",
                document.page_count
            )));
        }
        if self
            .document()
            .is_some_and(|d| d.fingerprint == document.fingerprint)
        {
            tracing::debug!("Same document loaded again, rebuilding index");
        }

        self.emit_progress(ProgressEvent::Chunking {
            chars: document.char_count(),
        });
        let chunks = self.chunker.split(&document.text);

        self.ensure_services()?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embed_chunks(&texts)?;

        self.emit_progress(ProgressEvent::Indexing {
            chunks: chunks.len(),
        });
        let index = VectorIndex::build(chunks, vectors, self.config.metric)?;

        Ok((document, index))
    }

    /// Embed texts in batches, serially, keeping input order.
    fn embed_chunks(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let embedder = &self.services()?.embedder;
        let total = texts.len();
        let mut vectors = Vec::with_capacity(total);

        for batch in texts.chunks(self.config.batch_size) {
            self.emit_progress(ProgressEvent::Embedding {
                current: vectors.len(),
                total,
            });
            vectors.extend(embedder.embed_batch(batch)?);
        }
        self.emit_progress(ProgressEvent::Embedding {
            current: vectors.len(),
            total,
        });

        Ok(vectors)
    }

    /// Answer a question from the loaded document.
    pub fn ask(&mut self, question: &str) -> Result<Answer> {
        let result = self.try_ask(question);
        let answer = self.settle(result)?;
        self.state = SessionState::Active(Stage::IndexReady);
        Ok(answer)
    }

    fn try_ask(&mut self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PdfQaError::Config("question is empty".into()));
        }
        if self.loaded.is_none() {
            return Err(PdfQaError::NoDocument);
        }
        self.ensure_services()?;
        self.state = SessionState::Active(Stage::AwaitingAnswer);

        let services = self.services()?;
        let index = self.index().ok_or(PdfQaError::NoDocument)?;

        self.emit_progress(ProgressEvent::Retrieving);
        let query = services.embedder.embed(question)?;
        let hits = index.search(&query, self.config.top_k)?;
        tracing::debug!("Retrieved {} of {} chunks", hits.len(), index.len());

        let context: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();

        self.emit_progress(ProgressEvent::Generating);
        let text = services.generator.answer(question, &context)?;

        let sources = hits
            .iter()
            .map(|h| Source {
                chunk_index: h.chunk.index,
                start: h.chunk.start,
                distance: h.distance,
                text: h.chunk.text.clone(),
            })
            .collect();

        Ok(Answer { text, sources })
    }

    fn ensure_credential(&self) -> Result<()> {
        if self.config.requires_credential() && self.credential.is_none() {
            return Err(PdfQaError::MissingCredential);
        }
        Ok(())
    }

    fn ensure_services(&mut self) -> Result<()> {
        if self.services.is_none() {
            self.ensure_credential()?;
            let services = Services::from_config(&self.config, self.credential.as_ref())?;
            tracing::debug!(
                "Using embedder {} and generator {}",
                services.embedder.name(),
                services.generator.name()
            );
            self.services = Some(services);
        }
        Ok(())
    }

    fn services(&self) -> Result<&Services> {
        self.services.as_ref().ok_or(PdfQaError::MissingCredential)
    }

    /// Record the outcome of an action in the session state.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let message = match &self.credential {
                Some(key) => key.redact(&e.to_string()),
                None => e.to_string(),
            };
            tracing::warn!("{}", message);

            let resume = match self.state.stage() {
                // An interrupted answer resumes from the ready index
                Stage::AwaitingAnswer => Stage::IndexReady,
                stage => stage,
            };
            self.state = SessionState::Error { message, resume };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::answer::ExtractiveGenerator;
    use crate::embed::HashEmbedder;
    use crate::extract::testing::pdf_with_pages;
    use crate::ServiceFailure;

    /// Records the context handed to it and answers with a fixed string.
    struct RecordingGenerator {
        seen: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl AnswerGenerator for RecordingGenerator {
        fn answer(&self, _question: &str, context: &[&str]) -> Result<String> {
            self.seen
                .borrow_mut()
                .push(context.iter().map(|c| c.to_string()).collect());
            Ok("recorded".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn offline_session(config: Config) -> Session {
        Session::new(Config {
            embedding_provider: crate::config::EmbeddingProvider::Hash,
            generation_provider: crate::config::GenerationProvider::Extractive,
            ..config
        })
        .unwrap()
    }

    #[test]
    fn test_offline_session_starts_awaiting_document() {
        let session = Session::new(Config::offline()).unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::AwaitingDocument)
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            chunk_size: 10,
            chunk_overlap: 10,
            ..Config::offline()
        };
        assert!(matches!(Session::new(config), Err(PdfQaError::Config(_))));
    }

    #[test]
    fn test_end_to_end_surfaces_page_two() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let services = Services {
            embedder: Box::new(HashEmbedder::new(128)),
            generator: Box::new(RecordingGenerator { seen: seen.clone() }),
        };
        let mut session = Session::with_services(Config::offline(), services).unwrap();

        let pdf = pdf_with_pages(&["Page1.", "Page2.", "Page3."]);
        let summary = session.load_document(&pdf).unwrap();
        assert_eq!(summary.pages, 3);
        assert!(summary.chunks >= 1);
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::IndexReady)
        );

        let answer = session.ask("What is on page 2?").unwrap();
        assert_eq!(answer.text, "recorded");

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].iter().any(|c| c.contains("Page2.")));
        assert!(answer.sources.iter().any(|s| s.text.contains("Page2.")));
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::IndexReady)
        );
    }

    #[test]
    fn test_pages_in_separate_chunks_rank_exact_match_first() {
        let mut session = offline_session(Config {
            chunk_size: 24,
            chunk_overlap: 2,
            top_k: 4,
            ..Config::default()
        });

        let pdf = pdf_with_pages(&[
            "alpha alpha alpha",
            "bravo bravo bravo",
            "charlie charlie charlie",
        ]);
        let summary = session.load_document(&pdf).unwrap();
        assert!(summary.chunks >= 3);

        let answer = session.ask("charlie").unwrap();
        assert!(answer.sources[0].text.contains("charlie"));
        assert!(answer.text.contains("charlie"));
        assert!(answer.sources.len() <= 4);
    }

    #[test]
    fn test_top_k_clamped_to_chunk_count() {
        let mut session = offline_session(Config {
            top_k: 50,
            ..Config::default()
        });
        session
            .load_document(&pdf_with_pages(&["only one small page"]))
            .unwrap();

        let answer = session.ask("small").unwrap();
        assert_eq!(answer.sources.len(), 1);
    }

    #[test]
    fn test_missing_credential_halts_before_network() {
        let mut server = mockito::Server::new();
        let embeddings = server.mock("POST", "/embeddings").expect(0).create();
        let chat = server.mock("POST", "/chat/completions").expect(0).create();

        let config = Config {
            api_base: server.url(),
            ..Config::default()
        };
        let mut session = Session::new(config).unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::AwaitingCredential)
        );

        assert!(matches!(
            session.set_credential(""),
            Err(PdfQaError::MissingCredential)
        ));

        let pdf = pdf_with_pages(&["Page1."]);
        let result = session.load_document(&pdf);
        assert!(matches!(result, Err(PdfQaError::MissingCredential)));
        assert!(session.document().is_none());
        assert_eq!(session.state().stage(), Stage::AwaitingCredential);

        embeddings.assert();
        chat.assert();
    }

    #[test]
    fn test_missing_credential_skips_extraction() {
        let config = Config::default();
        let mut session = Session::new(config).unwrap();

        // Garbage bytes would be an extraction error if extraction ran
        let result = session.load_document(b"not a pdf");
        assert!(matches!(result, Err(PdfQaError::MissingCredential)));
    }

    #[test]
    fn test_live_providers_end_to_end() {
        let mut server = mockito::Server::new();
        let embeddings = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-live")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"index": 0, "embedding": [1.0, 0.0]}]}"#)
            .expect(2)
            .create();
        let chat = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-live")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "It says hello."}}]}"#)
            .create();

        let config = Config {
            api_base: server.url(),
            ..Config::default()
        };
        let mut session = Session::new(config).unwrap();
        session.set_credential("sk-live").unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::AwaitingDocument)
        );

        let summary = session.load_document(&pdf_with_pages(&["hello"])).unwrap();
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.dimension, 2);

        let answer = session.ask("What does it say?").unwrap();
        assert_eq!(answer.text, "It says hello.");
        assert_eq!(answer.sources.len(), 1);

        embeddings.assert();
        chat.assert();
    }

    #[test]
    fn test_provider_error_is_redacted_and_recoverable() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(500)
            .with_body("bad key sk-leaky")
            .create();

        let config = Config {
            api_base: server.url(),
            ..Config::default()
        };
        let mut session = Session::new(config).unwrap();
        session.set_credential("sk-leaky").unwrap();

        let result = session.load_document(&pdf_with_pages(&["text"]));
        assert!(matches!(result, Err(PdfQaError::EmbeddingService(_))));

        match session.state() {
            SessionState::Error { message, resume } => {
                assert!(!message.contains("sk-leaky"));
                assert_eq!(*resume, Stage::AwaitingDocument);
            }
            other => panic!("expected error state, got {:?}", other),
        }
    }

    #[test]
    fn test_replacing_rejected_key_clears_error() {
        let mut server = mockito::Server::new();
        let _rejected = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-wrong")
            .with_status(401)
            .create();
        let _accepted = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-good")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"index": 0, "embedding": [1.0, 0.0]}]}"#)
            .create();

        let config = Config {
            api_base: server.url(),
            generation_provider: crate::config::GenerationProvider::Extractive,
            ..Config::default()
        };
        let mut session = Session::new(config).unwrap();
        session.set_credential("sk-wrong").unwrap();

        let pdf = pdf_with_pages(&["hello"]);
        assert!(matches!(
            session.load_document(&pdf),
            Err(PdfQaError::EmbeddingService(ServiceFailure::Unauthorized))
        ));
        assert!(session.state().is_error());

        session.set_credential("sk-good").unwrap();
        assert!(!session.state().is_error());
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::AwaitingDocument)
        );

        session.load_document(&pdf).unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::IndexReady)
        );
    }

    #[test]
    fn test_new_key_keeps_loaded_index_stage() {
        let mut session = offline_session(Config::default());
        session.load_document(&pdf_with_pages(&["text"])).unwrap();
        assert!(session.load_document(b"junk").is_err());

        session.set_credential("sk-any").unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::IndexReady)
        );
    }

    #[test]
    fn test_failed_load_keeps_previous_index() {
        let mut session = offline_session(Config::default());
        session
            .load_document(&pdf_with_pages(&["first document"]))
            .unwrap();
        let fingerprint = session.document().unwrap().fingerprint.clone();

        let result = session.load_document(b"%PDF-garbage");
        assert!(matches!(result, Err(PdfQaError::Extraction(_))));
        assert!(session.state().is_error());
        assert_eq!(session.state().stage(), Stage::IndexReady);
        assert_eq!(session.document().unwrap().fingerprint, fingerprint);

        // Recovers on the next successful action
        session.ask("first").unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Active(Stage::IndexReady)
        );
    }

    #[test]
    fn test_new_document_replaces_index() {
        let mut session = offline_session(Config::default());
        session
            .load_document(&pdf_with_pages(&["apples"]))
            .unwrap();
        session
            .load_document(&pdf_with_pages(&["oranges"]))
            .unwrap();

        let answer = session.ask("apples").unwrap();
        assert!(answer.sources.iter().all(|s| !s.text.contains("apples")));
        assert!(answer.text.contains("oranges"));
    }

    #[test]
    fn test_document_without_text_rejected() {
        let mut session = offline_session(Config::default());
        let result = session.load_document(&pdf_with_pages(&["", ""]));
        assert!(matches!(result, Err(PdfQaError::Extraction(_))));
        assert!(session.index().is_none());
    }

    #[test]
    fn test_ask_without_document() {
        let mut session = offline_session(Config::default());
        assert!(matches!(
            session.ask("anything?"),
            Err(PdfQaError::NoDocument)
        ));
        assert_eq!(session.state().stage(), Stage::AwaitingDocument);
    }

    #[test]
    fn test_empty_question_rejected() {
        let mut session = offline_session(Config::default());
        session.load_document(&pdf_with_pages(&["text"])).unwrap();
        assert!(matches!(session.ask("   "), Err(PdfQaError::Config(_))));
    }

    #[test]
    fn test_progress_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut session = offline_session(Config {
            batch_size: 2,
            chunk_size: 10,
            chunk_overlap: 2,
            ..Config::default()
        });
        session.set_progress_callback(Box::new({
            let events = events.clone();
            move |event| events.lock().unwrap().push(event)
        }));

        let summary = session
            .load_document(&pdf_with_pages(&["some longer text spread over chunks"]))
            .unwrap();
        session.ask("text").unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::Extracting));
        assert!(matches!(events[1], ProgressEvent::Chunking { .. }));

        let embedding: Vec<(usize, usize)> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Embedding { current, total } => Some((*current, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(embedding.last(), Some(&(summary.chunks, summary.chunks)));
        assert_eq!(embedding.len(), summary.chunks.div_ceil(2) + 1);

        assert!(events.iter().any(|e| matches!(e, ProgressEvent::Retrieving)));
        assert!(matches!(events.last(), Some(ProgressEvent::Generating)));
    }

    #[test]
    fn test_injected_services_survive_credential_change() {
        let services = Services {
            embedder: Box::new(HashEmbedder::new(16)),
            generator: Box::new(ExtractiveGenerator),
        };
        // Default config needs a key, so the guard still applies
        let mut session = Session::with_services(Config::default(), services).unwrap();
        assert!(matches!(
            session.load_document(&pdf_with_pages(&["x"])),
            Err(PdfQaError::MissingCredential)
        ));

        session.set_credential("sk-any").unwrap();
        session.load_document(&pdf_with_pages(&["hello world"])).unwrap();
        assert_eq!(session.ask("hello").unwrap().text.trim(), "hello world");
    }
}

//! Answer synthesis over retrieved chunks
//!
//! All retrieved chunks are placed verbatim into a single prompt ("stuff"
//! strategy); there is no re-ranking or token budgeting on our side.

use crate::config::GenerationProvider;
use crate::openai::{ChatMessage, ChatRequest, ChatResponse, OpenAiClient};
use crate::{ApiKey, Config, PdfQaError, Result, ServiceFailure};

const STUFF_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const UNKNOWN_ANSWER: &str = "I don't know.";

/// Fill the stuff prompt with the question and context chunks in order.
pub fn stuff_prompt(question: &str, context: &[&str]) -> String {
    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        STUFF_PREAMBLE,
        context.join("\n\n"),
        question
    )
}

/// Produces an answer from a question and its supporting chunks.
pub trait AnswerGenerator {
    fn answer(&self, question: &str, context: &[&str]) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Build the generator selected in `config`.
pub fn from_config(
    config: &Config,
    credential: Option<&ApiKey>,
) -> Result<Box<dyn AnswerGenerator>> {
    match config.generation_provider {
        GenerationProvider::OpenAi => {
            let key = credential.ok_or(PdfQaError::MissingCredential)?;
            Ok(Box::new(OpenAiGenerator::new(config, key.clone())?))
        }
        GenerationProvider::Extractive => Ok(Box::new(ExtractiveGenerator)),
    }
}

/// Answers from an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(config: &Config, api_key: ApiKey) -> Result<Self> {
        let client = OpenAiClient::new(&config.api_base, api_key, config.request_timeout())
            .map_err(PdfQaError::GenerationService)?;

        Ok(Self {
            client,
            model: config.generation_model.clone(),
            temperature: config.temperature,
        })
    }
}

impl AnswerGenerator for OpenAiGenerator {
    fn answer(&self, question: &str, context: &[&str]) -> Result<String> {
        let prompt = stuff_prompt(question, context);
        tracing::debug!(
            "Sending {} chars of prompt to {} (temperature {})",
            prompt.len(),
            self.model,
            self.temperature
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
        };

        let response: ChatResponse = self
            .client
            .post("chat/completions", &request)
            .map_err(PdfQaError::GenerationService)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                PdfQaError::GenerationService(ServiceFailure::InvalidResponse(
                    "response contained no answer".to_string(),
                ))
            })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Offline generator that returns the closest chunk as the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveGenerator;

impl AnswerGenerator for ExtractiveGenerator {
    fn answer(&self, _question: &str, context: &[&str]) -> Result<String> {
        Ok(context
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_ANSWER)
            .to_string())
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

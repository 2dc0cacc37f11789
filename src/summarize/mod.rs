//! Transcript summarization with a generative text model.
//!
//! [`Summarizer::summarize`] never fails: when the model cannot be reached or
//! returns nothing useful, a summary built from the opening of the transcript
//! is returned instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::transcribe::Transcript;
use crate::utils::truncate_chars;

pub mod bedrock;
pub mod openai;

pub use bedrock::BedrockGenerator;
pub use openai::OpenAiGenerator;

/// Instruction wrapped around the (truncated) transcript
const PROMPT_TEMPLATE: &str = "Please provide a comprehensive summary of this video transcript in 2-3 paragraphs, focusing on the main points, key insights, and important takeaways:

{transcript}

Summary:";

/// Appended to fallback summaries so readers know what they are looking at
const FALLBACK_NOTE: &str =
    "(An automatic summary could not be generated; this is the opening of the transcript.)";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One call to a text model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Generative text model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Name used in logs
    fn provider_name(&self) -> &'static str;
}

/// Whether the summary came from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryOrigin {
    Generated,
    Fallback,
    /// Canned text produced in mock mode
    Mock,
}

/// Summary text, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    text: String,
    origin: SummaryOrigin,
}

impl Summary {
    pub fn new(text: impl Into<String>, origin: SummaryOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> SummaryOrigin {
        self.origin
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == SummaryOrigin::Fallback
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Transcript characters included in the prompt
    pub prompt_char_limit: usize,

    /// Transcript characters included in a fallback summary
    pub fallback_excerpt_chars: usize,

    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            prompt_char_limit: 4000,
            fallback_excerpt_chars: 500,
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 1.0,
        }
    }
}

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    settings: SummarizerSettings,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: SummarizerSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Longer transcripts are truncated, not chunked
    pub fn build_prompt(&self, transcript: &Transcript) -> String {
        let excerpt = truncate_chars(transcript.as_str(), self.settings.prompt_char_limit);
        PROMPT_TEMPLATE.replace("{transcript}", excerpt)
    }

    pub fn fallback(&self, transcript: &Transcript) -> Summary {
        let opening = truncate_chars(transcript.as_str(), self.settings.fallback_excerpt_chars);
        Summary::new(
            format!("This video discusses: {}...\n\n{}", opening, FALLBACK_NOTE),
            SummaryOrigin::Fallback,
        )
    }

    pub async fn summarize(&self, transcript: &Transcript) -> Summary {
        let request = GenerationRequest {
            prompt: self.build_prompt(transcript),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };

        let result = self
            .generator
            .generate(&request)
            .await
            .and_then(|completion| {
                let completion = completion.trim();
                if completion.is_empty() {
                    Err(GenerationError::EmptyCompletion)
                } else {
                    Ok(completion.to_string())
                }
            });

        match result {
            Ok(text) => {
                tracing::info!(
                    provider = self.generator.provider_name(),
                    characters = text.chars().count(),
                    "Summary generated"
                );
                Summary::new(text, SummaryOrigin::Generated)
            }
            Err(e) => {
                tracing::warn!(
                    provider = self.generator.provider_name(),
                    error = %e,
                    "Summary generation failed, using transcript excerpt"
                );
                self.fallback(transcript)
            }
        }
    }
}

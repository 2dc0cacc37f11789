//! Video Summarizer - turn a YouTube link into a stored transcript and summary
//!
//! This library downloads the audio track of a video with yt-dlp, transcribes it with
//! AWS Transcribe, summarizes the transcript with a language model (AWS Bedrock or
//! OpenAI) and persists both artifacts to S3. The [`pipeline::PipelineOrchestrator`]
//! sequences the stages and guarantees cleanup of intermediate artifacts.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod pipeline;
pub mod storage;
pub mod summarize;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{extract_video_id, AudioAcquirer, AudioArtifact, VideoId};
pub use output::PipelineResponse;
pub use pipeline::{PipelineOrchestrator, PipelineResult, Request};
pub use storage::{BlobLocation, BlobStore};
pub use summarize::{Summarizer, Summary, TextGenerator};
pub use transcribe::{Transcript, TranscriptionOrchestrator, TranscriptionService};

use extractors::acquirer::AcquisitionError;
use transcribe::TranscriptionError;

/// Result type used at the CLI and configuration boundaries
pub type Result<T> = anyhow::Result<T>;

/// Who has to act for a failed request to succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The request itself is wrong and must be corrected
    Client,
    /// Something went wrong while processing a valid request
    Server,
}

/// Terminal failures of the summarization pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid YouTube URL")]
    InvalidUrl,

    #[error("Failed to download video audio. YouTube may be blocking automated requests ({0})")]
    AcquisitionFailed(String),

    #[error("Failed to stage audio for transcription: {0}")]
    StagingFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Transcription did not finish within {0} seconds")]
    TranscriptionTimeout(u64),

    #[error("Failed to save results: {0}")]
    PersistenceFailed(String),

    #[error("Processing deadline exceeded before {0}")]
    DeadlineExceeded(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    pub fn fault(&self) -> FaultKind {
        match self {
            PipelineError::MissingField(_) | PipelineError::InvalidUrl => FaultKind::Client,
            _ => FaultKind::Server,
        }
    }

    /// Whether the same request may succeed if submitted again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::AcquisitionFailed(_)
                | PipelineError::TranscriptionTimeout(_)
                | PipelineError::DeadlineExceeded(_)
        )
    }
}

impl From<AcquisitionError> for PipelineError {
    fn from(err: AcquisitionError) -> Self {
        match err {
            AcquisitionError::DeadlineReached { .. } => {
                PipelineError::DeadlineExceeded("audio acquisition")
            }
            other => PipelineError::AcquisitionFailed(other.to_string()),
        }
    }
}

impl From<TranscriptionError> for PipelineError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::Timeout { waited } => {
                PipelineError::TranscriptionTimeout(waited.as_secs())
            }
            other => PipelineError::TranscriptionFailed(other.to_string()),
        }
    }
}

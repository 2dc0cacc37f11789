use anyhow::Result;
use console::style;
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::{PipelineResult, ResultStatus, StorageLocations};
use crate::{FaultKind, PipelineError};

/// Body returned for a completed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessBody {
    pub summary: String,

    /// Transcript excerpt, ellipsis-terminated when cut
    pub transcript: String,

    pub video_id: String,
    pub storage_locations: StorageLocations,

    /// Only present for mock results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ResultStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// The single shape every request outcome is reported in
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineResponse {
    Success(SuccessBody),
    ClientFault(ErrorBody),
    ServerFault(ErrorBody),
}

impl PipelineResponse {
    pub fn from_outcome(outcome: &Result<PipelineResult, PipelineError>) -> Self {
        match outcome {
            Ok(result) => Self::success(result),
            Err(e) => Self::failure(e),
        }
    }

    pub fn success(result: &PipelineResult) -> Self {
        PipelineResponse::Success(SuccessBody {
            summary: result.summary.as_str().to_string(),
            transcript: result.transcript_excerpt.clone(),
            video_id: result.video_id.to_string(),
            storage_locations: result.storage_locations.clone(),
            status: (result.status == ResultStatus::Mock).then_some(ResultStatus::Mock),
        })
    }

    pub fn failure(error: &PipelineError) -> Self {
        let body = ErrorBody {
            error: error.to_string(),
        };
        match error.fault() {
            FaultKind::Client => PipelineResponse::ClientFault(body),
            FaultKind::Server => PipelineResponse::ServerFault(body),
        }
    }

    /// HTTP-style status code
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineResponse::Success(_) => 200,
            PipelineResponse::ClientFault(_) => 400,
            PipelineResponse::ServerFault(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResponse::Success(_))
    }

    pub fn render(&self, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Text => Ok(self.render_text()),
        }
    }

    fn render_text(&self) -> String {
        match self {
            PipelineResponse::Success(body) => {
                let mut text = format!(
                    "{} {}\n\n{}\n{}\n\n{}\n{}\n\n{}\n  transcript: {}\n  summary:    {}",
                    style("Video:").bold(),
                    body.video_id,
                    style("Summary").bold().underlined(),
                    body.summary,
                    style("Transcript").bold().underlined(),
                    body.transcript,
                    style("Stored at").bold(),
                    body.storage_locations.transcript_key,
                    body.storage_locations.summary_key,
                );
                if let Some(record_key) = &body.storage_locations.record_key {
                    text.push_str(&format!("\n  record:     {}", record_key));
                }
                if body.status == Some(ResultStatus::Mock) {
                    text.push_str(&format!("\n\n{}", style("(mock result)").yellow()));
                }
                text
            }
            PipelineResponse::ClientFault(body) => {
                format!("{} {}", style("Invalid request:").red().bold(), body.error)
            }
            PipelineResponse::ServerFault(body) => {
                format!("{} {}", style("Processing failed:").red().bold(), body.error)
            }
        }
    }
}

/// Save a response to file
pub fn save_to_file(response: &PipelineResponse, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = match format {
        // Files never carry terminal styling
        OutputFormat::Text => console::strip_ansi_codes(&response.render(format)?).into_owned(),
        OutputFormat::Json => response.render(format)?,
    };

    fs_err::write(path, content)?;
    Ok(())
}

/// Print a response to the console; failures go to stderr
pub fn print_to_console(response: &PipelineResponse, format: &OutputFormat) -> Result<()> {
    let content = response.render(format)?;

    if response.is_success() {
        println!("{}", content);
    } else {
        eprintln!("{}", content);
    }
    Ok(())
}

use serde::Deserialize;

use super::{Transcript, TranscriptionError};

/// Transcript text plus figures worth logging
#[derive(Debug, Clone)]
pub struct ProcessedTranscript {
    pub transcript: Transcript,
    pub stats: TranscriptStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptStats {
    /// Number of pronounced words
    pub word_count: usize,

    /// Mean confidence over words that report one
    pub average_confidence: Option<f64>,
}

/// AWS Transcribe result document
#[derive(Debug, Deserialize)]
struct TranscriptDocument {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
    #[serde(default)]
    items: Vec<TranscriptItem>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    confidence: Option<String>,
}

/// Turn a raw result document into a transcript.
///
/// Transcript segments are joined in document order with a single space and
/// the result is trimmed.
pub fn process_document(document: &[u8]) -> Result<ProcessedTranscript, TranscriptionError> {
    let parsed: TranscriptDocument = serde_json::from_slice(document)
        .map_err(|e| TranscriptionError::InvalidDocument(e.to_string()))?;

    let transcript = parsed
        .results
        .transcripts
        .iter()
        .map(|segment| segment.transcript.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ProcessedTranscript {
        transcript: Transcript::new(transcript.trim()),
        stats: compute_stats(&parsed.results.items),
    })
}

fn compute_stats(items: &[TranscriptItem]) -> TranscriptStats {
    let words: Vec<&TranscriptItem> = items
        .iter()
        .filter(|item| item.item_type == "pronunciation")
        .collect();

    let confidences: Vec<f64> = words
        .iter()
        .filter_map(|item| item.alternatives.first())
        .filter_map(|alt| alt.confidence.as_ref())
        .filter_map(|c| c.parse::<f64>().ok())
        .collect();

    TranscriptStats {
        word_count: words.len(),
        average_confidence: average(&confidences),
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

//! End-to-end processing of one summarization request.
//!
//! The orchestrator validates the request, then runs acquisition, staging,
//! transcription, summarization and persistence in order. Whatever happens
//! after validation, the staged audio object and the local work directory are
//! cleaned up before the outcome is returned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::Config;
use crate::extractors::{
    extract_video_id, AudioAcquirer, AudioArtifact, StrategyAcquirer, VideoId, YtDlpRunner,
};
use crate::storage::{BlobLocation, BlobStore, S3BlobStore};
use crate::summarize::{
    BedrockGenerator, OpenAiGenerator, Summarizer, Summary, SummaryOrigin, TextGenerator,
};
use crate::transcribe::{AwsTranscribeService, Transcript, TranscriptionOrchestrator};
use crate::utils::{excerpt, sanitize_component, unique_suffix};
use crate::PipelineError;

/// Incoming summarization request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "url", default)]
    pub source_url: String,

    /// Address the requester wants to be notified at
    #[serde(rename = "email", default)]
    pub notify_address: String,
}

impl Request {
    pub fn new(source_url: impl Into<String>, notify_address: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            notify_address: notify_address.into(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source_url.trim().is_empty() {
            return Err(PipelineError::MissingField("url"));
        }
        if self.notify_address.trim().is_empty() {
            return Err(PipelineError::MissingField("email"));
        }
        Ok(())
    }

    /// Validate the request and extract the video it refers to.
    ///
    /// Needs no configuration or collaborators, so callers can reject bad
    /// requests before doing any other work.
    pub fn video_id(&self) -> Result<VideoId, PipelineError> {
        tracing::debug!(stage = %PipelineStage::Validating, "Validating request");
        self.validate()?;

        tracing::debug!(stage = %PipelineStage::ExtractingId, url = %self.source_url.trim());
        extract_video_id(self.source_url.trim()).ok_or_else(|| {
            tracing::warn!(url = %self.source_url.trim(), "Rejected unsupported URL");
            PipelineError::InvalidUrl
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    ExtractingId,
    AcquiringAudio,
    StagingAudio,
    Transcribing,
    Summarizing,
    Persisting,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Validating => "validating",
            PipelineStage::ExtractingId => "extracting_id",
            PipelineStage::AcquiringAudio => "acquiring_audio",
            PipelineStage::StagingAudio => "staging_audio",
            PipelineStage::Transcribing => "transcribing",
            PipelineStage::Summarizing => "summarizing",
            PipelineStage::Persisting => "persisting",
            PipelineStage::CleaningUp => "cleaning_up",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    /// Phrase used when the deadline runs out before this stage
    fn description(&self) -> &'static str {
        match self {
            PipelineStage::AcquiringAudio => "audio acquisition",
            PipelineStage::StagingAudio => "audio staging",
            PipelineStage::Transcribing => "transcription",
            PipelineStage::Summarizing => "summarization",
            PipelineStage::Persisting => "saving results",
            _ => "completion",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Live,
    /// Skip acquisition, transcription and summarization; persist canned text
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Mock,
}

/// Keys of the persisted artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocations {
    pub transcript_key: String,
    pub summary_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub video_id: VideoId,
    pub summary: Summary,
    pub transcript: Transcript,

    /// Leading part of the transcript returned to the caller
    pub transcript_excerpt: String,

    pub storage_locations: StorageLocations,
    pub status: ResultStatus,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bucket for staged audio
    pub raw_bucket: String,
    pub transcripts_bucket: String,
    pub summaries_bucket: String,

    /// Parent of per-request work directories, system temp dir when unset
    pub temp_dir: Option<PathBuf>,

    pub transcript_excerpt_chars: usize,

    /// Wall-clock ceiling for one request
    pub deadline: Option<Duration>,

    /// Also store a JSON record of the request
    pub persist_record: bool,

    pub mode: PipelineMode,
}

/// Intermediate artifacts that must be removed once a request finishes
#[derive(Default)]
struct Scratch {
    work_dir: Option<TempDir>,
    staged_audio: Option<BlobLocation>,
}

pub struct PipelineOrchestrator {
    acquirer: Arc<dyn AudioAcquirer>,
    transcriber: TranscriptionOrchestrator,
    summarizer: Summarizer,
    store: Arc<dyn BlobStore>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        acquirer: Arc<dyn AudioAcquirer>,
        transcriber: TranscriptionOrchestrator,
        summarizer: Summarizer,
        store: Arc<dyn BlobStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            acquirer,
            transcriber,
            summarizer,
            store,
            settings,
        }
    }

    /// Wire up the AWS-backed collaborators described by `config`
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        let store: Arc<dyn BlobStore> = Arc::new(S3BlobStore::new(&sdk_config));

        let service = Arc::new(AwsTranscribeService::new(
            &sdk_config,
            config.aws.transcription.language_code.clone(),
        ));
        let transcriber =
            TranscriptionOrchestrator::new(service, store.clone(), config.transcription_settings());

        let generator: Arc<dyn TextGenerator> = match &config.summarizer.openai_api_key {
            Some(api_key) if config.uses_openai() => Arc::new(OpenAiGenerator::new(
                api_key.clone(),
                config.summarizer.openai_model.clone(),
                config.summarizer.openai_base_url.clone(),
                Duration::from_secs(config.summarizer.request_timeout_secs),
            )?),
            _ => Arc::new(BedrockGenerator::new(
                &sdk_config,
                config.summarizer.bedrock_model.clone(),
            )),
        };
        tracing::debug!(provider = generator.provider_name(), "Summary provider selected");
        let summarizer = Summarizer::new(generator, config.summarizer_settings());

        let acquirer = StrategyAcquirer::new(
            YtDlpRunner::new(config.acquisition.yt_dlp_path.clone()),
            config.acquisition.strategies.clone(),
            config.attempt_timeout(),
        )?;

        Ok(Self::new(
            Arc::new(acquirer),
            transcriber,
            summarizer,
            store,
            config.pipeline_settings(),
        ))
    }

    /// Process one request to completion.
    ///
    /// Validation errors are returned before any collaborator is contacted.
    pub async fn run(&self, request: &Request) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let deadline = self.settings.deadline.map(|budget| started + budget);

        let video_id = request.video_id()?;

        let span = tracing::info_span!("pipeline", video_id = %video_id);
        async {
            if self.settings.mode == PipelineMode::Mock {
                return self.run_mock(request, &video_id).await;
            }

            let mut scratch = Scratch::default();
            let outcome = self
                .process(request, &video_id, deadline, &mut scratch)
                .await;
            self.cleanup(scratch).await;

            match &outcome {
                Ok(_) => tracing::info!(
                    stage = %PipelineStage::Done,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Request completed"
                ),
                Err(e) => tracing::error!(
                    stage = %PipelineStage::Failed,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Request failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: &Request,
        video_id: &VideoId,
        deadline: Option<Instant>,
        scratch: &mut Scratch,
    ) -> Result<PipelineResult, PipelineError> {
        ensure_time_left(deadline, PipelineStage::AcquiringAudio)?;
        let work_dir = self.create_work_dir()?;
        let work_path = work_dir.path().to_path_buf();
        scratch.work_dir = Some(work_dir);

        tracing::info!(stage = %PipelineStage::AcquiringAudio, "Downloading audio");
        let audio = self
            .acquirer
            .acquire(request.source_url.trim(), video_id, &work_path, deadline)
            .await?;

        ensure_time_left(deadline, PipelineStage::StagingAudio)?;
        let staged = self.stage_audio(video_id, &audio).await?;
        scratch.staged_audio = Some(staged.clone());

        ensure_time_left(deadline, PipelineStage::Transcribing)?;
        tracing::info!(stage = %PipelineStage::Transcribing, "Transcribing audio");
        let mut job = self.transcriber.submit(video_id, &staged, audio.format).await?;
        let max_wait = clamp_to_deadline(self.transcriber.settings().max_wait, deadline);
        let transcript = self.transcriber.await_transcript(&mut job, max_wait).await?;

        ensure_time_left(deadline, PipelineStage::Summarizing)?;
        tracing::info!(stage = %PipelineStage::Summarizing, "Summarizing transcript");
        let summary = self.summarizer.summarize(&transcript).await;

        ensure_time_left(deadline, PipelineStage::Persisting)?;
        let storage_locations = self
            .persist_artifacts(video_id, request, &transcript, &summary)
            .await?;

        Ok(self.result(video_id, transcript, summary, storage_locations, ResultStatus::Completed))
    }

    async fn run_mock(
        &self,
        request: &Request,
        video_id: &VideoId,
    ) -> Result<PipelineResult, PipelineError> {
        tracing::info!("Mock mode, skipping download, transcription and summarization");

        let transcript = Transcript::new(format!(
            "This is a mock transcript for video {}. In live mode the audio track would be downloaded and transcribed here.",
            video_id
        ));
        let summary = Summary::new(
            format!(
                "Mock summary for video {}. No audio was downloaded and no model was called.",
                video_id
            ),
            SummaryOrigin::Mock,
        );

        let storage_locations = self
            .persist_artifacts(video_id, request, &transcript, &summary)
            .await?;

        Ok(self.result(video_id, transcript, summary, storage_locations, ResultStatus::Mock))
    }

    fn result(
        &self,
        video_id: &VideoId,
        transcript: Transcript,
        summary: Summary,
        storage_locations: StorageLocations,
        status: ResultStatus,
    ) -> PipelineResult {
        PipelineResult {
            video_id: video_id.clone(),
            transcript_excerpt: excerpt(transcript.as_str(), self.settings.transcript_excerpt_chars),
            summary,
            transcript,
            storage_locations,
            status,
        }
    }

    fn create_work_dir(&self) -> Result<TempDir, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("video-summarizer-");

        let created = match &self.settings.temp_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        created.map_err(|e| PipelineError::Internal(format!("Failed to create work directory: {}", e)))
    }

    async fn stage_audio(
        &self,
        video_id: &VideoId,
        audio: &AudioArtifact,
    ) -> Result<BlobLocation, PipelineError> {
        let location = BlobLocation::new(
            &self.settings.raw_bucket,
            format!(
                "audio/{}_{}.{}",
                sanitize_component(video_id.as_str()),
                uuid::Uuid::new_v4(),
                audio.format.as_str()
            ),
        );

        tracing::info!(stage = %PipelineStage::StagingAudio, key = %location.key, "Uploading audio");
        self.store
            .put_file(&location, &audio.path, audio.format.mime_type())
            .await
            .map_err(|e| PipelineError::StagingFailed(e.to_string()))?;

        Ok(location)
    }

    /// Write transcript and summary under fresh keys.
    ///
    /// Every call produces new keys, so repeated requests for the same video
    /// never overwrite each other.
    pub async fn persist_artifacts(
        &self,
        video_id: &VideoId,
        request: &Request,
        transcript: &Transcript,
        summary: &Summary,
    ) -> Result<StorageLocations, PipelineError> {
        let stem = format!("{}_{}", sanitize_component(video_id.as_str()), unique_suffix());
        let transcript_location =
            BlobLocation::new(&self.settings.transcripts_bucket, format!("transcripts/{}.txt", stem));
        let summary_location =
            BlobLocation::new(&self.settings.summaries_bucket, format!("summaries/{}.txt", stem));

        tracing::info!(stage = %PipelineStage::Persisting, "Saving transcript and summary");
        self.write(&transcript_location, transcript.as_str().as_bytes().to_vec(), "text/plain")
            .await?;
        self.write(&summary_location, summary.as_str().as_bytes().to_vec(), "text/plain")
            .await
            .inspect_err(|_| log_orphaned(&[&transcript_location]))?;

        let record_key = if self.settings.persist_record {
            let location =
                BlobLocation::new(&self.settings.summaries_bucket, format!("records/{}.json", stem));
            let record = serde_json::json!({
                "video_id": video_id,
                "source_url": request.source_url.trim(),
                "notify_address": request.notify_address.trim(),
                "summary_origin": summary.origin(),
                "transcript_key": transcript_location.key,
                "summary_key": summary_location.key,
                "created_at": chrono::Utc::now().to_rfc3339(),
            });
            let body = serde_json::to_vec_pretty(&record)
                .map_err(|e| PipelineError::PersistenceFailed(e.to_string()))?;
            self.write(&location, body, "application/json")
                .await
                .inspect_err(|_| log_orphaned(&[&transcript_location, &summary_location]))?;
            Some(location.key)
        } else {
            None
        };

        Ok(StorageLocations {
            transcript_key: transcript_location.key,
            summary_key: summary_location.key,
            record_key,
        })
    }

    async fn write(
        &self,
        location: &BlobLocation,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        self.store
            .put(location, body, content_type)
            .await
            .map_err(|e| {
                tracing::error!(key = %location.key, error = %e, "Write failed");
                PipelineError::PersistenceFailed(e.to_string())
            })
    }

    /// Best effort; failures never change the request outcome
    async fn cleanup(&self, scratch: Scratch) {
        tracing::debug!(stage = %PipelineStage::CleaningUp, "Removing intermediate artifacts");

        if let Some(staged) = scratch.staged_audio {
            if let Err(e) = self.store.delete(&staged).await {
                tracing::warn!(key = %staged.key, error = %e, "Failed to delete staged audio");
            }
        }

        if let Some(work_dir) = scratch.work_dir {
            let path = work_dir.path().to_path_buf();
            if let Err(e) = work_dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove work directory");
            }
        }
    }
}

/// Artifacts written before a later write failed stay in place, unreferenced
fn log_orphaned(written: &[&BlobLocation]) {
    for location in written {
        tracing::warn!(
            bucket = %location.bucket,
            key = %location.key,
            "Artifact left without a response referencing it"
        );
    }
}

fn ensure_time_left(deadline: Option<Instant>, next: PipelineStage) -> Result<(), PipelineError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            Err(PipelineError::DeadlineExceeded(next.description()))
        }
        _ => Ok(()),
    }
}

fn clamp_to_deadline(budget: Duration, deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => budget.min(deadline.saturating_duration_since(Instant::now())),
        None => budget,
    }
}

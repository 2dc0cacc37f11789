use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::extractors::{AudioFormat, VideoId};
use crate::storage::{BlobLocation, BlobStore};
use crate::utils::{random_token, sanitize_component};

pub mod aws;
pub mod processor;

pub use aws::AwsTranscribeService;

/// Default interval between job status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default budget for a job to reach a terminal state
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Plain transcript text, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript(String);

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// Provider-reported failure, reason kept verbatim
    #[error("{0}")]
    Failed(String),

    #[error("no terminal status after {} seconds", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("transcription service error: {0}")]
    Service(String),

    #[error("unreadable transcript: {0}")]
    InvalidDocument(String),
}

/// Provider-side state of a transcription job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed(String),
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed(_) => "failed",
        }
    }
}

/// What the service reports when polled
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub status: JobStatus,

    /// Where the provider says the result document is, if it says
    pub result_location: Option<BlobLocation>,
}

/// Parameters for starting a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub job_id: String,
    pub media: BlobLocation,
    pub media_format: AudioFormat,
    pub output: BlobLocation,
}

/// A job created for one request and polled until terminal
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub result_location: Option<BlobLocation>,
}

/// Job-based speech-to-text provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn start_job(&self, request: &JobRequest) -> crate::Result<()>;

    async fn job_status(&self, job_id: &str) -> crate::Result<JobSnapshot>;
}

/// Settings for submitting and awaiting jobs
#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    /// Bucket the provider writes result documents to
    pub output_bucket: String,

    /// Key prefix for result documents
    pub output_prefix: String,

    pub poll_interval: Duration,

    pub max_wait: Duration,
}

/// Submits transcription jobs and waits for their results
pub struct TranscriptionOrchestrator {
    service: Arc<dyn TranscriptionService>,
    store: Arc<dyn BlobStore>,
    settings: TranscriptionSettings,
}

impl TranscriptionOrchestrator {
    pub fn new(
        service: Arc<dyn TranscriptionService>,
        store: Arc<dyn BlobStore>,
        settings: TranscriptionSettings,
    ) -> Self {
        Self {
            service,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &TranscriptionSettings {
        &self.settings
    }

    /// Job names must not collide when the same video is requested concurrently
    pub fn job_name(video_id: &VideoId) -> String {
        format!(
            "transcribe-{}-{}",
            sanitize_component(video_id.as_str()),
            random_token()
        )
    }

    /// Start a job for audio already staged in durable storage
    pub async fn submit(
        &self,
        video_id: &VideoId,
        media: &BlobLocation,
        media_format: AudioFormat,
    ) -> Result<TranscriptionJob, TranscriptionError> {
        let job_id = Self::job_name(video_id);
        let output = BlobLocation::new(
            &self.settings.output_bucket,
            format!("{}{}.json", self.settings.output_prefix, job_id),
        );
        let request = JobRequest {
            job_id: job_id.clone(),
            media: media.clone(),
            media_format,
            output: output.clone(),
        };

        tracing::info!(%video_id, job_id = %job_id, "Starting transcription job");
        self.service
            .start_job(&request)
            .await
            .map_err(|e| TranscriptionError::Service(format!("{:#}", e)))?;

        Ok(TranscriptionJob {
            job_id,
            status: JobStatus::Pending,
            result_location: Some(output),
        })
    }

    /// Poll `job` until it completes, fails, or `max_wait` elapses.
    ///
    /// A timed-out job is left running on the provider side.
    pub async fn await_transcript(
        &self,
        job: &mut TranscriptionJob,
        max_wait: Duration,
    ) -> Result<Transcript, TranscriptionError> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let snapshot = self
                .service
                .job_status(&job.job_id)
                .await
                .map_err(|e| TranscriptionError::Service(format!("{:#}", e)))?;
            job.status = snapshot.status.clone();

            match snapshot.status {
                JobStatus::Completed => {
                    tracing::info!(
                        job_id = %job.job_id,
                        polls,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Transcription completed"
                    );
                    let location = job
                        .result_location
                        .clone()
                        .or(snapshot.result_location)
                        .ok_or_else(|| {
                            TranscriptionError::InvalidDocument("no result location".to_string())
                        })?;
                    return self.fetch_transcript(&location).await;
                }
                JobStatus::Failed(reason) => {
                    tracing::error!(job_id = %job.job_id, reason = %reason, "Transcription failed");
                    return Err(TranscriptionError::Failed(reason));
                }
                JobStatus::Pending | JobStatus::InProgress => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                tracing::warn!(
                    job_id = %job.job_id,
                    polls,
                    elapsed_secs = elapsed.as_secs(),
                    "Gave up waiting for transcription"
                );
                return Err(TranscriptionError::Timeout { waited: elapsed });
            }

            let wait = self.settings.poll_interval.min(max_wait - elapsed);
            tracing::debug!(
                job_id = %job.job_id,
                status = job.status.label(),
                check = polls,
                "Transcription still running"
            );
            sleep(wait).await;
        }
    }

    async fn fetch_transcript(&self, location: &BlobLocation) -> Result<Transcript, TranscriptionError> {
        let document = self
            .store
            .get(location)
            .await
            .map_err(|e| TranscriptionError::Service(format!("fetching result document: {}", e)))?;

        let processed = processor::process_document(&document)?;
        tracing::info!(
            characters = processed.transcript.as_str().chars().count(),
            words = processed.stats.word_count,
            confidence = processed.stats.average_confidence,
            "Transcript retrieved"
        );
        Ok(processed.transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockBlobStore, StorageError};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn settings() -> TranscriptionSettings {
        TranscriptionSettings {
            output_bucket: "transcripts".to_string(),
            output_prefix: "transcribe-output/".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    fn snapshot(status: JobStatus) -> crate::Result<JobSnapshot> {
        Ok(JobSnapshot {
            status,
            result_location: None,
        })
    }

    fn pending_job() -> TranscriptionJob {
        TranscriptionJob {
            job_id: "transcribe-abc-1234abcd".to_string(),
            status: JobStatus::Pending,
            result_location: Some(BlobLocation::new("transcripts", "transcribe-output/job.json")),
        }
    }

    const DOCUMENT: &str = r#"{
        "jobName": "transcribe-abc-1234abcd",
        "results": {
            "transcripts": [
                {"transcript": "  Hello and welcome."},
                {"transcript": "Today we talk about Rust.  "}
            ],
            "items": []
        },
        "status": "COMPLETED"
    }"#;

    #[test]
    fn test_job_names_are_unique_per_request() {
        let video_id = VideoId::for_tests("abc123");
        let first = TranscriptionOrchestrator::job_name(&video_id);
        let second = TranscriptionOrchestrator::job_name(&video_id);

        assert!(first.starts_with("transcribe-abc123-"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_submit_targets_designated_output() {
        let mut service = MockTranscriptionService::new();
        service
            .expect_start_job()
            .withf(|request| {
                request.media.uri() == "s3://raw/audio/abc123_ff.mp3"
                    && request.output.bucket == "transcripts"
                    && request.output.key == format!("transcribe-output/{}.json", request.job_id)
                    && request.media_format == AudioFormat::Mp3
            })
            .times(1)
            .returning(|_| Ok(()));

        let orchestrator = TranscriptionOrchestrator::new(
            Arc::new(service),
            Arc::new(MockBlobStore::new()),
            settings(),
        );
        let job = orchestrator
            .submit(
                &VideoId::for_tests("abc123"),
                &BlobLocation::new("raw", "audio/abc123_ff.mp3"),
                AudioFormat::Mp3,
            )
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.job_id.starts_with("transcribe-abc123-"));
    }

    #[tokio::test]
    async fn test_submit_failure_is_service_error() {
        let mut service = MockTranscriptionService::new();
        service
            .expect_start_job()
            .returning(|_| Err(anyhow::anyhow!("LimitExceededException")));

        let orchestrator = TranscriptionOrchestrator::new(
            Arc::new(service),
            Arc::new(MockBlobStore::new()),
            settings(),
        );
        let err = orchestrator
            .submit(
                &VideoId::for_tests("abc"),
                &BlobLocation::new("raw", "audio/abc.mp3"),
                AudioFormat::Mp3,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Service(msg) if msg.contains("LimitExceeded")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed_and_concatenates_in_order() {
        let mut service = MockTranscriptionService::new();
        let mut seq = Sequence::new();
        for status in [JobStatus::Pending, JobStatus::InProgress, JobStatus::Completed] {
            service
                .expect_job_status()
                .with(eq("transcribe-abc-1234abcd"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| snapshot(status.clone()));
        }

        let mut store = MockBlobStore::new();
        store
            .expect_get()
            .withf(|location| location.key == "transcribe-output/job.json")
            .times(1)
            .returning(|_| Ok(DOCUMENT.as_bytes().to_vec()));

        let orchestrator =
            TranscriptionOrchestrator::new(Arc::new(service), Arc::new(store), settings());
        let mut job = pending_job();
        let started = Instant::now();

        let transcript = orchestrator
            .await_transcript(&mut job, DEFAULT_MAX_WAIT)
            .await
            .unwrap();

        assert_eq!(transcript.as_str(), "Hello and welcome. Today we talk about Rust.");
        assert_eq!(job.status, JobStatus::Completed);
        // two sleeps of one poll interval between three checks
        assert!(started.elapsed() >= DEFAULT_POLL_INTERVAL * 2);
        assert!(started.elapsed() < DEFAULT_POLL_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_carries_reason_verbatim() {
        let mut service = MockTranscriptionService::new();
        service.expect_job_status().times(1).returning(|_| {
            snapshot(JobStatus::Failed(
                "The media format provided does not match the detected media format.".to_string(),
            ))
        });

        let orchestrator = TranscriptionOrchestrator::new(
            Arc::new(service),
            Arc::new(MockBlobStore::new()),
            settings(),
        );
        let err = orchestrator
            .await_transcript(&mut pending_job(), DEFAULT_MAX_WAIT)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "The media format provided does not match the detected media format."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_blocking_past_budget() {
        let mut service = MockTranscriptionService::new();
        service
            .expect_job_status()
            .returning(|_| snapshot(JobStatus::InProgress));

        let orchestrator = TranscriptionOrchestrator::new(
            Arc::new(service),
            Arc::new(MockBlobStore::new()),
            settings(),
        );
        let max_wait = Duration::from_secs(45);
        let started = Instant::now();

        let err = orchestrator
            .await_transcript(&mut pending_job(), max_wait)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Timeout { .. }));
        assert!(started.elapsed() >= max_wait);
        assert!(started.elapsed() <= max_wait + DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_error_is_service_error() {
        let mut service = MockTranscriptionService::new();
        service
            .expect_job_status()
            .returning(|_| Err(anyhow::anyhow!("ThrottlingException")));

        let orchestrator = TranscriptionOrchestrator::new(
            Arc::new(service),
            Arc::new(MockBlobStore::new()),
            settings(),
        );
        let err = orchestrator
            .await_transcript(&mut pending_job(), DEFAULT_MAX_WAIT)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Service(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_result_document() {
        let mut service = MockTranscriptionService::new();
        service
            .expect_job_status()
            .returning(|_| snapshot(JobStatus::Completed));
        let mut store = MockBlobStore::new();
        store.expect_get().returning(|_| Err(StorageError::NotFound));

        let orchestrator =
            TranscriptionOrchestrator::new(Arc::new(service), Arc::new(store), settings());
        let err = orchestrator
            .await_transcript(&mut pending_job(), DEFAULT_MAX_WAIT)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Object not found"));
    }
}

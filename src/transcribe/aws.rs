use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_transcribe::types::{
    LanguageCode, Media, MediaFormat, TranscriptionJobStatus,
};
use aws_sdk_transcribe::Client as TranscribeClient;
use url::Url;

use super::{JobRequest, JobSnapshot, JobStatus, TranscriptionService};
use crate::extractors::AudioFormat;
use crate::storage::BlobLocation;
use crate::Result;

/// [`TranscriptionService`] backed by AWS Transcribe batch jobs
pub struct AwsTranscribeService {
    client: TranscribeClient,
    language_code: Option<String>,
}

impl AwsTranscribeService {
    /// `language_code` of `None` enables automatic language identification
    pub fn new(sdk_config: &aws_config::SdkConfig, language_code: Option<String>) -> Self {
        Self {
            client: TranscribeClient::new(sdk_config),
            language_code,
        }
    }
}

fn media_format(format: AudioFormat) -> MediaFormat {
    match format {
        AudioFormat::Mp3 => MediaFormat::Mp3,
        AudioFormat::M4a => MediaFormat::Mp4,
        AudioFormat::Wav => MediaFormat::Wav,
        AudioFormat::Flac => MediaFormat::Flac,
        AudioFormat::Ogg => MediaFormat::Ogg,
        AudioFormat::Webm => MediaFormat::Webm,
    }
}

#[async_trait]
impl TranscriptionService for AwsTranscribeService {
    async fn start_job(&self, request: &JobRequest) -> Result<()> {
        let media = Media::builder().media_file_uri(request.media.uri()).build();

        let mut job_builder = self
            .client
            .start_transcription_job()
            .transcription_job_name(&request.job_id)
            .media_format(media_format(request.media_format))
            .media(media)
            .output_bucket_name(&request.output.bucket)
            .output_key(&request.output.key);

        if let Some(lang) = &self.language_code {
            tracing::debug!("Using specified language: {}", lang);
            job_builder = job_builder.language_code(LanguageCode::from(lang.as_str()));
        } else {
            tracing::debug!("Using automatic language detection");
            job_builder = job_builder.identify_language(true);
        }

        job_builder
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> Result<JobSnapshot> {
        let response = self
            .client
            .get_transcription_job()
            .transcription_job_name(job_id)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        let job = response
            .transcription_job()
            .context("Transcription job not found")?;

        let status = match job.transcription_job_status() {
            Some(TranscriptionJobStatus::Queued) | None => JobStatus::Pending,
            Some(TranscriptionJobStatus::InProgress) => JobStatus::InProgress,
            Some(TranscriptionJobStatus::Completed) => JobStatus::Completed,
            Some(TranscriptionJobStatus::Failed) => JobStatus::Failed(
                job.failure_reason().unwrap_or("Unknown error").to_string(),
            ),
            Some(other) => anyhow::bail!("Unexpected transcription job status: {}", other.as_str()),
        };

        let result_location = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .and_then(parse_transcript_uri);

        Ok(JobSnapshot {
            status,
            result_location,
        })
    }
}

/// Locate the bucket and key behind a transcript file URI.
///
/// Handles `s3://bucket/key`, path-style `https://s3.<region>.amazonaws.com/bucket/key`
/// and virtual-hosted `https://bucket.s3.<region>.amazonaws.com/key` forms.
pub fn parse_transcript_uri(uri: &str) -> Option<BlobLocation> {
    let parsed = Url::parse(uri).ok()?;
    let host = parsed.host_str()?;

    if parsed.scheme() == "s3" {
        let key = parsed.path().trim_start_matches('/');
        return (!key.is_empty()).then(|| BlobLocation::new(host, key));
    }

    if host.starts_with("s3.") || host.starts_with("s3-") {
        let (bucket, key) = parsed.path().trim_start_matches('/').split_once('/')?;
        return (!bucket.is_empty() && !key.is_empty()).then(|| BlobLocation::new(bucket, key));
    }

    let (bucket, _) = host.split_once(".s3.")?;
    let key = parsed.path().trim_start_matches('/');
    (!key.is_empty()).then(|| BlobLocation::new(bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() {
        assert_eq!(
            parse_transcript_uri("s3://transcripts/transcribe-output/job.json"),
            Some(BlobLocation::new("transcripts", "transcribe-output/job.json"))
        );
    }

    #[test]
    fn test_parse_path_style_uri() {
        assert_eq!(
            parse_transcript_uri(
                "https://s3.us-east-1.amazonaws.com/transcripts/transcribe-output/job.json"
            ),
            Some(BlobLocation::new("transcripts", "transcribe-output/job.json"))
        );
    }

    #[test]
    fn test_parse_virtual_hosted_uri() {
        assert_eq!(
            parse_transcript_uri("https://transcripts.s3.eu-west-1.amazonaws.com/out/job.json"),
            Some(BlobLocation::new("transcripts", "out/job.json"))
        );
    }

    #[test]
    fn test_parse_rejects_unrelated_uris() {
        assert_eq!(parse_transcript_uri("https://example.com/job.json"), None);
        assert_eq!(parse_transcript_uri("s3://bucket-only"), None);
        assert_eq!(parse_transcript_uri("not a uri"), None);
    }

    #[test]
    fn test_media_format_mapping() {
        assert_eq!(media_format(AudioFormat::Mp3), MediaFormat::Mp3);
        assert_eq!(media_format(AudioFormat::M4a), MediaFormat::Mp4);
    }
}

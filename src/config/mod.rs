use anyhow::{Context, Result};
use aws_config::Region;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extractors::acquirer::{AcquisitionStrategy, DEFAULT_ATTEMPT_TIMEOUT};
use crate::pipeline::{PipelineMode, PipelineSettings};
use crate::summarize::bedrock::DEFAULT_BEDROCK_MODEL;
use crate::summarize::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::summarize::SummarizerSettings;
use crate::transcribe::TranscriptionSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AWS configuration
    pub aws: AwsConfig,

    /// Audio download settings
    pub acquisition: AcquisitionConfig,

    /// Summary generation settings
    pub summarizer: SummarizerConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// Bucket for staged audio, emptied after each request
    pub raw_bucket: String,

    /// Bucket for transcripts and transcription result documents
    pub transcripts_bucket: String,

    /// Bucket for summaries
    pub summaries_bucket: String,

    /// Transcription job settings
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Language code; automatic identification when unset
    pub language_code: Option<String>,

    /// Key prefix for result documents in the transcripts bucket
    pub output_prefix: String,

    /// Seconds between job status checks
    pub poll_interval_secs: u64,

    /// Seconds to wait for a job before giving up
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Seconds a single download attempt may take
    pub attempt_timeout_secs: u64,

    /// Strategies tried in order
    pub strategies: Vec<AcquisitionStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizerProvider {
    /// OpenAI when an API key is configured, Bedrock otherwise
    #[default]
    Auto,
    Bedrock,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub provider: SummarizerProvider,

    /// Bedrock model identifier
    pub bedrock_model: String,

    /// OpenAI chat model
    pub openai_model: String,

    /// OpenAI API key (prefer the OPENAI_API_KEY environment variable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: String,

    /// Seconds an HTTP model request may take
    pub request_timeout_secs: u64,

    /// Upper bound on generated tokens
    pub max_tokens: u32,

    pub temperature: f32,

    pub top_p: f32,

    /// Transcript characters sent to the model
    pub prompt_char_limit: usize,

    /// Transcript characters quoted when generation fails
    pub fallback_excerpt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parent directory for per-request work directories
    pub temp_dir: Option<PathBuf>,

    /// `live` runs the full pipeline, `mock` returns canned results
    pub mode: PipelineMode,

    /// Transcript characters included in responses
    pub transcript_excerpt_chars: usize,

    /// Wall-clock ceiling for one request in seconds
    pub deadline_secs: Option<u64>,

    /// Also store a JSON record with request metadata
    pub persist_record: bool,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            raw_bucket: String::new(),
            transcripts_bucket: String::new(),
            summaries_bucket: String::new(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language_code: Some("en-US".to_string()),
            output_prefix: "transcribe-output/".to_string(),
            poll_interval_secs: 10,
            max_wait_secs: 300,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT.as_secs(),
            strategies: AcquisitionStrategy::defaults(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        let settings = SummarizerSettings::default();
        Self {
            provider: SummarizerProvider::Auto,
            bedrock_model: DEFAULT_BEDROCK_MODEL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            request_timeout_secs: 120,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            prompt_char_limit: settings.prompt_char_limit,
            fallback_excerpt_chars: settings.fallback_excerpt_chars,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            mode: PipelineMode::Live,
            transcript_excerpt_chars: 1000,
            deadline_secs: None,
            persist_record: false,
        }
    }
}

impl Config {
    /// Load configuration from file or create default, then apply environment overrides.
    ///
    /// The result is not validated; call [`Config::validate`] before running the pipeline.
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let config = Self::default();
            config.save().await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a configuration file without validating it
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        serde_yaml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("video-summarizer").join("config.yaml"))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
    }

    /// Override settings from variables named like the deployment environment's
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup("AWS_REGION") {
            self.aws.region = region;
        }
        if let Some(bucket) = lookup("RAW_BUCKET") {
            self.aws.raw_bucket = bucket;
        }
        if let Some(bucket) = lookup("TRANSCRIPTS_BUCKET") {
            self.aws.transcripts_bucket = bucket;
        }
        if let Some(bucket) = lookup("SUMMARIES_BUCKET") {
            self.aws.summaries_bucket = bucket;
        }
        if let Some(model) = lookup("BEDROCK_MODEL") {
            self.summarizer.bedrock_model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.summarizer.openai_api_key = Some(key);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, bucket) in [
            ("raw_bucket (RAW_BUCKET)", &self.aws.raw_bucket),
            ("transcripts_bucket (TRANSCRIPTS_BUCKET)", &self.aws.transcripts_bucket),
            ("summaries_bucket (SUMMARIES_BUCKET)", &self.aws.summaries_bucket),
        ] {
            if bucket.trim().is_empty() {
                anyhow::bail!("AWS {} must be configured", name);
            }
        }

        if self.acquisition.strategies.is_empty() {
            anyhow::bail!("At least one acquisition strategy must be configured");
        }
        if self.acquisition.attempt_timeout_secs == 0 {
            anyhow::bail!("acquisition.attempt_timeout_secs must be positive");
        }
        if self.aws.transcription.poll_interval_secs == 0 {
            anyhow::bail!("aws.transcription.poll_interval_secs must be positive");
        }
        if self.summarizer.prompt_char_limit == 0 || self.app.transcript_excerpt_chars == 0 {
            anyhow::bail!("Character limits must be positive");
        }
        if self.summarizer.provider == SummarizerProvider::OpenAi
            && self.summarizer.openai_api_key.is_none()
        {
            anyhow::bail!("The openai provider requires OPENAI_API_KEY");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  AWS Region: {}", self.aws.region);
        println!("  Raw Bucket: {}", self.aws.raw_bucket);
        println!("  Transcripts Bucket: {}", self.aws.transcripts_bucket);
        println!("  Summaries Bucket: {}", self.aws.summaries_bucket);
        println!(
            "  Language: {}",
            self.aws.transcription.language_code.as_deref().unwrap_or("auto")
        );
        println!(
            "  Strategies: {}",
            self.acquisition
                .strategies
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("  Summarizer: {:?}", self.summarizer.provider);
        println!("  Mode: {:?}", self.app.mode);
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.aws.region.clone())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition.attempt_timeout_secs)
    }

    /// Whether summaries should be generated with OpenAI rather than Bedrock
    pub fn uses_openai(&self) -> bool {
        match self.summarizer.provider {
            SummarizerProvider::OpenAi => true,
            SummarizerProvider::Bedrock => false,
            SummarizerProvider::Auto => self.summarizer.openai_api_key.is_some(),
        }
    }

    pub fn transcription_settings(&self) -> TranscriptionSettings {
        TranscriptionSettings {
            output_bucket: self.aws.transcripts_bucket.clone(),
            output_prefix: self.aws.transcription.output_prefix.clone(),
            poll_interval: Duration::from_secs(self.aws.transcription.poll_interval_secs),
            max_wait: Duration::from_secs(self.aws.transcription.max_wait_secs),
        }
    }

    pub fn summarizer_settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            prompt_char_limit: self.summarizer.prompt_char_limit,
            fallback_excerpt_chars: self.summarizer.fallback_excerpt_chars,
            max_tokens: self.summarizer.max_tokens,
            temperature: self.summarizer.temperature,
            top_p: self.summarizer.top_p,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            raw_bucket: self.aws.raw_bucket.clone(),
            transcripts_bucket: self.aws.transcripts_bucket.clone(),
            summaries_bucket: self.aws.summaries_bucket.clone(),
            temp_dir: self.app.temp_dir.clone(),
            transcript_excerpt_chars: self.app.transcript_excerpt_chars,
            deadline: self.app.deadline_secs.map(Duration::from_secs),
            persist_record: self.app.persist_record,
            mode: self.app.mode,
        }
    }
}

//! Ordered, multi-strategy audio acquisition.
//!
//! YouTube regularly blocks automated downloads, and which workaround helps
//! changes over time. [`StrategyAcquirer`] tries each configured
//! [`AcquisitionStrategy`] in order until one produces a non-empty audio file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{timeout, Instant};

use super::{AudioAcquirer, AudioArtifact, AudioFormat, VideoId};
use crate::utils::sanitize_component;

/// Default bound for a single download attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Desktop browser identity used by the header-spoofing strategy
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("no download strategies configured")]
    NoStrategies,

    #[error("{attempts} download attempt(s) failed, last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    /// The request deadline ran out before every strategy could be tried
    #[error("deadline reached after {attempts} download attempt(s), last error: {last_error}")]
    DeadlineReached { attempts: usize, last_error: String },
}

/// One way of invoking the downloader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionStrategy {
    /// Name used in logs
    pub name: String,

    /// yt-dlp format selector
    #[serde(default = "default_format_selector")]
    pub format_selector: String,

    /// Audio format to convert to
    #[serde(default)]
    pub audio_format: AudioFormat,

    /// yt-dlp audio quality (0 = best, 9 = worst)
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// User agent to present instead of yt-dlp's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Referer header to send
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Extractor arguments, e.g. `youtube:skip=dash,hls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_args: Option<String>,

    /// Additional raw arguments passed through unchanged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

fn default_format_selector() -> String {
    "bestaudio/best".to_string()
}

fn default_audio_quality() -> String {
    "0".to_string()
}

impl AcquisitionStrategy {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            format_selector: default_format_selector(),
            audio_format: AudioFormat::Mp3,
            audio_quality: default_audio_quality(),
            user_agent: None,
            referer: None,
            extractor_args: None,
            extra_args: Vec::new(),
        }
    }

    /// Strategies tried when none are configured: plain, browser headers,
    /// then skipping the adaptive stream manifests.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::named("minimal"),
            Self {
                user_agent: Some(BROWSER_USER_AGENT.to_string()),
                referer: Some("https://www.youtube.com/".to_string()),
                ..Self::named("browser-headers")
            },
            Self {
                extractor_args: Some("youtube:skip=dash,hls;player_skip=configs".to_string()),
                ..Self::named("skip-adaptive-streams")
            },
        ]
    }
}

/// Runs a single download attempt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadRunner: Send + Sync {
    /// Download audio for `url` so that it ends up at `output_path`
    async fn run(
        &self,
        url: &str,
        strategy: &AcquisitionStrategy,
        output_path: &Path,
    ) -> crate::Result<()>;
}

/// Tries strategies in order until one yields an audio file
pub struct StrategyAcquirer<R> {
    runner: R,
    strategies: Vec<AcquisitionStrategy>,
    attempt_timeout: Duration,
}

impl<R: DownloadRunner> StrategyAcquirer<R> {
    pub fn new(
        runner: R,
        strategies: Vec<AcquisitionStrategy>,
        attempt_timeout: Duration,
    ) -> Result<Self, AcquisitionError> {
        if strategies.is_empty() {
            return Err(AcquisitionError::NoStrategies);
        }

        Ok(Self {
            runner,
            strategies,
            attempt_timeout,
        })
    }

    /// Where an attempt is expected to leave its audio file
    pub fn output_path(work_dir: &Path, video_id: &VideoId, format: AudioFormat) -> PathBuf {
        work_dir.join(format!(
            "{}.{}",
            sanitize_component(video_id.as_str()),
            format.as_str()
        ))
    }

    /// Run one strategy, returning the produced file size or a diagnostic
    async fn attempt(
        &self,
        url: &str,
        strategy: &AcquisitionStrategy,
        output_path: &Path,
        limit: Duration,
    ) -> Result<u64, String> {
        remove_stale_output(output_path).await;

        match timeout(limit, self.runner.run(url, strategy, output_path)).await {
            Err(_) => Err(format!(
                "strategy '{}' timed out after {}s",
                strategy.name,
                limit.as_secs()
            )),
            Ok(Err(e)) => Err(format!("strategy '{}' failed: {:#}", strategy.name, e)),
            Ok(Ok(())) => non_empty_file_size(output_path).await.ok_or_else(|| {
                format!("strategy '{}' produced no audio file", strategy.name)
            }),
        }
    }
}

#[async_trait]
impl<R: DownloadRunner> AudioAcquirer for StrategyAcquirer<R> {
    async fn acquire(
        &self,
        url: &str,
        video_id: &VideoId,
        work_dir: &Path,
        deadline: Option<Instant>,
    ) -> Result<AudioArtifact, AcquisitionError> {
        let mut attempts = 0;
        let mut last_error = String::from("no attempt was started");

        for (index, strategy) in self.strategies.iter().enumerate() {
            let limit = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::warn!(%video_id, attempts, "Deadline reached, no further download attempts");
                        return Err(AcquisitionError::DeadlineReached {
                            attempts,
                            last_error,
                        });
                    }
                    self.attempt_timeout.min(remaining)
                }
                None => self.attempt_timeout,
            };

            attempts += 1;
            let output_path = Self::output_path(work_dir, video_id, strategy.audio_format);
            tracing::info!(
                %video_id,
                strategy = %strategy.name,
                attempt = index + 1,
                total = self.strategies.len(),
                "Trying download strategy"
            );

            match self.attempt(url, strategy, &output_path, limit).await {
                Ok(size_bytes) => {
                    tracing::info!(
                        %video_id,
                        strategy = %strategy.name,
                        size_bytes,
                        "Audio downloaded"
                    );
                    return Ok(AudioArtifact {
                        path: output_path,
                        format: strategy.audio_format,
                        strategy: strategy.name.clone(),
                        size_bytes,
                    });
                }
                Err(diagnostic) => {
                    tracing::warn!(%video_id, "{}", diagnostic);
                    last_error = diagnostic;
                }
            }
        }

        // The last attempt may have been cut short by the deadline rather than the source
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(AcquisitionError::DeadlineReached {
                attempts,
                last_error,
            });
        }

        Err(AcquisitionError::Exhausted {
            attempts,
            last_error,
        })
    }
}

/// Leftovers of a failed attempt must not be mistaken for the next one's output
async fn remove_stale_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed stale output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Could not remove {}: {}", path.display(), e),
    }
}

async fn non_empty_file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file() && metadata.len() > 0)
        .map(|metadata| metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Runner that fails every strategy except the ones named in `succeed`
    struct ScriptedRunner {
        succeed: Vec<&'static str>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DownloadRunner for ScriptedRunner {
        async fn run(
            &self,
            _url: &str,
            strategy: &AcquisitionStrategy,
            output_path: &Path,
        ) -> crate::Result<()> {
            self.calls.lock().unwrap().push(strategy.name.clone());
            if self.succeed.contains(&strategy.name.as_str()) {
                tokio::fs::write(output_path, b"ID3 audio bytes").await?;
                Ok(())
            } else {
                anyhow::bail!("HTTP Error 403: Forbidden")
            }
        }
    }

    fn strategies(names: &[&str]) -> Vec<AcquisitionStrategy> {
        names.iter().map(|name| AcquisitionStrategy::named(name)).collect()
    }

    #[test]
    fn test_empty_strategy_list_is_rejected() {
        let runner = MockDownloadRunner::new();
        let result = StrategyAcquirer::new(runner, Vec::new(), DEFAULT_ATTEMPT_TIMEOUT);
        assert!(matches!(result, Err(AcquisitionError::NoStrategies)));
    }

    #[test]
    fn test_default_strategies() {
        let defaults = AcquisitionStrategy::defaults();
        let names: Vec<_> = defaults.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["minimal", "browser-headers", "skip-adaptive-streams"]);
        assert!(defaults[1].user_agent.is_some());
        assert!(defaults[2].extractor_args.is_some());
    }

    #[tokio::test]
    async fn test_falls_back_in_order_until_success() {
        let work_dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = ScriptedRunner {
            succeed: vec!["third"],
            calls: calls.clone(),
        };
        let acquirer = StrategyAcquirer::new(
            runner,
            strategies(&["first", "second", "third"]),
            DEFAULT_ATTEMPT_TIMEOUT,
        )
        .unwrap();
        let video_id = VideoId::for_tests("abc123");

        let artifact = acquirer
            .acquire("https://youtu.be/abc123", &video_id, work_dir.path(), None)
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
        assert_eq!(artifact.strategy, "third");
        assert_eq!(artifact.path, work_dir.path().join("abc123.mp3"));
        assert!(artifact.size_bytes > 0);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let work_dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = ScriptedRunner {
            succeed: vec!["first", "second"],
            calls: calls.clone(),
        };
        let acquirer =
            StrategyAcquirer::new(runner, strategies(&["first", "second"]), DEFAULT_ATTEMPT_TIMEOUT)
                .unwrap();

        let artifact = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, "first");
        assert_eq!(*calls.lock().unwrap(), ["first"]);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let work_dir = TempDir::new().unwrap();
        let mut runner = MockDownloadRunner::new();
        let mut seq = Sequence::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(anyhow::anyhow!("Sign in to confirm you're not a bot")));
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(anyhow::anyhow!("HTTP Error 429: Too Many Requests")));

        let acquirer =
            StrategyAcquirer::new(runner, strategies(&["a", "b"]), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let err = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await
            .unwrap_err();

        match err {
            AcquisitionError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("429"));
                assert!(last_error.contains("'b'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_output_file_counts_as_failure() {
        let work_dir = TempDir::new().unwrap();
        let mut runner = MockDownloadRunner::new();
        runner.expect_run().times(2).returning(|_, _, _| Ok(()));

        let acquirer =
            StrategyAcquirer::new(runner, strategies(&["a", "b"]), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let err = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("produced no audio file"));
    }

    #[tokio::test]
    async fn test_empty_output_file_counts_as_failure() {
        let work_dir = TempDir::new().unwrap();
        let mut runner = MockDownloadRunner::new();
        runner.expect_run().times(1).returning(|_, _, path| {
            std::fs::write(path, b"")?;
            Ok(())
        });

        let acquirer =
            StrategyAcquirer::new(runner, strategies(&["only"]), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let result = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await;

        assert!(matches!(result, Err(AcquisitionError::Exhausted { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_stale_output_from_failed_attempt_is_discarded() {
        let work_dir = TempDir::new().unwrap();
        let mut runner = MockDownloadRunner::new();
        let mut seq = Sequence::new();
        // first attempt leaves a partial file behind and fails
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, path| {
                std::fs::write(path, b"partial")?;
                anyhow::bail!("connection reset")
            });
        // second attempt reports success without writing anything
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let acquirer =
            StrategyAcquirer::new(runner, strategies(&["a", "b"]), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let result = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await;

        assert!(result.is_err());
    }

    /// Runner whose first strategy hangs forever
    struct HangingRunner;

    #[async_trait]
    impl DownloadRunner for HangingRunner {
        async fn run(
            &self,
            _url: &str,
            strategy: &AcquisitionStrategy,
            output_path: &Path,
        ) -> crate::Result<()> {
            if strategy.name == "hangs" {
                std::future::pending::<()>().await;
            }
            tokio::fs::write(output_path, b"audio").await?;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_moves_on_to_next_strategy() {
        let work_dir = TempDir::new().unwrap();
        let acquirer = StrategyAcquirer::new(
            HangingRunner,
            strategies(&["hangs", "works"]),
            Duration::from_secs(300),
        )
        .unwrap();

        let started = Instant::now();
        let artifact = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), None)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, "works");
        assert!(started.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_further_attempts() {
        let work_dir = TempDir::new().unwrap();
        let acquirer = StrategyAcquirer::new(
            HangingRunner,
            strategies(&["hangs", "hangs", "works"]),
            Duration::from_secs(300),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(120);
        let err = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), Some(deadline))
            .await
            .unwrap_err();

        match err {
            AcquisitionError::DeadlineReached { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("timed out after 120s"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cutting_last_attempt_is_not_exhaustion() {
        let work_dir = TempDir::new().unwrap();
        let acquirer = StrategyAcquirer::new(
            HangingRunner,
            strategies(&["hangs"]),
            Duration::from_secs(300),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(45);
        let err = acquirer
            .acquire("url", &VideoId::for_tests("x"), work_dir.path(), Some(deadline))
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::DeadlineReached { attempts: 1, .. }));
        let err: crate::PipelineError = err.into();
        assert!(matches!(err, crate::PipelineError::DeadlineExceeded("audio acquisition")));
        assert!(!err.to_string().contains("blocking"));
    }
}

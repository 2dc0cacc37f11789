use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::acquirer::{AcquisitionStrategy, DownloadRunner};
use crate::Result;

/// Longest stderr tail kept as a diagnostic
const MAX_DIAGNOSTIC_CHARS: usize = 600;

/// Downloads audio by invoking yt-dlp as a subprocess
pub struct YtDlpRunner {
    yt_dlp_path: String,
}

impl YtDlpRunner {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Build the yt-dlp argument list for one strategy.
    ///
    /// yt-dlp picks the extension itself after conversion, so the output
    /// template swaps the expected extension for `%(ext)s`.
    pub fn build_args(url: &str, strategy: &AcquisitionStrategy, output_path: &Path) -> Vec<String> {
        let template = output_path.with_extension("%(ext)s");

        let mut args = vec![
            "--format".to_string(),
            strategy.format_selector.clone(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            strategy.audio_format.as_str().to_string(),
            "--audio-quality".to_string(),
            strategy.audio_quality.clone(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
        ];

        if let Some(user_agent) = &strategy.user_agent {
            args.push("--user-agent".to_string());
            args.push(user_agent.clone());
        }

        if let Some(referer) = &strategy.referer {
            args.push("--referer".to_string());
            args.push(referer.clone());
        }

        if let Some(extractor_args) = &strategy.extractor_args {
            args.push("--extractor-args".to_string());
            args.push(extractor_args.clone());
        }

        args.extend(strategy.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl DownloadRunner for YtDlpRunner {
    async fn run(&self, url: &str, strategy: &AcquisitionStrategy, output_path: &Path) -> Result<()> {
        let args = Self::build_args(url, strategy, output_path);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        // A timed-out attempt drops this future; the child must die with it
        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to launch {}: {}", self.yt_dlp_path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(MAX_DIAGNOSTIC_CHARS)
                .map(|(index, _)| index)
                .unwrap_or(0);
            anyhow::bail!("yt-dlp exited with {}: {}", output.status, &stderr[tail_start..]);
        }

        Ok(())
    }
}

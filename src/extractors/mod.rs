use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use url::Url;

pub mod acquirer;
pub mod youtube;

pub use acquirer::{AcquisitionError, AcquisitionStrategy, DownloadRunner, StrategyAcquirer};
pub use youtube::YtDlpRunner;

/// Canonical identifier of a YouTube video, derived from its URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the video identifier from a YouTube URL.
///
/// Long-form links (`youtube.com/watch?v=ID`) yield the first `v` query value,
/// short links (`youtu.be/ID`) yield the path. Anything else, including
/// unparseable input, yields `None`.
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    let parsed = Url::parse(url).ok()?;

    let id = match parsed.host_str()? {
        "www.youtube.com" | "youtube.com" if parsed.path() == "/watch" => parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())?,
        "youtu.be" => parsed
            .path()
            .strip_prefix('/')
            .unwrap_or_else(|| parsed.path())
            .to_string(),
        _ => return None,
    };

    if id.is_empty() {
        None
    } else {
        Some(VideoId(id))
    }
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Audio downloaded to the local work directory
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    /// Location of the audio file
    pub path: PathBuf,

    /// Container/codec of the file
    pub format: AudioFormat,

    /// Name of the strategy that produced the file
    pub strategy: String,

    /// File size in bytes
    pub size_bytes: u64,
}

/// Obtains the audio track of a video as a local file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioAcquirer: Send + Sync {
    /// Download audio for `url` into `work_dir`.
    ///
    /// The acquirer never removes `work_dir`; the caller owns it. Attempts do
    /// not start after `deadline`.
    async fn acquire(
        &self,
        url: &str,
        video_id: &VideoId,
        work_dir: &Path,
        deadline: Option<Instant>,
    ) -> Result<AudioArtifact, AcquisitionError>;
}

#[cfg(test)]
impl VideoId {
    pub(crate) fn for_tests(id: &str) -> Self {
        VideoId(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Option<String> {
        extract_video_id(url).map(|id| id.as_str().to_string())
    }

    #[test]
    fn test_long_form_urls() {
        assert_eq!(id("https://www.youtube.com/watch?v=abc123"), Some("abc123".into()));
        assert_eq!(id("https://youtube.com/watch?v=dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".into()));
        assert_eq!(
            id("https://www.youtube.com/watch?list=PL1&v=xyz&t=42s"),
            Some("xyz".into())
        );
        // first occurrence wins
        assert_eq!(id("https://www.youtube.com/watch?v=first&v=second"), Some("first".into()));
        // hosts are case-insensitive
        assert_eq!(id("https://WWW.YouTube.com/watch?v=abc"), Some("abc".into()));
    }

    #[test]
    fn test_short_form_urls() {
        assert_eq!(id("https://youtu.be/abc123"), Some("abc123".into()));
        assert_eq!(id("https://youtu.be/abc123?t=10"), Some("abc123".into()));
        assert_eq!(id("https://youtu.be/"), None);
        assert_eq!(id("https://youtu.be"), None);
    }

    #[test]
    fn test_rejected_urls() {
        assert_eq!(id("https://www.youtube.com/watch"), None);
        assert_eq!(id("https://www.youtube.com/watch?v="), None);
        assert_eq!(id("https://www.youtube.com/watch?list=PL1"), None);
        assert_eq!(id("https://www.youtube.com/embed/abc123"), None);
        assert_eq!(id("https://m.youtube.com/watch?v=abc123"), None);
        assert_eq!(id("https://vimeo.com/watch?v=abc123"), None);
        assert_eq!(id("https://twitter.com/user/status/123"), None);
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let inputs = [
            "",
            " ",
            "not a url",
            "youtube.com/watch?v=abc",
            "://",
            "https://",
            "http://[::1",
            "https://www.youtube.com/watch?v=%zz",
            "https://youtu.be/%F0%9F%92%A9",
            "mailto:someone@example.com",
            "file:///etc/passwd",
            "\u{0}\u{1}\u{2}",
            "https://www.youtube.com:99999/watch?v=abc",
            "ht!tp://youtube.com",
        ];

        for input in inputs {
            let _ = extract_video_id(input);
        }

        assert_eq!(id("not a url"), None);
        assert_eq!(id("youtube.com/watch?v=abc"), None);
    }

    #[test]
    fn test_generated_inputs_never_panic() {
        let alphabet = ['/', '?', '=', '&', '%', ':', '#', '@', '.', 'v', 'y', ' ', 'é'];
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..2000 {
            let mut input = String::from("https://youtu");
            for _ in 0..12 {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                input.push(alphabet[(state % alphabet.len() as u64) as usize]);
            }
            let _ = extract_video_id(&input);
        }
    }

    #[test]
    fn test_audio_format_serde() {
        let format: AudioFormat = serde_yaml::from_str("m4a").unwrap();
        assert_eq!(format, AudioFormat::M4a);
        assert_eq!(format.mime_type(), "audio/mp4");
        assert_eq!(AudioFormat::default().as_str(), "mp3");
    }
}

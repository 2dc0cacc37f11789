/// Marker appended to text that was cut short
pub const ELLIPSIS: &str = "...";

/// Return at most `max_chars` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Shorten `text` to `max_chars` characters, marking the cut with an ellipsis
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{}{}", truncated, ELLIPSIS)
    } else {
        text.to_string()
    }
}

/// Make a string safe to embed in storage keys, job names and file names.
///
/// AWS Transcribe job names only accept `[0-9a-zA-Z._-]`, so everything else
/// is replaced with an underscore.
pub fn sanitize_component(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .take(64)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Timestamp plus random suffix used to keep generated keys from colliding
pub fn unique_suffix() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let random_suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

    format!("{}_{}", timestamp, random_suffix)
}

/// Short random token for disambiguating names derived from the same video
pub fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path, "--version").await {
        missing.push(format!("{} - required for audio download", yt_dlp_path));
    }

    // yt-dlp shells out to ffmpeg for --extract-audio
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required for audio conversion".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "video-summarizer",
    about = "Video Summarizer - Transcribe and summarize YouTube videos with AWS",
    version,
    long_about = "Downloads the audio track of a YouTube video, transcribes it with AWS Transcribe, summarizes the transcript with a language model and stores transcript and summary in S3."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe and summarize a video
    Summarize {
        /// YouTube watch URL or youtu.be short link
        #[arg(value_name = "URL")]
        url: String,

        /// Address to associate with the request
        #[arg(short, long, env = "NOTIFY_EMAIL", value_name = "ADDRESS")]
        email: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Skip download, transcription and summarization and store canned results
        #[arg(long)]
        mock: bool,
    },

    /// Print the video identifier found in a URL
    ExtractId {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List configured download strategies
    Strategies,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Response JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use video_summarizer::cli::{Cli, Commands};
use video_summarizer::config::Config;
use video_summarizer::pipeline::{PipelineMode, PipelineOrchestrator, Request};
use video_summarizer::{extract_video_id, output, utils, PipelineResponse};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Summarize {
            url,
            email,
            output,
            format,
            mock,
        } => {
            // Bad requests are reported before any configuration is read or written
            let request = Request::new(url, email);
            if let Err(e) = request.video_id() {
                let response = PipelineResponse::failure(&e);
                output::print_to_console(&response, &format)?;
                return Ok(exit_code(&response));
            }

            let mut config = Config::load().await?;
            if mock {
                config.app.mode = PipelineMode::Mock;
            }
            config.validate().context("Invalid configuration")?;

            if config.app.mode == PipelineMode::Live {
                // Non-fatal: the tools may still be reachable at runtime
                let missing_deps = utils::check_dependencies(&config.acquisition.yt_dlp_path).await;
                if !missing_deps.is_empty() {
                    eprintln!("⚠️  Dependency check warnings:");
                    for dep in missing_deps {
                        eprintln!("   • {}", dep);
                    }
                    eprintln!("   (Continuing anyway - tools may be available)");
                }
            }

            let pipeline = PipelineOrchestrator::from_config(&config).await?;

            tracing::info!("Starting summarization for URL: {}", request.source_url);
            let spinner = (!cli.quiet).then(|| spinner("Processing video..."));
            let outcome = pipeline.run(&request).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            let response = PipelineResponse::from_outcome(&outcome);
            match output {
                Some(path) if response.is_success() => {
                    output::save_to_file(&response, &path, &format)?;
                    println!("Result saved to: {}", path.display());
                }
                _ => output::print_to_console(&response, &format)?,
            }

            Ok(exit_code(&response))
        }
        Commands::ExtractId { url } => match extract_video_id(&url) {
            Some(video_id) => {
                println!("{}", video_id);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Invalid YouTube URL");
                Ok(ExitCode::from(2))
            }
        },
        Commands::Config { show } => {
            let config = Config::load().await?;
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                if let Err(e) = config.validate() {
                    println!("Needs attention: {:#}", e);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Strategies => {
            let config = Config::load().await?;
            println!("Download strategies (tried in order):");
            for strategy in &config.acquisition.strategies {
                println!("  • {} (format: {})", strategy.name, strategy.format_selector);
            }
            println!(
                "Each attempt may take up to {} seconds.",
                config.acquisition.attempt_timeout_secs
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "video_summarizer=debug"
    } else {
        "video_summarizer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    // Logs go to stderr so stdout stays parseable
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn exit_code(response: &PipelineResponse) -> ExitCode {
    match response {
        PipelineResponse::Success(_) => ExitCode::SUCCESS,
        PipelineResponse::ClientFault(_) => ExitCode::from(2),
        PipelineResponse::ServerFault(_) => ExitCode::from(1),
    }
}

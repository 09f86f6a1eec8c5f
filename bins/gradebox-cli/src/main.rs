use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gradebox_common::config::SandboxConfig;
use gradebox_common::types::{RunRequest, Submission, SubmitRequest};
use gradebox_engine::{DockerSandbox, Grader};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "gradebox-cli")]
#[command(about = "Gradebox CLI - Grade untrusted code submissions in a sandbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission against sample test cases, full detail returned
    Run {
        /// Path to a JSON request file: { code, function_name, test_cases }
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Submit a submission against sample + hidden test cases
    Submit {
        /// Path to a JSON request file:
        /// { code, function_name, sample_test_cases, hidden_test_cases }
        #[arg(short, long)]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Bad requests are rejected before any sandbox is constructed, so a
    // malformed request never touches the Docker daemon.
    match cli.command {
        Commands::Run { request } => {
            let request: RunRequest = read_request(&request)?;
            let submission = validate(&request.code, &request.function_name)?;
            let grader = build_grader()?;
            let report = grader.run(&submission, &request.test_cases).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Submit { request } => {
            let request: SubmitRequest = read_request(&request)?;
            let submission = validate(&request.code, &request.function_name)?;
            let grader = build_grader()?;
            let report = grader
                .submit(
                    &submission,
                    &request.sample_test_cases,
                    &request.hidden_test_cases,
                )
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn build_grader() -> Result<Grader<DockerSandbox>> {
    let config = SandboxConfig::from_env()?;
    info!(image = %config.image, timeout_ms = config.timeout_ms, "Sandbox configured");
    let parallelism = config.max_parallel;
    let sandbox = DockerSandbox::new(config)?;
    Ok(Grader::with_parallelism(sandbox, parallelism))
}

fn read_request<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))
}

// Request-boundary contract: empty code or function name is a bad request,
// rejected before any sandbox is created.
fn validate(code: &str, function_name: &str) -> Result<Submission> {
    if code.is_empty() || function_name.is_empty() {
        bail!("Missing code or function_name");
    }
    Ok(Submission {
        source: code.to_string(),
        entry_point: function_name.to_string(),
    })
}

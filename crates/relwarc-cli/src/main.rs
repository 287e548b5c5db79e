//! Relwarc API client - command-line interface
//!
//! Usage:
//!   relwarc-api-client --api-token T analyze-source-file app.js   Analyze a JavaScript file
//!   relwarc-api-client --api-token T analyze-url https://site/    Analyze a page by URL
//!   relwarc-api-client --api-token T analyze-tar page.tar         Analyze a page tarball
//!   relwarc-api-client --api-token T submit url https://site/     Submit only, print the job id
//!   relwarc-api-client --api-token T watch 1234                   Stream a job's messages
//!
//! The analysis result goes to stdout as JSON, logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use relwarc_client::{
    ClientConfig, JobError, JobId, Payload, PayloadKind, RelwarcClient, StreamMessage,
    DEFAULT_SERVER_ADDR,
};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "relwarc-api-client")]
#[command(about = "Relwarc API client", long_about = None)]
#[command(version)]
struct Cli {
    /// Relwarc API server address
    #[arg(long, env = "RELWARC_SERVER_ADDR", default_value = DEFAULT_SERVER_ADDR)]
    server_addr: String,

    /// Relwarc API token
    #[arg(long, env = "RELWARC_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze JavaScript source code file
    AnalyzeSourceFile {
        /// Path to JavaScript source file to analyze
        file: PathBuf,
    },
    /// Analyze page given by URL
    AnalyzeUrl {
        /// URL to analyze
        url: String,
    },
    /// Analyze page packed as a TAR archive
    AnalyzeTar {
        /// Path to tar archive to analyze
        file: PathBuf,
    },
    /// Submit without waiting and print the job id
    Submit {
        #[arg(value_enum)]
        kind: InputKind,
        /// File path for source/tar, page URL for url
        input: String,
    },
    /// Follow a job and print every stream message as a JSON line
    Watch {
        /// All-digit ids are sent as numbers
        #[arg(value_parser = parse_job_id)]
        job_id: JobId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InputKind {
    Source,
    Url,
    Tar,
}

impl From<InputKind> for PayloadKind {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Source => PayloadKind::Source,
            InputKind::Url => PayloadKind::Url,
            InputKind::Tar => PayloadKind::Archive,
        }
    }
}

fn parse_job_id(s: &str) -> Result<JobId, std::convert::Infallible> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::for_server(cli.api_token, &cli.server_addr)
        .with_context(|| format!("Invalid server address {:?}", cli.server_addr))?;
    debug!(?config, "Client configured");
    let client = RelwarcClient::new(config)?;

    match cli.command {
        Commands::AnalyzeSourceFile { file } => {
            let result = client.analyze_source_code(open_payload(&file).await?).await?;
            print_json(&result, cli.pretty)?;
        }
        Commands::AnalyzeUrl { url } => {
            let result = client.analyze_page_url(url).await?;
            print_json(&result, cli.pretty)?;
        }
        Commands::AnalyzeTar { file } => {
            let result = client.analyze_page_tar(open_payload(&file).await?).await?;
            print_json(&result, cli.pretty)?;
        }
        Commands::Submit { kind, input } => {
            let job_id = match kind {
                InputKind::Url => client.submit(PayloadKind::Url, input).await?,
                InputKind::Source | InputKind::Tar => {
                    let payload = open_payload(Path::new(&input)).await?;
                    client.submit(kind.into(), payload).await?
                }
            };
            info!(%job_id, "Submitted");
            print_json(&serde_json::json!({ "job_id": job_id }), cli.pretty)?;
        }
        Commands::Watch { job_id } => {
            watch_job(&client, job_id, cli.pretty).await?;
        }
    }

    Ok(())
}

async fn watch_job(client: &RelwarcClient, job_id: JobId, pretty: bool) -> Result<()> {
    let mut messages = Box::pin(client.watch_job(&job_id).await?.into_stream());

    while let Some(message) = messages.next().await {
        let message = message?;
        print_json(&message.to_json(), pretty)?;
        if let StreamMessage::Error(error_message) = message {
            return Err(JobError { job_id, error_message }.into());
        }
    }
    Ok(())
}

async fn open_payload(path: &Path) -> Result<Payload> {
    Payload::from_file(path)
        .await
        .with_context(|| format!("Error opening file {:?}", path))
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Initialize logging based on log level
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}

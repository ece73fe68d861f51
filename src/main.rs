//! `http-assert` command line.
//!
//! ```text
//! http-assert probe <url>
//!     → config (file or defaults, then flag overrides)
//!     → Expect::request()            one logical request, retried per policy
//!     → Response::status()/...       assertions reported through the log
//!     → exit code 1 if any assertion failed
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Method;

use http_assert::chain::DefaultHandler;
use http_assert::config::{load_config, AssertConfig};
use http_assert::http::{Expect, StatusRange};
use http_assert::observability::init_logging;

#[derive(Parser)]
#[command(name = "http-assert")]
#[command(about = "Send HTTP requests with retries and check the responses", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request and assert on its status
    Probe {
        url: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Expected status code; any 2xx when omitted
        #[arg(short = 's', long)]
        expect_status: Option<u16>,

        /// Attempts including the first
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Overall deadline for all attempts
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AssertConfig::default(),
    };
    init_logging(&config.observability);

    match cli.command {
        Commands::Probe {
            url,
            method,
            expect_status,
            max_attempts,
            timeout_ms,
        } => {
            if let Some(attempts) = max_attempts {
                config.retries.max_attempts = attempts;
            }
            if let Some(ms) = timeout_ms {
                config.timeouts.total_ms = Some(ms);
            }
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;

            tracing::info!(
                method = %method,
                url = %url,
                max_attempts = config.retries.max_attempts,
                "Probing"
            );

            let expect = Expect::from_config(&config)?
                .with_handler(Arc::new(DefaultHandler::logging()));
            let mut response = expect.request(method, &url).expect().await;
            match expect_status {
                Some(status) => response.status(status),
                None => response.status_range(StatusRange::Success),
            };

            if let Some(raw) = response.raw() {
                println!(
                    "{} after {} attempt(s) in {:?}",
                    raw.status,
                    response.attempts(),
                    response
                        .chain()
                        .context()
                        .rtt
                        .unwrap_or(Duration::ZERO)
                );
            }

            if response.is_failed() || response.chain().descendant_failed() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

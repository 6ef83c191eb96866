//! promextd: the Prometheus extension daemon.
//!
//! Loads instance definitions, keeps the discovery cache fresh, and serves
//! the metric check and discovery endpoints.
//!
//! # Usage
//!
//! ```text
//! PROMEXT_INSTANCE_0_NAME=prom PROMEXT_INSTANCE_0_ORIGIN=http://localhost:9090 \
//!     promextd run --port 8087
//! promextd run --config /etc/promext.toml --log-format json
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,promextd=debug,promext=debug";

#[derive(Parser)]
#[command(name = "promextd", about = "Prometheus extension daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the extension API.
    Run {
        /// Port to listen on.
        #[arg(long, default_value = "8087")]
        port: u16,

        /// TOML settings file. Without it, settings come from PROMEXT_* variables.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,

        /// Upper bound on one metric query, retries included, in milliseconds.
        #[arg(long, default_value = "10000")]
        query_deadline_ms: u64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            port,
            config,
            log_format,
            query_deadline_ms,
        } => {
            init_tracing(log_format);
            serve::run(serve::Options {
                port,
                config,
                query_deadline: std::time::Duration::from_millis(query_deadline_ms),
            })
            .await
        }
    }
}

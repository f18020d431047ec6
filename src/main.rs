#![forbid(unsafe_code)]

//! Editor tool broker binary.
//!
//! Reads newline-delimited JSON requests from stdin, dispatches them to
//! registered handlers through a worker pool, and writes responses to
//! stdout. Diagnostics go to stderr only; stdout carries nothing but
//! protocol records.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use toolbus::config::{BrokerConfig, DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS};
use toolbus::dispatch::MethodRegistry;
use toolbus::{methods, supervisor, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "toolbus", about = "Editor tool broker", version, long_about = None)]
struct Cli {
    /// Maximum number of handlers executing concurrently.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Depth of the queue between the reader and the worker pool.
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// If greater than zero, emit a heartbeat response every N seconds on
    /// the reserved poll token.
    #[arg(long, default_value_t = 0)]
    poll: u64,

    /// Instance tag echoed in every response; generated when omitted.
    #[arg(long, default_value = "")]
    tag: String,

    /// Process the given request line(s) and exit instead of serving
    /// stdin. Implies --wait.
    #[arg(long = "do", value_name = "LINES")]
    do_lines: Option<String>,

    /// Wait for outstanding requests (which may be hanging forever) when
    /// exiting.
    #[arg(long)]
    wait: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("toolbus starting");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args));

    info!("toolbus exiting");
    result
}

async fn run(args: Cli) -> Result<()> {
    let mut registry = MethodRegistry::new();
    methods::register_builtins(&mut registry);
    let registry = Arc::new(registry);

    let tag = if args.tag.is_empty() {
        instance_tag()
    } else {
        args.tag
    };

    let single_shot = args.do_lines.is_some();
    let config = BrokerConfig {
        workers: args.workers,
        queue_depth: args.queue_depth,
        tag,
        heartbeat: (args.poll > 0).then(|| Duration::from_secs(args.poll)),
        decorate: !single_shot,
        wait: args.wait || single_shot,
        single_shot,
        ..BrokerConfig::default()
    };

    let served = match args.do_lines {
        Some(lines) => {
            let input = std::io::Cursor::new(lines.into_bytes());
            supervisor::run(config, registry, input, tokio::io::stdout()).await?
        }
        None => supervisor::run(config, registry, tokio::io::stdin(), tokio::io::stdout()).await?,
    };

    info!(served, "all requests drained");
    Ok(())
}

/// Generate a per-instance tag so a client multiplexing several brokers
/// can tell their responses apart.
fn instance_tag() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("toolbus-{}", &id[..8])
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

//! memc-load - installed-apps log loader

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memc_load::config::{
    RunConfig, ShardConfig, ShardSpec, DEFAULT_CHANNEL_CAPACITY, DEFAULT_PATTERN,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_TIMEOUT_MS, DEFAULT_WORKERS,
};
use memc_load::discovery::discover;
use memc_load::pipeline::Orchestrator;
use memc_load::selfcheck;
use memc_load::shard::ShardTable;
use memc_load_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "memc-load")]
#[command(author, version, about = "Load installed-apps logs into memcached shards")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input files (glob)
    #[arg(long, env = "MEMC_LOAD_PATTERN", default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// idfa shard address
    #[arg(long, env = "MEMC_LOAD_IDFA", default_value = "127.0.0.1:33013")]
    idfa: String,

    /// gaid shard address
    #[arg(long, env = "MEMC_LOAD_GAID", default_value = "127.0.0.1:33014")]
    gaid: String,

    /// adid shard address
    #[arg(long, env = "MEMC_LOAD_ADID", default_value = "127.0.0.1:33015")]
    adid: String,

    /// dvid shard address
    #[arg(long, env = "MEMC_LOAD_DVID", default_value = "127.0.0.1:33016")]
    dvid: String,

    /// Extra or overriding shard, NAME=HOST:PORT (repeatable)
    #[arg(long = "shard", value_name = "NAME=ADDR")]
    shards: Vec<ShardSpec>,

    /// Number of writer workers
    #[arg(short, long, env = "MEMC_LOAD_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Store operation timeout in milliseconds
    #[arg(long, env = "MEMC_LOAD_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout: u64,

    /// Write attempts per record
    #[arg(long, env = "MEMC_LOAD_RETRY", default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    retry: u32,

    /// Seconds to wait between write attempts
    #[arg(long, env = "MEMC_LOAD_DURATION", default_value_t = DEFAULT_RETRY_BACKOFF_SECS)]
    duration: u64,

    /// Log writes instead of performing them
    #[arg(long, env = "MEMC_LOAD_DRY_RUN")]
    dry_run: bool,

    /// Append logs to this file as well as stdout
    #[arg(long, env = "MEMC_LOAD_LOG")]
    log: Option<PathBuf>,

    /// Line and record channel capacity
    #[arg(long, env = "MEMC_LOAD_CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Round-trip the payload codec over built-in sample lines
    Selfcheck,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            workers: self.workers,
            timeout: Duration::from_millis(self.timeout),
            retry_attempts: self.retry,
            retry_backoff: Duration::from_secs(self.duration),
            dry_run: self.dry_run,
            channel_capacity: self.channel_capacity,
        }
    }

    fn shard_config(&self) -> ShardConfig {
        let builtin = [
            ShardSpec::new("idfa", &self.idfa),
            ShardSpec::new("gaid", &self.gaid),
            ShardSpec::new("adid", &self.adid),
            ShardSpec::new("dvid", &self.dvid),
        ];
        builtin.into_iter().chain(self.shards.iter().cloned()).collect()
    }

    fn log_config(&self) -> Result<LogConfig> {
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };

        let mut builder = LogConfig::builder().level(level).log_file_prefix("memc-load");
        if let Some(path) = &self.log {
            builder = builder.output(LogOutput::Both).log_file(path);
        }

        // LOG_* variables take precedence
        builder.build().merge_env()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _guard = init_logging(&cli.log_config()?)?;

    if let Some(Command::Selfcheck) = cli.command {
        let checked = selfcheck::run(&selfcheck::SAMPLE_LINES).context("Codec self-check failed")?;
        info!(lines = checked, "Codec self-check passed");
        return Ok(());
    }

    let config = cli.run_config();
    config.validate()?;
    let shard_config = cli.shard_config();
    shard_config.validate()?;

    let files = discover(&cli.pattern)?;
    let shards = Arc::new(ShardTable::connect(&shard_config, config.timeout));

    let report = Orchestrator::new(config, shards)
        .run(files)
        .await
        .context("Load aborted")?;

    info!(
        files = report.files,
        completed = report.completed,
        aborted = report.aborted,
        parsed = report.stats.parsed,
        failed = report.stats.failed,
        written = report.writes.written,
        write_failures = report.writes.failed,
        unknown_shard = report.writes.unknown_shard,
        "Load finished"
    );
    Ok(())
}

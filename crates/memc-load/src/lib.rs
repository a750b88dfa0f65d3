//! memc-load library
//!
//! Bulk-loads per-device installed-apps logs from gzip files into memcached
//! shards keyed by device type.
//!
//! # Pipeline
//!
//! - [`ingestor`]: one blocking reader per input file, feeding a shared line channel
//! - [`parser`]: the single parser stage and the run-wide error-rate verdict
//! - [`writer`]: the writer pool, with retries from [`retry`]
//! - [`pipeline`]: wiring and shutdown order
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use memc_load::config::{RunConfig, ShardConfig};
//! use memc_load::discovery::discover;
//! use memc_load::pipeline::Orchestrator;
//! use memc_load::shard::ShardTable;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::default();
//!     let shards = ShardTable::connect(&ShardConfig::with_defaults(), config.timeout);
//!     let files = discover("./[!.]*.tsv.gz")?;
//!
//!     let report = Orchestrator::new(config, Arc::new(shards)).run(files).await?;
//!     println!("{} records written", report.writes.written);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod codec;
pub mod config;
pub mod discovery;
pub mod ingestor;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod selfcheck;
pub mod shard;
pub mod store;
pub mod writer;

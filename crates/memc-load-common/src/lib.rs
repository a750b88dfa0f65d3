//! memc-load Common Library
//!
//! Shared error handling and logging for the memc-load workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the shared [`LoadError`] type and [`Result`] alias
//! - **Logging**: console/file/both tracing setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use memc_load_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("loader started");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{LoadError, Result};

//! Installed-apps line parser
//!
//! Each input line carries five tab-separated fields:
//!
//! ```text
//! dev_type \t dev_id \t lat \t lon \t app1,app2,...
//! idfa     \t 1rfw452y52g2gq4g \t 55.55 \t 42.42 \t 1423,43,567
//! ```
//!
//! A single [`RecordParser`] drains the shared line channel for the whole
//! run, so the error rate it reports covers every input file together.

use std::num::ParseFloatError;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::record::DeviceRecord;

/// Error rates below this value are considered an acceptable load.
pub const NORMAL_ERROR_RATE: f64 = 0.01;

const FIELD_COUNT: usize = 5;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Expected 5 tab-separated fields, got {0}")]
    FieldCount(usize),

    #[error("Device type is empty")]
    EmptyDeviceType,

    #[error("Device id is empty")]
    EmptyDeviceId,

    #[error("Invalid latitude {value:?}: {source}")]
    InvalidLat {
        value: String,
        source: ParseFloatError,
    },

    #[error("Invalid longitude {value:?}: {source}")]
    InvalidLon {
        value: String,
        source: ParseFloatError,
    },
}

/// Parse one raw line into a [`DeviceRecord`].
///
/// Whitespace other than tabs is trimmed from both ends of the line; tabs
/// are field separators, so a leading tab still yields an empty device type
/// and a trailing tab an empty apps field. App tokens that are not valid
/// `u32` values are skipped without failing the record.
pub fn parse_line(line: &str) -> Result<DeviceRecord, ParseError> {
    let line = line.trim_matches(|c: char| c.is_whitespace() && c != '\t');
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount(fields.len()));
    }

    let (dev_type, dev_id) = (fields[0], fields[1]);
    if dev_type.is_empty() {
        return Err(ParseError::EmptyDeviceType);
    }
    if dev_id.is_empty() {
        return Err(ParseError::EmptyDeviceId);
    }

    let lat = fields[2].parse::<f64>().map_err(|source| ParseError::InvalidLat {
        value: fields[2].to_string(),
        source,
    })?;
    let lon = fields[3].parse::<f64>().map_err(|source| ParseError::InvalidLon {
        value: fields[3].to_string(),
        source,
    })?;

    let apps = fields[4]
        .split(',')
        .filter_map(|token| token.parse::<u32>().ok())
        .collect();

    Ok(DeviceRecord {
        dev_type: dev_type.to_string(),
        dev_id: dev_id.to_string(),
        lat,
        lon,
        apps,
    })
}

// ============================================================================
// Run statistics and verdict
// ============================================================================

/// Accept/reject counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub parsed: u64,
    pub failed: u64,
}

impl RunStats {
    pub fn total(&self) -> u64 {
        self.parsed + self.failed
    }

    /// `failed / (failed + parsed)`, or `None` when no line was seen.
    pub fn error_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.failed as f64 / total as f64),
        }
    }
}

/// Data-quality verdict for a run. Informational only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// No lines were seen, so no rate exists
    NoInput,
    Acceptable { rate: f64 },
    HighErrorRate { rate: f64 },
}

impl Verdict {
    pub fn evaluate(stats: &RunStats) -> Self {
        match stats.error_rate() {
            None => Verdict::NoInput,
            Some(rate) if rate < NORMAL_ERROR_RATE => Verdict::Acceptable { rate },
            Some(rate) => Verdict::HighErrorRate { rate },
        }
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, Verdict::Acceptable { .. })
    }

    fn log(&self, stats: &RunStats) {
        match self {
            Verdict::NoInput => warn!("No lines were read, error rate is undefined"),
            Verdict::Acceptable { rate } => info!(
                rate = *rate,
                parsed = stats.parsed,
                failed = stats.failed,
                "Acceptable error rate. Successful load"
            ),
            Verdict::HighErrorRate { rate } => error!(
                rate = *rate,
                threshold = NORMAL_ERROR_RATE,
                parsed = stats.parsed,
                failed = stats.failed,
                "High error rate. Failed load"
            ),
        }
    }
}

/// What the parser stage reports once the line channel is closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseSummary {
    pub stats: RunStats,
    pub verdict: Verdict,
}

// ============================================================================
// Parser stage
// ============================================================================

/// The single parser stage between the line channel and the record channel
pub struct RecordParser {
    lines: mpsc::Receiver<String>,
    records: mpsc::Sender<DeviceRecord>,
    stats: RunStats,
}

impl RecordParser {
    pub fn new(lines: mpsc::Receiver<String>, records: mpsc::Sender<DeviceRecord>) -> Self {
        Self {
            lines,
            records,
            stats: RunStats::default(),
        }
    }

    /// Drain the line channel until every sender is gone.
    ///
    /// Dropping `self` at the end closes the record channel, which lets the
    /// writer pool finish.
    pub async fn run(mut self) -> ParseSummary {
        let mut writers_gone = false;

        while let Some(line) = self.lines.recv().await {
            match parse_line(&line) {
                Ok(record) => {
                    self.stats.parsed += 1;
                    if writers_gone {
                        continue;
                    }
                    if self.records.send(record).await.is_err() {
                        error!("Record channel closed, remaining records will be dropped");
                        writers_gone = true;
                    }
                },
                Err(e) => {
                    self.stats.failed += 1;
                    warn!(error = %e, line = %line.trim_end(), "Failed to parse line");
                },
            }
        }

        let verdict = Verdict::evaluate(&self.stats);
        debug!(parsed = self.stats.parsed, failed = self.stats.failed, "Line channel drained");
        verdict.log(&self.stats);

        ParseSummary {
            stats: self.stats,
            verdict,
        }
    }
}

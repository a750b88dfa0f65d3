//! Codec self-check
//!
//! Parses a couple of known lines, encodes them and decodes them back,
//! failing on the first mismatch. Runs without any store or input files.

use memc_load_common::{LoadError, Result};
use tracing::info;

use crate::codec;
use crate::parser::parse_line;

pub const SAMPLE_LINES: [&str; 2] = [
    "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23",
    "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424",
];

/// Round-trip every line in `lines`. Returns how many were checked.
pub fn run(lines: &[&str]) -> Result<usize> {
    for line in lines {
        let record = parse_line(line).map_err(|e| LoadError::Parse(format!("{}: {:?}", e, line)))?;
        let bytes = codec::encode(&record);
        let decoded = codec::decode(&bytes).map_err(|e| LoadError::Codec(e.to_string()))?;

        let same_coords = decoded.lat.map(f64::to_bits) == Some(record.lat.to_bits())
            && decoded.lon.map(f64::to_bits) == Some(record.lon.to_bits());
        if !same_coords || decoded.apps != record.apps {
            return Err(LoadError::Codec(format!(
                "round trip mismatch for {}: got {:?}",
                record.store_key(),
                decoded
            )));
        }

        info!(key = %record.store_key(), bytes = bytes.len(), "Round trip ok");
    }

    Ok(lines.len())
}

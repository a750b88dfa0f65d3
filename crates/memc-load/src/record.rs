//! Device record model

use serde::{Deserialize, Serialize};

/// One parsed line of an installed-apps log.
///
/// `dev_type` and `dev_id` are never empty; the parser rejects such lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device type, selects the shard
    pub dev_type: String,

    /// Device identifier within the shard
    pub dev_id: String,

    pub lat: f64,
    pub lon: f64,

    /// Installed application ids in input order, duplicates kept
    pub apps: Vec<u32>,
}

impl DeviceRecord {
    /// Store key in the form `<dev_type>:<dev_id>`
    pub fn store_key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key() {
        let record = DeviceRecord {
            dev_type: "idfa".to_string(),
            dev_id: "1rfw452y52g2gq4g".to_string(),
            lat: 55.55,
            lon: 42.42,
            apps: vec![1423, 43],
        };
        assert_eq!(record.store_key(), "idfa:1rfw452y52g2gq4g");
    }
}

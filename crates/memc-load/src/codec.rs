//! Payload codec
//!
//! Values are stored as the `UserApps` protobuf message:
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1;
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```

use prost::Message;

use crate::record::DeviceRecord;

/// Serialized form of a device's coordinates and installed apps
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,

    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,

    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl From<&DeviceRecord> for UserApps {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: Some(record.lat),
            lon: Some(record.lon),
        }
    }
}

/// Serialize `{lat, lon, apps}` of a record.
pub fn encode(record: &DeviceRecord) -> Vec<u8> {
    UserApps::from(record).encode_to_vec()
}

/// Deserialize a stored payload.
pub fn decode(bytes: &[u8]) -> Result<UserApps, prost::DecodeError> {
    UserApps::decode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(lat: f64, lon: f64, apps: Vec<u32>) -> DeviceRecord {
        DeviceRecord {
            dev_type: "idfa".to_string(),
            dev_id: "1rfw452y52g2gq4g".to_string(),
            lat,
            lon,
            apps,
        }
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let original = record(55.55, 42.42, vec![1423, 43, 567, 3, 7, 23, 43]);
        let decoded = decode(&encode(&original)).unwrap();

        assert_eq!(decoded.lat.map(f64::to_bits), Some(original.lat.to_bits()));
        assert_eq!(decoded.lon.map(f64::to_bits), Some(original.lon.to_bits()));
        assert_eq!(decoded.apps, original.apps);
    }

    #[test]
    fn test_round_trip_edge_floats_and_empty_apps() {
        let original = record(-0.0, f64::MIN_POSITIVE, Vec::new());
        let decoded = decode(&encode(&original)).unwrap();

        assert_eq!(decoded.lat.unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(decoded.lon.unwrap().to_bits(), f64::MIN_POSITIVE.to_bits());
        assert!(decoded.apps.is_empty());
    }

    #[test]
    fn test_apps_are_not_packed() {
        // tag 1, varint wire type, then value 7
        let bytes = encode(&record(0.0, 0.0, vec![7]));
        assert_eq!(&bytes[..2], &[0x08, 0x07]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(&[0xff, 0xff, 0xff]).is_err());
    }
}

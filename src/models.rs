//! Domain types for vessel position reports

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::ValidationError;

/// Maritime Mobile Service Identity (MMSI)
///
/// A nine-digit number identifying a vessel. Kept as text so that leading
/// zeros survive and lexical order matches numeric order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mmsi(String);

impl Mmsi {
    pub const LEN: usize = 9;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a value read back from the store, which only ever holds validated ids
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl TryFrom<&str> for Mmsi {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() == Self::LEN && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::single("mmsi"))
        }
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Mmsi {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Navigational status lookup row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Status {
    pub id: i64,
    pub name: String,
}

/// Lowest and highest valid status ids
pub const STATUS_ID_RANGE: std::ops::RangeInclusive<i64> = 1..=15;

/// AIS heading value meaning "not available"
pub const HEADING_NOT_AVAILABLE: f64 = 511.0;

/// One observed position of one vessel at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct VesselReport {
    pub id: i64,
    pub mmsi: Mmsi,
    pub name: String,
    pub status_id: i64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub sog: f64,
    pub cog: f64,
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
}

/// A validated report waiting to be written
#[derive(Debug, Clone, PartialEq)]
pub struct VesselReportInput {
    pub mmsi: Mmsi,
    pub name: String,
    pub status_id: i64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub sog: f64,
    pub cog: f64,
    pub heading: f64,
    pub timestamp: DateTime<Utc>,
}

/// Latest report of a vessel together with the size of its history
#[derive(Debug, Clone, PartialEq)]
pub struct LatestReport {
    pub report: VesselReport,
    pub position_count: i64,
}

/// Whether an ingested report created a new row or moved an existing vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    Inserted,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmsi_requires_nine_digits() {
        assert!(Mmsi::try_from("123456789").is_ok());
        assert!(Mmsi::try_from("012345678").is_ok());
        assert!(Mmsi::try_from("12345").is_err());
        assert!(Mmsi::try_from("1234567890").is_err());
        assert!(Mmsi::try_from("12345678a").is_err());
        assert!(Mmsi::try_from(" 12345678").is_err());
    }

    #[test]
    fn test_mmsi_error_names_field() {
        let err = Mmsi::try_from("abc").unwrap_err();
        assert_eq!(err.fields, vec!["mmsi".to_string()]);
    }

    #[test]
    fn test_mmsi_serializes_as_string() {
        let mmsi = Mmsi::try_from("230123456").unwrap();
        assert_eq!(serde_json::to_string(&mmsi).unwrap(), "\"230123456\"");
    }
}

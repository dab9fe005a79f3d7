//! Validation and storage of externally submitted vessel reports

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::db::Database;
use crate::error::{Result, ValidationError};
use crate::models::{
    IngestOutcome, Mmsi, VesselReportInput, HEADING_NOT_AVAILABLE, STATUS_ID_RANGE,
};

/// Naive formats accepted for `timestamp`, read as UTC
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Raw form submission. Every field is required; they are optional here so
/// that all missing ones can be reported at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportForm {
    pub name: Option<String>,
    #[serde(rename = "statusId", alias = "status_id")]
    pub status_id: Option<String>,
    pub mmsi: Option<String>,
    pub length: Option<String>,
    pub width: Option<String>,
    pub draft: Option<String>,
    pub timestamp: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub cog: Option<String>,
    pub heading: Option<String>,
    pub sog: Option<String>,
}

/// Collects failing field names without duplicates
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn add(&mut self, field: &str) {
        if !self.contains(field) {
            self.0.push(field.to_string());
        }
    }

    fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|f| f == field)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl ReportForm {
    fn required(&self) -> [(&'static str, &Option<String>); 12] {
        [
            ("name", &self.name),
            ("statusId", &self.status_id),
            ("mmsi", &self.mmsi),
            ("length", &self.length),
            ("width", &self.width),
            ("draft", &self.draft),
            ("timestamp", &self.timestamp),
            ("latitude", &self.latitude),
            ("longitude", &self.longitude),
            ("cog", &self.cog),
            ("heading", &self.heading),
            ("sog", &self.sog),
        ]
    }

    /// Check every field and build a storable report.
    ///
    /// Checks run as presence, status id, MMSI format, then numeric and
    /// timestamp parsing; the error lists each failing field once.
    pub fn validate(&self) -> Result<VesselReportInput, ValidationError> {
        let mut violations = Violations::default();

        for (field, value) in self.required() {
            if present(value).is_none() {
                violations.add(field);
            }
        }

        let status_id = present(&self.status_id)
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|id| STATUS_ID_RANGE.contains(id));
        if status_id.is_none() {
            violations.add("statusId");
        }

        let mmsi = present(&self.mmsi).and_then(|v| Mmsi::try_from(v).ok());
        if mmsi.is_none() {
            violations.add("mmsi");
        }

        let mut number = |field: &str, value: &Option<String>, valid: fn(f64) -> bool| {
            let parsed = present(value).and_then(parse_number).filter(|v| valid(*v));
            if parsed.is_none() {
                violations.add(field);
            }
            parsed
        };
        let length = number("length", &self.length, |v| v >= 0.0);
        let width = number("width", &self.width, |v| v >= 0.0);
        let draft = number("draft", &self.draft, |v| v >= 0.0);
        let latitude = number("latitude", &self.latitude, |v| (-90.0..=90.0).contains(&v));
        let longitude = number("longitude", &self.longitude, |v| {
            (-180.0..=180.0).contains(&v)
        });
        let cog = number("cog", &self.cog, |v| (0.0..360.0).contains(&v));
        let heading = number("heading", &self.heading, |v| {
            (0.0..=360.0).contains(&v) || v == HEADING_NOT_AVAILABLE
        });
        let sog = number("sog", &self.sog, |v| v >= 0.0);

        let timestamp = present(&self.timestamp).and_then(parse_timestamp);
        if timestamp.is_none() {
            violations.add("timestamp");
        }

        match (
            present(&self.name),
            status_id,
            mmsi,
            length,
            width,
            draft,
            latitude,
            longitude,
            cog,
            heading,
            sog,
            timestamp,
        ) {
            (
                Some(name),
                Some(status_id),
                Some(mmsi),
                Some(length),
                Some(width),
                Some(draft),
                Some(latitude),
                Some(longitude),
                Some(cog),
                Some(heading),
                Some(sog),
                Some(timestamp),
            ) if violations.0.is_empty() => Ok(VesselReportInput {
                mmsi,
                name: name.to_string(),
                status_id,
                length,
                width,
                draft,
                latitude,
                longitude,
                sog,
                cog,
                heading,
                timestamp,
            }),
            _ => Err(ValidationError {
                fields: violations.0,
            }),
        }
    }
}

/// Validate a submission and write it, inserting or updating by MMSI
pub async fn ingest(db: &Database, form: &ReportForm) -> Result<(IngestOutcome, i64)> {
    let report = form.validate()?;
    let (outcome, id) = db.upsert_report(&report).await?;

    info!(mmsi = %report.mmsi, ?outcome, id, "Vessel report ingested");
    Ok((outcome, id))
}

//! Prediction boundary
//!
//! Vessel type, trajectory and cluster predictions come from external
//! scripts. The rest of the service only sees the [`Predictor`] trait, so the
//! script runner can be swapped for a fake in tests.

mod script;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ValidationError;
use crate::models::Mmsi;

pub use script::ScriptPredictor;

/// Why an external prediction could not be used.
///
/// Variants that saw output keep it for diagnostics; it is logged, never
/// returned to clients.
#[derive(Debug, Error)]
pub enum ExternalProcessError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    #[error("{program} produced no output")]
    EmptyOutput { program: String },

    #[error("unparseable output from {program}: {reason}")]
    Malformed {
        program: String,
        reason: String,
        output: String,
    },

    #[error("{program} reported an error: {message}")]
    Rejected {
        program: String,
        message: String,
        output: String,
    },
}

impl ExternalProcessError {
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. }
            | Self::Malformed { output, .. }
            | Self::Rejected { output, .. } => Some(output),
            Self::Spawn { .. } | Self::EmptyOutput { .. } => None,
        }
    }
}

/// Static attributes the type classifier works from
#[derive(Debug, Clone, PartialEq)]
pub struct TypeQuery {
    pub status_id: i64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
}

/// Loosely typed type-prediction input as sent by map clients.
///
/// Each value may be a number, a numeric string, or `"N/A"` (read as zero).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeAttributes {
    #[serde(alias = "statusId", alias = "status")]
    pub status_label: Option<Value>,
    pub length: Option<Value>,
    pub width: Option<Value>,
    pub draft: Option<Value>,
}

fn lenient_number(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim() == "N/A" => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

impl TryFrom<TypeAttributes> for TypeQuery {
    type Error = ValidationError;

    fn try_from(attrs: TypeAttributes) -> Result<Self, Self::Error> {
        let fields = [
            ("status_label", lenient_number(&attrs.status_label)),
            ("length", lenient_number(&attrs.length)),
            ("width", lenient_number(&attrs.width)),
            ("draft", lenient_number(&attrs.draft)),
        ];
        let invalid: Vec<String> = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !invalid.is_empty() {
            return Err(ValidationError { fields: invalid });
        }

        let [status, length, width, draft] = fields.map(|(_, v)| v.unwrap_or_default());
        Ok(Self {
            status_id: status.trunc() as i64,
            length,
            width,
            draft,
        })
    }
}

/// Minutes ahead a trajectory forecast may look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon(u32);

impl Horizon {
    pub const ALLOWED: [u32; 3] = [5, 10, 15];

    pub fn minutes(&self) -> u32 {
        self.0
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u32> for Horizon {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&minutes) {
            Ok(Self(minutes))
        } else {
            Err(ValidationError::single("horizon"))
        }
    }
}

/// Instantaneous motion used to place a vessel in a behaviour cluster
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClusterQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub sog: f64,
    pub cog: f64,
}

impl ClusterQuery {
    pub const MAX_SOG: f64 = 50.0;

    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks = [
            ("latitude", (-90.0..=90.0).contains(&self.latitude)),
            ("longitude", (-180.0..=180.0).contains(&self.longitude)),
            ("sog", (0.0..=Self::MAX_SOG).contains(&self.sog)),
            ("cog", (0.0..360.0).contains(&self.cog)),
        ];
        let fields: Vec<String> = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.to_string())
            .collect();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { fields })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionRequest {
    VesselType(TypeQuery),
    Trajectory { mmsi: Mmsi, horizon: Horizon },
    Cluster(ClusterQuery),
    ClusterAll,
}

/// A position reported by the trajectory forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, alias = "estimated_speed")]
    pub speed: Option<f64>,
    #[serde(default, alias = "estimated_course")]
    pub course: Option<f64>,
    #[serde(default, alias = "predicted_time")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryForecast {
    pub mmsi: Mmsi,
    pub vessel_name: Option<String>,
    pub horizon_minutes: u32,
    pub current_position: PositionFix,
    pub predicted_position: PositionFix,
    pub confidence: Option<String>,
    pub distance_km: Option<f64>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// One vessel (or ad-hoc point) and the cluster it was assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    #[serde(deserialize_with = "string_or_number")]
    pub mmsi: String,
    pub lat: f64,
    pub lon: f64,
    pub cluster: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Prediction {
    /// Predicted vessel type, keyed by model name
    VesselType { predictions: BTreeMap<String, String> },
    Trajectory { forecast: TrajectoryForecast },
    Clusters { clusters: Vec<ClusterAssignment> },
}

/// Something that can answer prediction requests.
///
/// Calls complete before returning; there is no retry.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, ExternalProcessError>;
}

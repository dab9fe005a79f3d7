//! Runs the prediction scripts as child processes and parses what they print

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{
    ClusterAssignment, ExternalProcessError, PositionFix, Prediction, PredictionRequest,
    Predictor, TrajectoryForecast,
};
use crate::config::PredictionConfig;
use crate::models::Mmsi;

const RESULTS_START: &str = "=== RÉSULTATS DE PRÉDICTION ===";
const RESULTS_END: &str = "=== FIN RÉSULTATS ===";
const SINGLE_RESULT_PREFIX: &str = "Type de navire prédit:";

pub struct ScriptPredictor {
    config: PredictionConfig,
}

impl ScriptPredictor {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    /// Run `script` with `args` and return its standard output.
    ///
    /// A non-zero exit keeps both output streams on the error.
    async fn run(&self, script: &str, args: &[String]) -> Result<String, ExternalProcessError> {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        debug!(interpreter = %self.config.interpreter, script, ?args, "Running prediction script");

        let output = command
            .output()
            .await
            .map_err(|source| ExternalProcessError::Spawn {
                program: script.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalProcessError::Failed {
                program: script.to_string(),
                status: output.status.to_string(),
                output: format!("{stdout}{stderr}"),
            });
        }
        if stdout.trim().is_empty() {
            return Err(ExternalProcessError::EmptyOutput {
                program: script.to_string(),
            });
        }

        Ok(stdout)
    }
}

fn program_name(script: &str) -> String {
    Path::new(script)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.to_string())
}

#[async_trait]
impl Predictor for ScriptPredictor {
    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, ExternalProcessError> {
        let result = match request {
            PredictionRequest::VesselType(query) => {
                let script = &self.config.type_script;
                let args = vec![
                    "--status".to_string(),
                    query.status_id.to_string(),
                    "--length".to_string(),
                    format!("{:.2}", query.length),
                    "--width".to_string(),
                    format!("{:.2}", query.width),
                    "--draft".to_string(),
                    format!("{:.2}", query.draft),
                    "--model".to_string(),
                    "all".to_string(),
                ];
                let output = self.run(script, &args).await?;
                parse_type_output(&program_name(script), &output)
                    .map(|predictions| Prediction::VesselType { predictions })
            }
            PredictionRequest::Trajectory { mmsi, horizon } => {
                let script = &self.config.trajectory_script;
                let args = vec![mmsi.to_string(), horizon.minutes().to_string()];
                let output = self.run(script, &args).await?;
                parse_trajectory_output(&program_name(script), mmsi, horizon.minutes(), &output)
                    .map(|forecast| Prediction::Trajectory { forecast })
            }
            PredictionRequest::Cluster(query) => {
                let script = &self.config.cluster_script;
                let args = vec![
                    query.latitude.to_string(),
                    query.longitude.to_string(),
                    query.sog.to_string(),
                    query.cog.to_string(),
                ];
                let output = self.run(script, &args).await?;
                parse_cluster_output(&program_name(script), &output)
                    .map(|clusters| Prediction::Clusters { clusters })
            }
            PredictionRequest::ClusterAll => {
                let script = &self.config.cluster_all_script;
                let output = self.run(script, &[]).await?;
                parse_cluster_output(&program_name(script), &output)
                    .map(|clusters| Prediction::Clusters { clusters })
            }
        };

        if let Err(e) = &result {
            warn!(error = %e, output = e.raw_output().unwrap_or_default(), "Prediction script failed");
        }
        result
    }
}

/// Read `model: label` lines from the results block of the type classifier,
/// falling back to its single-result line.
pub(crate) fn parse_type_output(
    program: &str,
    output: &str,
) -> Result<BTreeMap<String, String>, ExternalProcessError> {
    let mut predictions = BTreeMap::new();
    let mut in_results = false;

    for line in output.lines().map(str::trim) {
        if line == RESULTS_START {
            in_results = true;
            continue;
        }
        if line == RESULTS_END {
            in_results = false;
            continue;
        }
        if in_results {
            if let Some((model, label)) = line.split_once(':') {
                predictions.insert(model.trim().to_string(), label.trim().to_string());
            }
        }
    }

    if predictions.is_empty() {
        if let Some(label) = output
            .lines()
            .find_map(|line| line.trim().strip_prefix(SINGLE_RESULT_PREFIX))
        {
            predictions.insert("Prediction".to_string(), label.trim().to_string());
        }
    }

    if predictions.is_empty() {
        return Err(ExternalProcessError::Malformed {
            program: program.to_string(),
            reason: "no prediction found in output".to_string(),
            output: output.to_string(),
        });
    }
    Ok(predictions)
}

#[derive(Deserialize)]
struct TrajectoryEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<TrajectoryData>,
}

#[derive(Deserialize)]
struct TrajectoryData {
    #[serde(default)]
    boat_name: Option<String>,
    current_position: PositionFix,
    predicted_position: PositionFix,
    #[serde(default)]
    prediction_info: Option<PredictionInfo>,
}

#[derive(Deserialize)]
struct PredictionInfo {
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    distance_km: Option<f64>,
}

pub(crate) fn parse_trajectory_output(
    program: &str,
    mmsi: &Mmsi,
    horizon_minutes: u32,
    output: &str,
) -> Result<TrajectoryForecast, ExternalProcessError> {
    let malformed = |reason: String| ExternalProcessError::Malformed {
        program: program.to_string(),
        reason,
        output: output.to_string(),
    };

    let envelope: TrajectoryEnvelope =
        serde_json::from_str(output.trim()).map_err(|e| malformed(e.to_string()))?;

    if !envelope.success {
        return Err(ExternalProcessError::Rejected {
            program: program.to_string(),
            message: envelope
                .error
                .unwrap_or_else(|| "unknown error".to_string()),
            output: output.to_string(),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| malformed("incomplete prediction data".to_string()))?;
    let info = data.prediction_info;

    Ok(TrajectoryForecast {
        mmsi: mmsi.clone(),
        vessel_name: data.boat_name,
        horizon_minutes,
        current_position: data.current_position,
        predicted_position: data.predicted_position,
        confidence: info.as_ref().and_then(|i| i.confidence.clone()),
        distance_km: info.and_then(|i| i.distance_km),
    })
}

/// Parse the cluster scripts' output: a JSON array of assignments, where an
/// element (or the whole document) carrying `error` is a script-side failure.
pub(crate) fn parse_cluster_output(
    program: &str,
    output: &str,
) -> Result<Vec<ClusterAssignment>, ExternalProcessError> {
    let malformed = |reason: String| ExternalProcessError::Malformed {
        program: program.to_string(),
        reason,
        output: output.to_string(),
    };
    let rejected = |message: &Value| ExternalProcessError::Rejected {
        program: program.to_string(),
        message: message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string()),
        output: output.to_string(),
    };

    let document: Value =
        serde_json::from_str(output.trim()).map_err(|e| malformed(e.to_string()))?;

    let items = match document {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            return Err(match map.get("error") {
                Some(message) => rejected(message),
                None => malformed("expected a JSON array".to_string()),
            })
        }
        _ => return Err(malformed("expected a JSON array".to_string())),
    };

    items
        .into_iter()
        .map(|item| {
            if let Some(message) = item.get("error") {
                return Err(rejected(message));
            }
            serde_json::from_value(item).map_err(|e| malformed(e.to_string()))
        })
        .collect()
}

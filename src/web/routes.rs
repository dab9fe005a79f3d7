//! HTTP routes

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;
use crate::error::ValidationError;
use crate::ingest::{self, ReportForm};
use crate::models::{IngestOutcome, Mmsi, Status};
use crate::prediction::{
    ClusterQuery, Horizon, Prediction, PredictionRequest, TypeAttributes, TypeQuery,
};
use crate::query::{PositionView, VesselSummary};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// API: Navigational statuses, by id
pub async fn api_statuses(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Status>> {
    Ok(Json(state.db.list_statuses().await?))
}

/// API: Every stored report, newest first
pub async fn api_reports(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PositionView>> {
    Ok(Json(state.queries.list_reports().await?))
}

/// API: Vessels by name, for pickers
pub async fn api_catalog(State(state): State<Arc<AppState>>) -> ApiResult<Vec<VesselSummary>> {
    Ok(Json(state.queries.vessel_catalog().await?))
}

/// API: Latest position of each vessel for the map
pub async fn api_latest(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PositionView>> {
    Ok(Json(state.queries.latest_positions().await?))
}

/// API: Trajectory of one vessel, oldest point first
pub async fn api_history(
    State(state): State<Arc<AppState>>,
    Path(mmsi): Path<String>,
) -> ApiResult<Vec<PositionView>> {
    let mmsi = Mmsi::try_from(mmsi.as_str())?;
    Ok(Json(state.queries.trajectory_for(&mmsi).await?))
}

/// API: Current position of one vessel
pub async fn api_vessel_latest(
    State(state): State<Arc<AppState>>,
    Path(mmsi): Path<String>,
) -> ApiResult<PositionView> {
    let mmsi = Mmsi::try_from(mmsi.as_str())?;
    Ok(Json(state.queries.latest_for(&mmsi).await?))
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub outcome: IngestOutcome,
    pub id: i64,
}

/// API: Add a vessel report, or move an already known vessel
pub async fn api_ingest(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ReportForm>, FormRejection>,
) -> ApiResult<IngestResponse> {
    let Form(form) = form?;
    let (outcome, id) = ingest::ingest(&state.db, &form).await?;
    Ok(Json(IngestResponse {
        success: true,
        outcome,
        id,
    }))
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub prediction: Prediction,
}

async fn predict(state: &AppState, request: PredictionRequest) -> ApiResult<PredictionResponse> {
    let prediction = state
        .predictor
        .predict(&request)
        .await
        .map_err(crate::error::VesselError::from)?;
    Ok(Json(PredictionResponse {
        success: true,
        prediction,
    }))
}

/// API: Vessel type from status and dimensions
pub async fn api_predict_type(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TypeAttributes>, JsonRejection>,
) -> ApiResult<PredictionResponse> {
    let Json(attributes) = body?;
    let query = TypeQuery::try_from(attributes)?;
    predict(&state, PredictionRequest::VesselType(query)).await
}

#[derive(Debug, Default, Deserialize)]
pub struct TrajectoryParams {
    pub mmsi: Option<String>,
    pub horizon: Option<String>,
}

impl TrajectoryParams {
    fn into_request(self) -> Result<PredictionRequest, ValidationError> {
        let mmsi = self
            .mmsi
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| ValidationError::single("mmsi"))
            .and_then(|raw| Mmsi::try_from(raw));

        let horizon = match self.horizon.as_deref().map(str::trim) {
            None | Some("") => Ok(Horizon::default()),
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ValidationError::single("horizon"))
                .and_then(|minutes| Horizon::try_from(minutes)),
        };

        match (mmsi, horizon) {
            (Ok(mmsi), Ok(horizon)) => Ok(PredictionRequest::Trajectory { mmsi, horizon }),
            (mmsi, horizon) => {
                let fields = [mmsi.err(), horizon.err()]
                    .into_iter()
                    .flatten()
                    .flat_map(|e| e.fields)
                    .collect();
                Err(ValidationError { fields })
            }
        }
    }
}

/// API: Forecast position from the query string
pub async fn api_predict_trajectory_query(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TrajectoryParams>, QueryRejection>,
) -> ApiResult<PredictionResponse> {
    let Query(params) = params?;
    predict(&state, params.into_request()?).await
}

/// API: Forecast position from a form body
pub async fn api_predict_trajectory_form(
    State(state): State<Arc<AppState>>,
    params: Result<Form<TrajectoryParams>, FormRejection>,
) -> ApiResult<PredictionResponse> {
    let Form(params) = params?;
    predict(&state, params.into_request()?).await
}

/// API: Cluster of an ad-hoc position and motion
pub async fn api_predict_cluster(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClusterQuery>, JsonRejection>,
) -> ApiResult<PredictionResponse> {
    let Json(query) = body?;
    query.validate()?;
    predict(&state, PredictionRequest::Cluster(query)).await
}

/// API: Cluster of every stored vessel
pub async fn api_clusters(State(state): State<Arc<AppState>>) -> ApiResult<PredictionResponse> {
    predict(&state, PredictionRequest::ClusterAll).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mmsi: Option<&str>, horizon: Option<&str>) -> TrajectoryParams {
        TrajectoryParams {
            mmsi: mmsi.map(str::to_string),
            horizon: horizon.map(str::to_string),
        }
    }

    #[test]
    fn test_trajectory_params_default_horizon() {
        let request = params(Some("123456789"), None).into_request().unwrap();
        match request {
            PredictionRequest::Trajectory { mmsi, horizon } => {
                assert_eq!(mmsi.as_str(), "123456789");
                assert_eq!(horizon.minutes(), 5);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_trajectory_params_report_every_problem() {
        let err = params(None, Some("7")).into_request().unwrap_err();
        assert_eq!(err.fields, vec!["mmsi", "horizon"]);

        let err = params(Some("123"), Some("15")).into_request().unwrap_err();
        assert_eq!(err.fields, vec!["mmsi"]);

        let err = params(Some("123456789"), Some("ten")).into_request().unwrap_err();
        assert_eq!(err.fields, vec!["horizon"]);
    }
}

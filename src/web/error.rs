//! Mapping of service errors onto HTTP responses

use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{ValidationError, VesselError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub enum ApiError {
    Vessel(VesselError),
    /// Body or query string that could not be decoded at all
    BadRequest(String),
}

impl From<VesselError> for ApiError {
    fn from(e: VesselError) -> Self {
        Self::Vessel(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Vessel(VesselError::Validation(e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(e: FormRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Vessel(VesselError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Vessel(VesselError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Vessel(VesselError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Vessel(VesselError::ExternalProcess(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, missing_fields) = match self {
            ApiError::BadRequest(message) => {
                warn!("Rejected request: {}", message);
                (message, None)
            }
            ApiError::Vessel(VesselError::Validation(e)) => (e.to_string(), Some(e.fields)),
            ApiError::Vessel(VesselError::NotFound(mmsi)) => {
                warn!("No trajectory for mmsi {}", mmsi);
                ("no trajectory".to_string(), None)
            }
            ApiError::Vessel(VesselError::Storage(e)) => {
                error!("Database error: {:?}", e);
                ("an internal server error occurred".to_string(), None)
            }
            ApiError::Vessel(VesselError::ExternalProcess(e)) => {
                error!(
                    output = e.raw_output().unwrap_or_default(),
                    "Prediction failed: {}", e
                );
                ("prediction is currently unavailable".to_string(), None)
            }
        };

        let body = ErrorResponse {
            success: false,
            error,
            missing_fields,
        };
        (status, Json(body)).into_response()
    }
}

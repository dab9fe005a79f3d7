//! Error types shared by the store, ingestion and prediction layers

use thiserror::Error;

use crate::prediction::ExternalProcessError;

/// Every field that failed validation, in the order the checks ran
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("The following fields are required or invalid: {}", .fields.join(", "))]
pub struct ValidationError {
    pub fields: Vec<String>,
}

impl ValidationError {
    pub fn single(field: &str) -> Self {
        Self {
            fields: vec![field.to_string()],
        }
    }
}

#[derive(Error, Debug)]
pub enum VesselError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no trajectory for mmsi {0}")]
    NotFound(String),

    #[error("Database error")]
    Storage(#[from] sqlx::Error),

    #[error("Prediction failed")]
    ExternalProcess(#[from] ExternalProcessError),
}

pub type Result<T, E = VesselError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_field() {
        let err = ValidationError {
            fields: vec!["mmsi".to_string(), "statusId".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "The following fields are required or invalid: mmsi, statusId"
        );
    }
}

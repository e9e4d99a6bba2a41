use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::Path,
    Json,
};

use crate::errors::ServiceError;

/// Unwraps a JSON body, reporting malformed input like any other
/// validation failure.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| {
            ServiceError::validation("Invalid request body", vec![rejection.body_text()])
        })
}

/// Unwraps a numeric path id.
pub fn path_id(path: Result<Path<i64>, PathRejection>, name: &str) -> Result<i64, ServiceError> {
    match path {
        Ok(Path(id)) if id > 0 => Ok(id),
        Ok(Path(_)) => Err(ServiceError::BadRequest(format!(
            "{} must be a positive integer",
            name
        ))),
        Err(rejection) => Err(ServiceError::BadRequest(format!(
            "Invalid {}: {}",
            name,
            rejection.body_text()
        ))),
    }
}

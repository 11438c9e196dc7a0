use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use thiserror::Error as ThisError;

/// Terminal request errors. Every failure renders as a `{"message": ...}`
/// JSON body with the status of its kind; nothing is retried.
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// Malformed identifier, or a missing user on a membership mutation.
    #[error("{0}")]
    InvalidArgument(String),

    /// Missing or falsy required fields, all enumerated in one message.
    #[error("{0}")]
    Validation(String),

    /// Invalid enumerated value or a no-op update.
    #[error("{0}")]
    BadRequest(String),

    /// Duplicate unique field (group name, user email/phone).
    #[error("{0}")]
    Conflict(String),

    /// Permission gate, or a precondition on a nested resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::BadRequest(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, Error> {
        Ok(Response::builder()
            .status(self.status())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"message": self.to_string()})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?)
    }
}

/// Successful JSON response with the CORS headers every handler carries.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

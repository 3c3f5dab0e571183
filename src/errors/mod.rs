//! Error handling module for the fleet dashboard core.
//!
//! One error type covers the local precondition checks, the remote fleet API,
//! and overlay persistence. Each variant maps to a stable code and to an HTTP
//! status for the local surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const EXCLUSIVITY_VIOLATION: &str = "EXCLUSIVITY_VIOLATION";
    pub const ASSIGNMENT_IN_PROGRESS: &str = "ASSIGNMENT_IN_PROGRESS";
    pub const NOT_READY: &str = "NOT_READY";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
}

/// Result alias used throughout the crate.
pub type FleetResult<T> = Result<T, FleetError>;

/// Fleet dashboard error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// Caller-side precondition not met; never reaches the network
    Validation(String),
    /// Driver is already confirmed on a different bus
    ExclusivityViolation {
        driver_id: String,
        assigned_to: String,
    },
    /// Another assignment for the same bus is still in flight
    AssignmentInProgress { bus_id: String },
    /// Overlay has not been hydrated from durable storage yet
    NotReady(String),
    /// Remote call failed before a response arrived (connect, timeout)
    Network(String),
    /// Remote API answered with a non-success status
    Server { status: u16, message: String },
    /// Remote payload could not be decoded
    Decode(String),
    /// Durable store read/write failed
    Persistence(String),
    /// Invalid configuration value
    Config(String),
}

impl FleetError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FleetError::Validation(_) => StatusCode::BAD_REQUEST,
            FleetError::ExclusivityViolation { .. } => StatusCode::CONFLICT,
            FleetError::AssignmentInProgress { .. } => StatusCode::CONFLICT,
            FleetError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            FleetError::Network(_) => StatusCode::BAD_GATEWAY,
            FleetError::Server { status, .. } if *status == 404 => StatusCode::NOT_FOUND,
            FleetError::Server { .. } => StatusCode::BAD_GATEWAY,
            FleetError::Decode(_) => StatusCode::BAD_GATEWAY,
            FleetError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FleetError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            FleetError::Validation(_) => codes::VALIDATION_ERROR,
            FleetError::ExclusivityViolation { .. } => codes::EXCLUSIVITY_VIOLATION,
            FleetError::AssignmentInProgress { .. } => codes::ASSIGNMENT_IN_PROGRESS,
            FleetError::NotReady(_) => codes::NOT_READY,
            FleetError::Network(_) => codes::NETWORK_ERROR,
            FleetError::Server { .. } => codes::SERVER_ERROR,
            FleetError::Decode(_) => codes::DECODE_ERROR,
            FleetError::Persistence(_) => codes::PERSISTENCE_ERROR,
            FleetError::Config(_) => codes::CONFIG_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            FleetError::Validation(msg) => msg.clone(),
            FleetError::ExclusivityViolation {
                driver_id,
                assigned_to,
            } => format!(
                "Driver {} is already assigned to bus {}",
                driver_id, assigned_to
            ),
            FleetError::AssignmentInProgress { bus_id } => {
                format!("An assignment for bus {} is already in progress", bus_id)
            }
            FleetError::NotReady(msg) => msg.clone(),
            FleetError::Network(msg) => msg.clone(),
            FleetError::Server { status, message } => {
                format!("Server returned {}: {}", status, message)
            }
            FleetError::Decode(msg) => msg.clone(),
            FleetError::Persistence(msg) => msg.clone(),
            FleetError::Config(msg) => msg.clone(),
        }
    }

    /// Whether the error came from the remote API (and so may trigger a revert).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            FleetError::Network(_) | FleetError::Server { .. } | FleetError::Decode(_)
        )
    }
}

impl std::fmt::Display for FleetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for FleetError {}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Remote API error: {:?}", err);
        if err.is_decode() {
            return FleetError::Decode(format!("Invalid response body: {}", err));
        }
        match err.status() {
            Some(status) => FleetError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => FleetError::Network(format!("Request failed: {}", err)),
        }
    }
}

impl From<sqlx::Error> for FleetError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Overlay store error: {:?}", err);
        FleetError::Persistence(format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        FleetError::Decode(format!("JSON error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &FleetError) -> Self {
        let details = match error {
            FleetError::ExclusivityViolation {
                driver_id,
                assigned_to,
            } => Some(serde_json::json!({
                "driverId": driver_id,
                "assignedTo": assigned_to,
            })),
            FleetError::AssignmentInProgress { bus_id } => {
                Some(serde_json::json!({ "busId": bus_id }))
            }
            FleetError::Server { status, .. } => {
                Some(serde_json::json!({ "upstreamStatus": status }))
            }
            _ => None,
        };

        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.message(),
                details,
            },
        }
    }
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::new(&self);
        (status, Json(body)).into_response()
    }
}

//! Local REST surface for the presentation layer.
//!
//! Thin handlers over [`crate::dashboard::Dashboard`]; every response uses the
//! `{ success, data }` envelope and cached reads also report their freshness.

mod assignments;
mod buses;
mod drivers;

pub use assignments::*;
pub use buses::*;
pub use drivers::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::{Cached, Freshness};
use crate::errors::FleetError;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            freshness: None,
        }
    }
}

impl<T: Serialize> From<Cached<T>> for ApiResponse<T> {
    fn from(cached: Cached<T>) -> Self {
        Self {
            success: true,
            data: cached.data,
            freshness: Some(cached.freshness),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, FleetError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Wrap a cached read, carrying its freshness.
pub fn cached<T: Serialize>(data: Cached<T>) -> ApiResult<T> {
    Ok(data.into())
}

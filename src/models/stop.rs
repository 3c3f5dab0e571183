//! Intermediate stops along a bus route (`/routes/{id}/stops`).

use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult};

/// A stop as stored by the remote API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    /// Absent on stops embedded in a create-bus payload
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub stop_order: u32,
    pub stop_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Request body for adding a stop, also used inside a create-bus payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewRouteStop {
    pub stop_order: u32,
    pub stop_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl NewRouteStop {
    pub fn validate(&self) -> FleetResult<()> {
        validate_stop_name(&self.stop_name)?;
        if let Some(distance) = self.distance_km {
            validate_distance(distance)?;
        }
        Ok(())
    }
}

/// Request body for updating a stop. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouteStopRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl UpdateRouteStopRequest {
    pub fn validate(&self) -> FleetResult<()> {
        if let Some(name) = &self.stop_name {
            validate_stop_name(name)?;
        }
        if let Some(distance) = self.distance_km {
            validate_distance(distance)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.stop_order.is_none()
            && self.stop_name.is_none()
            && self.arrival_time.is_none()
            && self.departure_time.is_none()
            && self.distance_km.is_none()
    }
}

fn validate_stop_name(name: &str) -> FleetResult<()> {
    if name.trim().is_empty() {
        return Err(FleetError::Validation("Stop name is required".to_string()));
    }
    Ok(())
}

fn validate_distance(distance: f64) -> FleetResult<()> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(FleetError::Validation(
            "Distance must be zero or more".to_string(),
        ));
    }
    Ok(())
}

//! Driver model matching the remote `/drivers` resource.

use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult};

/// A driver who can be assigned to at most one bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub driver_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
    /// Server-authoritative bus this driver is committed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl Driver {
    /// The confirmed bus, treating an empty string as unassigned.
    pub fn assigned_bus(&self) -> Option<&str> {
        self.assigned_to.as_deref().filter(|bus| !bus.is_empty())
    }

    pub fn status(&self) -> DriverStatus {
        if self.assigned_bus().is_some() {
            DriverStatus::Active
        } else {
            DriverStatus::Inactive
        }
    }
}

/// Derived from whether the driver is committed to a bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverStatus {
    Active,
    Inactive,
}

/// Driver as shown in listings, with its derived status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverListing {
    #[serde(flatten)]
    pub driver: Driver,
    pub status: DriverStatus,
}

impl From<Driver> for DriverListing {
    fn from(driver: Driver) -> Self {
        let status = driver.status();
        Self { driver, status }
    }
}

/// Request body for inviting a new driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDriverRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driving_license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

impl AddDriverRequest {
    /// Drivers are invited by phone number; everything else is optional.
    pub fn validate(&self) -> FleetResult<()> {
        validate_phone(&self.phone_number)
    }
}

/// Request body for updating a driver. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDriverRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driving_license: Option<String>,
}

impl UpdateDriverRequest {
    pub fn validate(&self) -> FleetResult<()> {
        if let Some(phone) = &self.phone_number {
            validate_phone(phone)?;
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(FleetError::Validation("Name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone_number.is_none() && self.driving_license.is_none()
    }
}

fn validate_phone(phone: &str) -> FleetResult<()> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    if digits < 10 || !allowed {
        return Err(FleetError::Validation(
            "A valid phone number is required".to_string(),
        ));
    }
    Ok(())
}

/// Request body for `PUT /drivers/{id}/assign`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverRequest {
    pub bus_id: String,
}

//! Bus model matching the remote `/routes` resource.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{NewRouteStop, RouteStop};
use crate::errors::{FleetError, FleetResult};

/// Registration plates look like `MH01 AB 1234`.
static BUS_NUMBER: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[0-9]{2}\s[A-Z]{2}\s[0-9]{4}$"));

/// A scheduled bus trip between two route endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub bus_number: String,
    #[serde(default)]
    pub bus_name: String,
    pub route_from: String,
    pub route_to: String,
    pub date: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub total_seats: u32,
    #[serde(default)]
    pub seats_booked: u32,
    pub price: f64,
    /// Server-confirmed driver assigned to this bus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_stops: Vec<RouteStop>,
}

/// One page of buses as returned by `GET /routes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BusPage {
    #[serde(default)]
    pub routes: Vec<Bus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<serde_json::Value>,
}

/// Query parameters for listing buses. Part of the cache key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ListBusesParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

impl Default for ListBusesParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            date: None,
            status: None,
        }
    }
}

impl ListBusesParams {
    /// Render as a URL query string, omitting unset filters.
    pub fn to_query_string(&self) -> String {
        let mut query = format!("page={}&limit={}", self.page, self.limit);
        if let Some(date) = self.date.as_deref().filter(|d| !d.is_empty()) {
            query.push_str(&format!("&date={}", date));
        }
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            query.push_str(&format!("&status={}", status));
        }
        query
    }
}

/// Request body for creating a new bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusRequest {
    pub bus_number: String,
    pub bus_name: String,
    pub route_from: String,
    pub route_to: String,
    pub date: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub price: f64,
    pub total_seats: u32,
    #[serde(default)]
    pub route_stops: Vec<NewRouteStop>,
}

impl CreateBusRequest {
    /// Check the payload before it is sent to the remote API.
    pub fn validate(&self) -> FleetResult<()> {
        validate_bus_number(&self.bus_number)?;
        validate_min_len("Bus name", &self.bus_name, 2)?;
        validate_min_len("Route from", &self.route_from, 2)?;
        validate_min_len("Route to", &self.route_to, 2)?;
        validate_date(&self.date)?;
        validate_required("Departure time", &self.departure_time)?;
        validate_required("Arrival time", &self.arrival_time)?;
        validate_price(self.price)?;
        validate_seats(self.total_seats)?;
        self.route_stops.iter().try_for_each(NewRouteStop::validate)
    }
}

/// Request body for updating an existing bus. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_seats: Option<u32>,
}

impl UpdateBusRequest {
    /// Check every field that is present; absent fields are left untouched remotely.
    pub fn validate(&self) -> FleetResult<()> {
        if let Some(number) = &self.bus_number {
            validate_bus_number(number)?;
        }
        if let Some(name) = &self.bus_name {
            validate_min_len("Bus name", name, 2)?;
        }
        if let Some(from) = &self.route_from {
            validate_min_len("Route from", from, 2)?;
        }
        if let Some(to) = &self.route_to {
            validate_min_len("Route to", to, 2)?;
        }
        if let Some(date) = &self.date {
            validate_date(date)?;
        }
        if let Some(time) = &self.departure_time {
            validate_required("Departure time", time)?;
        }
        if let Some(time) = &self.arrival_time {
            validate_required("Arrival time", time)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(seats) = self.total_seats {
            validate_seats(seats)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bus_number.is_none()
            && self.bus_name.is_none()
            && self.route_from.is_none()
            && self.route_to.is_none()
            && self.date.is_none()
            && self.departure_time.is_none()
            && self.arrival_time.is_none()
            && self.price.is_none()
            && self.total_seats.is_none()
    }
}

fn validate_bus_number(value: &str) -> FleetResult<()> {
    let pattern = match &*BUS_NUMBER {
        Ok(pattern) => pattern,
        Err(e) => return Err(FleetError::Config(format!("Bus number pattern: {}", e))),
    };
    if !pattern.is_match(value) {
        return Err(FleetError::Validation(
            "Invalid bus number format (e.g., MH01 AB 1234)".to_string(),
        ));
    }
    Ok(())
}

/// Accepts a calendar date (`2025-08-09`) or a full RFC 3339 timestamp.
fn validate_date(value: &str) -> FleetResult<()> {
    validate_required("Date", value)?;
    let value = value.trim();
    let parsed = NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok();
    if !parsed {
        return Err(FleetError::Validation("Invalid date".to_string()));
    }
    Ok(())
}

fn validate_required(field: &str, value: &str) -> FleetResult<()> {
    if value.trim().is_empty() {
        return Err(FleetError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_min_len(field: &str, value: &str, min: usize) -> FleetResult<()> {
    validate_required(field, value)?;
    if value.trim().chars().count() < min {
        return Err(FleetError::Validation(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    Ok(())
}

fn validate_price(price: f64) -> FleetResult<()> {
    if !price.is_finite() || price < 1.0 {
        return Err(FleetError::Validation(
            "Price must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_seats(seats: u32) -> FleetResult<()> {
    if seats < 1 {
        return Err(FleetError::Validation(
            "Total seats must be at least 1".to_string(),
        ));
    }
    Ok(())
}

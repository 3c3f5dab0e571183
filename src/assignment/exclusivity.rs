//! Driver exclusivity rules.
//!
//! A driver confirmed on one bus may not be offered for, or assigned to,
//! another.

use std::collections::BTreeMap;

use crate::errors::{FleetError, FleetResult};
use crate::models::{Driver, DriverStatus};

/// True iff the driver is unassigned or already on `bus_id`.
pub fn is_assignable(driver: &Driver, bus_id: &str) -> bool {
    match driver.assigned_bus() {
        None => true,
        Some(current) => current == bus_id,
    }
}

/// Gate used before an assignment is attempted.
pub fn check_assignable(driver: &Driver, bus_id: &str) -> FleetResult<()> {
    match driver.assigned_bus() {
        Some(current) if current != bus_id => Err(FleetError::ExclusivityViolation {
            driver_id: driver.id.clone(),
            assigned_to: current.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Drivers that may be selected for `bus_id`, in display order.
pub fn eligible_drivers(drivers: &[Driver], bus_id: &str) -> Vec<Driver> {
    let mut eligible: Vec<Driver> = drivers
        .iter()
        .filter(|driver| is_assignable(driver, bus_id))
        .cloned()
        .collect();
    sort_for_display(&mut eligible);
    eligible
}

/// Active drivers first; otherwise the server's order is kept.
pub fn sort_for_display(drivers: &mut [Driver]) {
    drivers.sort_by_key(|driver| match driver.status() {
        DriverStatus::Active => 0,
        DriverStatus::Inactive => 1,
    });
}

/// Drivers that are the target of more than one bus, counting overlay
/// selections and confirmed assignments together.
pub fn duplicate_targets(
    overlay: &BTreeMap<String, String>,
    drivers: &[Driver],
) -> BTreeMap<String, Vec<String>> {
    let mut targets: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (bus_id, driver_id) in overlay {
        if !driver_id.is_empty() {
            targets
                .entry(driver_id.clone())
                .or_default()
                .push(bus_id.clone());
        }
    }
    for driver in drivers {
        if let Some(bus_id) = driver.assigned_bus() {
            let buses = targets.entry(driver.id.clone()).or_default();
            if !buses.iter().any(|b| b == bus_id) {
                buses.push(bus_id.to_string());
            }
        }
    }

    targets.retain(|_, buses| buses.len() > 1);
    targets
}

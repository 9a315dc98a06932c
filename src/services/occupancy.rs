//! Occupancy badge selection.
//!
//! Which badge a bubble shows depends on the configured display mode and
//! on which counting fields the journey actually carries. A mode whose
//! required fields are absent yields no badge at all.

use crate::config::ApcMode;
use crate::models::content::{OccupancyBadge, OccupancyLevel};
use crate::providers::siri::{Capacities, MonitoredVehicleJourney};

/// Badge for a journey under the given mode. `dashed` selects the variant
/// with the load image used in vehicle bubbles.
pub fn occupancy_badge(
    mode: ApcMode,
    journey: &MonitoredVehicleJourney,
    dashed: bool,
) -> Option<OccupancyBadge> {
    match mode {
        ApcMode::None => None,
        ApcMode::Occupancy => {
            let value = journey.occupancy.as_deref()?;
            Some(OccupancyBadge::Occupancy {
                level: occupancy_level(value),
                dashed,
            })
        }
        ApcMode::LoadFactor => {
            let capacities = call_capacities(journey)?;
            let factor = capacities.estimated_passenger_load_factor.as_deref()?;
            Some(OccupancyBadge::LoadFactor {
                level: load_factor_level(factor),
                dashed,
            })
        }
        ApcMode::PassengerCount => {
            let capacities = call_capacities(journey)?;
            let count = capacities.estimated_passenger_count?;
            Some(OccupancyBadge::PassengerCount { count })
        }
        ApcMode::LoadFactorPassengerCount => {
            let capacities = call_capacities(journey)?;
            let count = capacities.estimated_passenger_count?;
            let factor = capacities.estimated_passenger_load_factor.as_deref()?;
            Some(OccupancyBadge::LoadFactorCount {
                level: load_factor_level(factor),
                count,
                dashed,
            })
        }
    }
}

fn call_capacities(journey: &MonitoredVehicleJourney) -> Option<&Capacities> {
    journey
        .monitored_call
        .as_ref()?
        .extensions
        .as_ref()?
        .capacities
        .as_ref()
}

fn occupancy_level(value: &str) -> Option<OccupancyLevel> {
    match value {
        "seatsAvailable" => Some(OccupancyLevel::Low),
        "standingAvailable" => Some(OccupancyLevel::Medium),
        "full" => Some(OccupancyLevel::High),
        _ => None,
    }
}

fn load_factor_level(value: &str) -> Option<OccupancyLevel> {
    match value {
        "L" => Some(OccupancyLevel::Low),
        "M" => Some(OccupancyLevel::Medium),
        "H" => Some(OccupancyLevel::High),
        _ => None,
    }
}

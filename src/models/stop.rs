//! Static stop metadata and the grouping key for arrivals.

use serde::{Deserialize, Serialize};

use crate::providers::siri::SiriEnvelope;
use crate::util;

/// Combined response of a stop bubble request: the realtime SIRI blob plus
/// the stop's static metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopBubbleResponse {
    pub siri: SiriEnvelope,
    pub stop: StopResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResult {
    /// Composite stop id, e.g. "MTA_308209".
    pub id: String,
    pub name: String,
    #[serde(default, rename = "routesAvailable")]
    pub routes_available: Vec<RouteAtStop>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAtStop {
    pub id: String,
    #[serde(rename = "shortName")]
    pub short_name: String,
    #[serde(default)]
    pub directions: Vec<RouteDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDirection {
    #[serde(rename = "directionId")]
    pub direction_id: String,
    pub destination: String,
    #[serde(rename = "hasUpcomingScheduledService")]
    pub has_upcoming_scheduled_service: bool,
}

/// Grouping key for arrivals at a stop. Two journeys belong to the same
/// group only when route, direction and headsign all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteDirectionKey {
    pub route_id: String,
    pub direction_id: String,
    pub destination_hash: u32,
}

impl RouteDirectionKey {
    pub fn new(route_id: &str, direction_id: &str, destination: &str) -> Self {
        Self {
            route_id: route_id.to_string(),
            direction_id: direction_id.to_string(),
            destination_hash: util::destination_hash(destination),
        }
    }
}

/// Route identity carried through the no-arrivals and no-service buckets.
#[derive(Debug, Clone)]
pub struct RouteBadge {
    pub id: String,
    pub short_name: String,
    pub destination: Option<String>,
}

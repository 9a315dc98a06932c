//! SIRI feed client and wire schema.
//!
//! The realtime feed speaks a SIRI-like JSON dialect: a service delivery
//! envelope carrying vehicle monitoring, stop monitoring and situation
//! exchange deliveries. The schema is consumed, not owned, so every field
//! is optional and unknown fields are ignored.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Transport seam for the popup session. Implemented by [`FeedClient`] for
/// production; tests substitute a gated fake.
pub trait FeedTransport: Send + Sync {
    /// GET `endpoint` with the given query parameters and parse the body
    /// as JSON. The returned future is expected to be dropped when a
    /// superseding refresh aborts the request.
    fn get_json(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> BoxFuture<'static, Result<Value, FeedError>>;
}

/// HTTP client for the realtime feed.
pub struct FeedClient {
    client: Client,
}

impl FeedClient {
    pub fn new(fetch_timeout: Duration, connect_timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FeedError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn build_url(endpoint: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", endpoint, query.join("&"))
}

impl FeedTransport for FeedClient {
    fn get_json(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> BoxFuture<'static, Result<Value, FeedError>> {
        let client = self.client.clone();
        let url = build_url(endpoint, &params);
        Box::pin(async move {
            let start = Instant::now();
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FeedError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(url = %url, status = status.as_u16(), "Feed request failed");
                return Err(FeedError::Api(format!("HTTP error: {}", status.as_u16())));
            }

            let body = response
                .text()
                .await
                .map_err(|e| FeedError::Network(e.to_string()))?;

            let result: Result<Value, _> = serde_json::from_str(&body);
            match &result {
                Ok(_) => {
                    tracing::debug!(
                        url = %url,
                        duration_ms = start.elapsed().as_millis() as u64,
                        response_size = body.len(),
                        "Feed request completed"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        body = &body[..body.len().min(500)],
                        "Failed to parse feed response"
                    );
                }
            }
            result.map_err(|e| FeedError::Parse(e.to_string()))
        })
    }
}

// Wire structures

/// Top-level envelope of a vehicle monitoring or stop monitoring response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiriEnvelope {
    #[serde(rename = "Siri")]
    pub siri: Siri,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Siri {
    #[serde(rename = "ServiceDelivery")]
    pub service_delivery: ServiceDelivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDelivery {
    #[serde(rename = "ResponseTimestamp")]
    pub response_timestamp: Option<String>,
    #[serde(default, rename = "VehicleMonitoringDelivery")]
    pub vehicle_monitoring_delivery: Vec<VehicleMonitoringDelivery>,
    #[serde(default, rename = "StopMonitoringDelivery")]
    pub stop_monitoring_delivery: Vec<StopMonitoringDelivery>,
    #[serde(default, rename = "SituationExchangeDelivery")]
    pub situation_exchange_delivery: Vec<SituationExchangeDelivery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleMonitoringDelivery {
    #[serde(default, rename = "VehicleActivity")]
    pub vehicle_activity: Vec<VehicleActivity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleActivity {
    /// When the vehicle's position was recorded (ISO 8601).
    #[serde(rename = "RecordedAtTime")]
    pub recorded_at_time: Option<String>,
    #[serde(rename = "MonitoredVehicleJourney")]
    pub monitored_vehicle_journey: Option<MonitoredVehicleJourney>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopMonitoringDelivery {
    #[serde(default, rename = "MonitoredStopVisit")]
    pub monitored_stop_visit: Vec<MonitoredStopVisit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredStopVisit {
    #[serde(rename = "RecordedAtTime")]
    pub recorded_at_time: Option<String>,
    #[serde(rename = "MonitoredVehicleJourney")]
    pub monitored_vehicle_journey: Option<MonitoredVehicleJourney>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoredVehicleJourney {
    /// Route identifier, e.g. "MTA NYCT_B63".
    #[serde(rename = "LineRef")]
    pub line_ref: Option<String>,
    #[serde(rename = "DirectionRef")]
    pub direction_ref: Option<String>,
    /// Rider-facing route name, e.g. "B63".
    #[serde(rename = "PublishedLineName")]
    pub published_line_name: Option<String>,
    #[serde(rename = "DestinationName")]
    pub destination_name: Option<String>,
    /// Whether the journey has realtime tracking.
    #[serde(rename = "Monitored")]
    pub monitored: Option<bool>,
    /// "normal" or "noProgress".
    #[serde(rename = "ProgressRate")]
    pub progress_rate: Option<String>,
    /// Qualifiers like "layover", "prevTrip" or "spooking"
    /// (a schedule-derived prediction).
    #[serde(rename = "ProgressStatus")]
    pub progress_status: Option<String>,
    /// Composite vehicle id, e.g. "MTA NYCT_7421".
    #[serde(rename = "VehicleRef")]
    pub vehicle_ref: Option<String>,
    #[serde(rename = "OriginAimedDepartureTime")]
    pub origin_aimed_departure_time: Option<String>,
    /// Simple occupancy: "seatsAvailable", "standingAvailable" or "full".
    #[serde(rename = "Occupancy")]
    pub occupancy: Option<String>,
    #[serde(rename = "MonitoredCall")]
    pub monitored_call: Option<Call>,
    #[serde(rename = "OnwardCalls")]
    pub onward_calls: Option<OnwardCalls>,
}

/// Calls the vehicle has yet to make. The inner list being absent is
/// distinct from it being empty and renders differently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnwardCalls {
    #[serde(rename = "OnwardCall")]
    pub onward_call: Option<Vec<Call>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Call {
    #[serde(rename = "StopPointRef")]
    pub stop_point_ref: Option<String>,
    #[serde(rename = "StopPointName")]
    pub stop_point_name: Option<String>,
    #[serde(rename = "ExpectedArrivalTime")]
    pub expected_arrival_time: Option<String>,
    #[serde(rename = "Extensions")]
    pub extensions: Option<CallExtensions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallExtensions {
    #[serde(rename = "Distances")]
    pub distances: Option<Distances>,
    #[serde(rename = "Capacities")]
    pub capacities: Option<Capacities>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distances {
    /// Rider-facing distance text, e.g. "1 stop away" or "0.7 miles away".
    #[serde(rename = "PresentableDistance")]
    pub presentable_distance: Option<String>,
    #[serde(rename = "DistanceFromCall")]
    pub distance_from_call: Option<f64>,
    #[serde(rename = "StopsFromCall")]
    pub stops_from_call: Option<u32>,
    #[serde(rename = "CallDistanceAlongRoute")]
    pub call_distance_along_route: Option<f64>,
}

/// Automatic passenger counting extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capacities {
    #[serde(rename = "EstimatedPassengerCount")]
    pub estimated_passenger_count: Option<u32>,
    /// "L", "M" or "H".
    #[serde(rename = "EstimatedPassengerLoadFactor")]
    pub estimated_passenger_load_factor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationExchangeDelivery {
    #[serde(rename = "Situations")]
    pub situations: Option<Situations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Situations {
    #[serde(default, rename = "PtSituationElement")]
    pub pt_situation_element: Vec<PtSituationElement>,
}

/// A service alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PtSituationElement {
    #[serde(rename = "SituationNumber")]
    pub situation_number: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Affects")]
    pub affects: Option<Affects>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Affects {
    /// Absent for system-wide alerts that name no particular journeys.
    #[serde(rename = "VehicleJourneys")]
    pub vehicle_journeys: Option<AffectedVehicleJourneys>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffectedVehicleJourneys {
    #[serde(default, rename = "AffectedVehicleJourney")]
    pub affected_vehicle_journey: Vec<AffectedVehicleJourney>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffectedVehicleJourney {
    #[serde(rename = "LineRef")]
    pub line_ref: Option<String>,
    #[serde(rename = "DirectionRef")]
    pub direction_ref: Option<String>,
}

impl ServiceDelivery {
    /// The newest vehicle activity entry, if the delivery has one.
    pub fn first_vehicle_activity(&self) -> Option<&VehicleActivity> {
        self.vehicle_monitoring_delivery
            .first()?
            .vehicle_activity
            .first()
    }

    /// All monitored stop visits of the first stop monitoring delivery.
    pub fn stop_visits(&self) -> &[MonitoredStopVisit] {
        self.stop_monitoring_delivery
            .first()
            .map(|d| d.monitored_stop_visit.as_slice())
            .unwrap_or(&[])
    }
}

/// Build the query parameter list for a refresh, substituting the debug
/// clock override when one is configured.
pub fn refresh_params(base: &[(String, String)], time_override_ms: Option<i64>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = base
        .iter()
        .filter(|(k, _)| k != "time")
        .cloned()
        .collect();
    if let Some(time) = time_override_ms {
        params.push(("time".to_string(), time.to_string()));
    }
    params
}

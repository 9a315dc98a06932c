//! Vehicle bubble content.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::Config;
use crate::map::Marker;
use crate::models::content::{
    AlertLink, BubbleContent, BubbleKind, Header, NextStop, NextStops, Section, UpdatedStamp,
};
use crate::providers::siri::{MonitoredVehicleJourney, SiriEnvelope};
use crate::services::alerts::build_alert_index;
use crate::services::occupancy::occupancy_badge;
use crate::session::{ContentBuilder, FooterSubject, Hooks};
use crate::util;

/// Decide what the "next stops" area shows. Onward calls being present
/// with the inner list missing is a distinct feed shape from the calls
/// being absent altogether, and reads differently.
fn next_stops(journey: &MonitoredVehicleJourney, reference_ms: i64) -> Option<NextStops> {
    let calls = journey
        .onward_calls
        .as_ref()
        .and_then(|c| c.onward_call.as_ref());

    let no_call_data = calls.map(|c| c.is_empty()).unwrap_or(true);
    if journey.monitored_call.is_none() && no_call_data {
        return Some(NextStops::Unknown);
    }

    let onward = journey.onward_calls.as_ref()?;
    let calls = match &onward.onward_call {
        Some(calls) => calls,
        None => return Some(NextStops::NoStops),
    };

    let len = calls.len();
    let stops = calls
        .iter()
        .enumerate()
        .map(|(index, call)| NextStop {
            stop_code: call
                .stop_point_ref
                .as_deref()
                .map(|r| util::strip_agency(r).to_string())
                .unwrap_or_default(),
            name: call.stop_point_name.clone().unwrap_or_default(),
            eta: call
                .expected_arrival_time
                .as_deref()
                .and_then(util::parse_iso8601)
                .map(|t| util::arrival_estimate(&t, reference_ms)),
            distance: call
                .extensions
                .as_ref()
                .and_then(|e| e.distances.as_ref())
                .and_then(|d| d.presentable_distance.clone()),
            last: index + 1 == len,
        })
        .collect();
    Some(NextStops::Calls(stops))
}

/// Assemble vehicle bubble content from a vehicle monitoring snapshot.
/// Returns `None` when the snapshot has no monitored vehicle journey.
pub fn build_vehicle_content(
    envelope: &SiriEnvelope,
    container_id: &str,
    config: &Config,
    hooks: &Hooks,
) -> Option<BubbleContent> {
    let delivery = &envelope.siri.service_delivery;
    let activity = delivery.first_vehicle_activity()?;
    let journey = activity.monitored_vehicle_journey.as_ref()?;

    let alert_index = build_alert_index(&delivery.situation_exchange_delivery);

    let route_id = journey.line_ref.clone().unwrap_or_default();
    let published_name = journey.published_line_name.clone().unwrap_or_default();
    let vehicle_number = journey
        .vehicle_ref
        .as_deref()
        .map(util::strip_agency)
        .unwrap_or_default();

    let reference_ms = delivery
        .response_timestamp
        .as_deref()
        .and_then(util::parse_iso8601)
        .map(|t| util::epoch_ms(&t))
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let recorded_ms = activity
        .recorded_at_time
        .as_deref()
        .and_then(util::parse_iso8601)
        .map(|t| util::epoch_ms(&t))
        .unwrap_or(reference_ms);
    let age_secs = (reference_ms - recorded_ms) as f64 / 1000.0;

    let mut sections = Vec::new();

    if let Some(badge) = occupancy_badge(config.apc_mode, journey, true) {
        sections.push(Section::Occupancy(badge));
    }

    if let Some(stops) = next_stops(journey, reference_ms) {
        sections.push(Section::NextStops(stops));
    }

    if alert_index.contains_key(&route_id) {
        sections.push(Section::VehicleAlert(AlertLink {
            stop_code: None,
            route_id: route_id.clone(),
            route_short_name: None,
            label: format!("Service Alert for {}", published_name),
        }));
    }

    let footer_html = hooks
        .footer
        .as_ref()
        .and_then(|f| f(FooterSubject::Route, &published_name));

    Some(BubbleContent {
        container_id: container_id.to_string(),
        kind: BubbleKind::Vehicle,
        header: Header {
            title: format!(
                "{} {}",
                published_name,
                journey.destination_name.as_deref().unwrap_or_default()
            ),
            subtitle: format!("Vehicle #{}", vehicle_number),
            updated: Some(UpdatedStamp {
                age_secs,
                stale: age_secs > config.stale_timeout_secs as f64,
                reference_epoch_ms: Utc::now().timestamp_millis(),
            }),
        },
        sections,
        footer_html,
    })
}

/// Builder the session invokes on each refresh of a vehicle bubble.
pub struct VehicleContentBuilder {
    pub config: Arc<Config>,
    pub hooks: Arc<Hooks>,
}

impl ContentBuilder for VehicleContentBuilder {
    fn build(
        &self,
        payload: &Value,
        container_id: &str,
        _marker: &dyn Marker,
        _route_filter: Option<&str>,
    ) -> Option<BubbleContent> {
        let envelope: SiriEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed vehicle monitoring payload");
                return None;
            }
        };
        build_vehicle_content(&envelope, container_id, &self.config, &self.hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::siri::{
        AffectedVehicleJourney, AffectedVehicleJourneys, Affects, Call, CallExtensions, Distances,
        OnwardCalls, PtSituationElement, ServiceDelivery, Siri, SituationExchangeDelivery,
        Situations, VehicleActivity, VehicleMonitoringDelivery,
    };

    fn onward_call(name: &str, eta: Option<&str>) -> Call {
        Call {
            stop_point_ref: Some(format!("MTA_{}", name.len() * 1000)),
            stop_point_name: Some(name.to_string()),
            expected_arrival_time: eta.map(str::to_string),
            extensions: Some(CallExtensions {
                distances: Some(Distances {
                    presentable_distance: Some("0.4 miles away".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn journey(onward: Option<OnwardCalls>) -> MonitoredVehicleJourney {
        MonitoredVehicleJourney {
            line_ref: Some("MTA NYCT_B63".to_string()),
            published_line_name: Some("B63".to_string()),
            destination_name: Some("PIER 6".to_string()),
            monitored: Some(true),
            vehicle_ref: Some("MTA NYCT_7421".to_string()),
            onward_calls: onward,
            ..Default::default()
        }
    }

    fn envelope(
        activity: Vec<VehicleActivity>,
        situations: Vec<PtSituationElement>,
    ) -> SiriEnvelope {
        SiriEnvelope {
            siri: Siri {
                service_delivery: ServiceDelivery {
                    response_timestamp: Some("2024-05-01T12:00:00-04:00".to_string()),
                    vehicle_monitoring_delivery: vec![VehicleMonitoringDelivery {
                        vehicle_activity: activity,
                    }],
                    stop_monitoring_delivery: Vec::new(),
                    situation_exchange_delivery: vec![SituationExchangeDelivery {
                        situations: Some(Situations {
                            pt_situation_element: situations,
                        }),
                    }],
                },
            },
        }
    }

    fn activity(journey: MonitoredVehicleJourney) -> VehicleActivity {
        VehicleActivity {
            recorded_at_time: Some("2024-05-01T11:58:00-04:00".to_string()),
            monitored_vehicle_journey: Some(journey),
        }
    }

    fn b63_alert() -> PtSituationElement {
        PtSituationElement {
            situation_number: Some("S1".to_string()),
            description: Some("Detour".to_string()),
            affects: Some(Affects {
                vehicle_journeys: Some(AffectedVehicleJourneys {
                    affected_vehicle_journey: vec![AffectedVehicleJourney {
                        line_ref: Some("MTA NYCT_B63".to_string()),
                        direction_ref: None,
                    }],
                }),
            }),
        }
    }

    #[test]
    fn no_activity_yields_no_content() {
        let envelope = envelope(Vec::new(), Vec::new());
        assert!(
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).is_none()
        );

        let bare = envelope_without_journey();
        assert!(build_vehicle_content(&bare, "c", &Config::default(), &Hooks::default()).is_none());
    }

    fn envelope_without_journey() -> SiriEnvelope {
        envelope(
            vec![VehicleActivity {
                recorded_at_time: None,
                monitored_vehicle_journey: None,
            }],
            Vec::new(),
        )
    }

    #[test]
    fn header_names_vehicle_and_ages_data() {
        let envelope = envelope(vec![activity(journey(None))], Vec::new());
        let content =
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).unwrap();
        assert_eq!(content.kind, BubbleKind::Vehicle);
        assert_eq!(content.header.title, "B63 PIER 6");
        assert_eq!(content.header.subtitle, "Vehicle #7421");
        let updated = content.header.updated.unwrap();
        assert_eq!(updated.age_secs, 120.0);
        // age equal to the threshold is not yet stale
        assert!(!updated.stale);
    }

    #[test]
    fn age_past_threshold_is_stale() {
        let config = Config {
            stale_timeout_secs: 119,
            ..Default::default()
        };
        let envelope = envelope(vec![activity(journey(None))], Vec::new());
        let content = build_vehicle_content(&envelope, "c", &config, &Hooks::default()).unwrap();
        assert!(content.header.updated.unwrap().stale);
    }

    #[test]
    fn missing_call_data_reads_as_unknown() {
        let envelope = envelope(vec![activity(journey(None))], Vec::new());
        let content =
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).unwrap();
        assert!(matches!(
            content.sections.as_slice(),
            [Section::NextStops(NextStops::Unknown)]
        ));
    }

    #[test]
    fn present_calls_without_list_read_as_no_stops() {
        let envelope = envelope(
            vec![activity(journey(Some(OnwardCalls { onward_call: None })))],
            Vec::new(),
        );
        let content =
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).unwrap();
        assert!(matches!(
            content.sections.as_slice(),
            [Section::NextStops(NextStops::NoStops)]
        ));
    }

    #[test]
    fn onward_calls_render_eta_then_distance() {
        let envelope = envelope(
            vec![activity(journey(Some(OnwardCalls {
                onward_call: Some(vec![
                    onward_call("ATLANTIC AV", Some("2024-05-01T12:03:00-04:00")),
                    onward_call("UNION ST", None),
                ]),
            })))],
            Vec::new(),
        );
        let content =
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).unwrap();
        let stops = match &content.sections[0] {
            Section::NextStops(NextStops::Calls(stops)) => stops,
            other => panic!("unexpected section: {:?}", other),
        };
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].eta.as_deref(), Some("3 minutes"));
        assert_eq!(stops[0].distance.as_deref(), Some("0.4 miles away"));
        assert!(!stops[0].last);
        assert!(stops[1].eta.is_none());
        assert!(stops[1].last);
    }

    #[test]
    fn correlated_alert_adds_link() {
        let envelope = envelope(vec![activity(journey(None))], vec![b63_alert()]);
        let content =
            build_vehicle_content(&envelope, "c", &Config::default(), &Hooks::default()).unwrap();
        let link = content
            .sections
            .iter()
            .find_map(|s| match s {
                Section::VehicleAlert(link) => Some(link),
                _ => None,
            })
            .expect("alert link");
        assert_eq!(link.route_id, "MTA NYCT_B63");
        assert_eq!(link.label, "Service Alert for B63");
        assert!(link.stop_code.is_none());
    }

    #[test]
    fn footer_hook_is_keyed_by_route() {
        let hooks = Hooks {
            footer: Some(Box::new(|subject, id| {
                assert!(matches!(subject, FooterSubject::Route));
                Some(format!("<p class=\"footer\">{}</p>", id))
            })),
            ..Default::default()
        };
        let envelope = envelope(vec![activity(journey(None))], Vec::new());
        let content = build_vehicle_content(&envelope, "c", &Config::default(), &hooks).unwrap();
        assert_eq!(
            content.footer_html.as_deref(),
            Some("<p class=\"footer\">B63</p>")
        );
    }
}

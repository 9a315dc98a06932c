//! Stop bubble content.
//!
//! A stop's static route list is partitioned into three disjoint buckets:
//! routes with tracked arrivals, routes with scheduled service but nothing
//! tracked yet, and routes with no scheduled service at all. Live visits
//! are then overlaid on the partition, promoting keys into the arrivals
//! bucket as they are observed. Every (route, direction) pair from the
//! static list ends up in exactly one bucket.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::map::Marker;
use crate::models::content::{
    ArrivalGroup, ArrivalItem, AlertLink, BubbleContent, BubbleKind, DepartureQualifier, Header,
    RouteHeading, Section, UpdatedStamp,
};
use crate::models::stop::{RouteBadge, RouteDirectionKey, StopBubbleResponse, StopResult};
use crate::providers::siri::{MonitoredStopVisit, MonitoredVehicleJourney};
use crate::services::alerts::{build_alert_index, AlertIndex};
use crate::services::occupancy::occupancy_badge;
use crate::session::{ContentBuilder, FooterSubject, Hooks};
use crate::util;

/// One arrivals group: the journeys observed for a grouping key, in feed
/// order, oldest first.
#[derive(Debug, Clone)]
pub struct ArrivalBucket {
    pub key: RouteDirectionKey,
    pub journeys: Vec<MonitoredVehicleJourney>,
}

#[derive(Debug, Clone, Default)]
pub struct StopPartition {
    pub arrivals: Vec<ArrivalBucket>,
    arrivals_index: HashMap<RouteDirectionKey, usize>,
    pub no_arrivals: Vec<(RouteDirectionKey, RouteBadge)>,
    pub no_service: Vec<(RouteDirectionKey, RouteBadge)>,
    /// Short names of routes excluded by the active filter.
    pub other_routes: Vec<String>,
    /// Distinct routes classified into the buckets. Filtered-out routes do
    /// not count.
    pub total_route_count: usize,
    /// The route filter, kept only when it matches an available route.
    pub filter: Option<String>,
}

impl StopPartition {
    pub fn arrivals_count(&self) -> usize {
        self.arrivals.iter().map(|b| b.journeys.len()).sum()
    }

    /// Overlay live visits onto the partition. A visit's key moves its
    /// group out of "no arrivals yet" the first time it is seen; further
    /// visits for the same key accumulate in that group.
    pub fn overlay_visits(&mut self, visits: &[MonitoredStopVisit]) {
        for visit in visits {
            let journey = match &visit.monitored_vehicle_journey {
                Some(j) => j,
                None => continue,
            };
            let route_id = match &journey.line_ref {
                Some(r) => r.clone(),
                None => continue,
            };
            let short_name = journey.published_line_name.as_deref().unwrap_or("");
            if let Some(filter) = &self.filter {
                if short_name != filter.as_str() {
                    continue;
                }
            }
            let key = RouteDirectionKey::new(
                &route_id,
                journey.direction_ref.as_deref().unwrap_or(""),
                journey.destination_name.as_deref().unwrap_or(""),
            );
            let index = match self.arrivals_index.get(&key) {
                Some(&i) => i,
                None => {
                    self.no_arrivals.retain(|(k, _)| *k != key);
                    self.arrivals.push(ArrivalBucket {
                        key: key.clone(),
                        journeys: Vec::new(),
                    });
                    let i = self.arrivals.len() - 1;
                    self.arrivals_index.insert(key, i);
                    i
                }
            };
            self.arrivals[index].journeys.push(journey.clone());
        }
    }
}

/// Classify a stop's routes and directions, honoring the optional route
/// filter. A filter that matches nothing available is ignored entirely.
pub fn partition_stop_routes(stop: &StopResult, route_filter: Option<&str>) -> StopPartition {
    let filter = route_filter
        .filter(|f| stop.routes_available.iter().any(|r| r.short_name == *f))
        .map(str::to_string);

    let mut partition = StopPartition {
        filter,
        ..Default::default()
    };

    for route in &stop.routes_available {
        if let Some(filter) = &partition.filter {
            if route.short_name != *filter {
                partition.other_routes.push(route.short_name.clone());
                continue;
            }
        }
        for direction in &route.directions {
            let key = RouteDirectionKey::new(&route.id, &direction.direction_id, &direction.destination);
            let badge = RouteBadge {
                id: route.id.clone(),
                short_name: route.short_name.clone(),
                destination: Some(direction.destination.clone()),
            };
            if direction.has_upcoming_scheduled_service {
                partition.no_arrivals.push((key, badge));
            } else {
                partition.no_service.push((key, badge));
            }
        }
        partition.total_route_count += 1;
    }

    partition
}

/// How many tracked journeys to render per group. Shrinks as the stop
/// serves more routes, to bound the bubble's height.
pub fn max_observations(total_route_count: usize) -> usize {
    if total_route_count > 5 {
        1
    } else if total_route_count > 3 {
        2
    } else {
        3
    }
}

/// One rendered line for a tracked journey. Journeys without a monitored
/// call have nothing to show and yield `None`.
fn arrival_item(
    journey: &MonitoredVehicleJourney,
    reference_ms: i64,
    config: &Config,
    last: bool,
) -> Option<ArrivalItem> {
    let call = journey.monitored_call.as_ref()?;

    let eta = call
        .expected_arrival_time
        .as_deref()
        .and_then(util::parse_iso8601)
        .map(|t| util::arrival_estimate(&t, reference_ms));
    let distance = call
        .extensions
        .as_ref()
        .and_then(|e| e.distances.as_ref())
        .and_then(|d| d.presentable_distance.clone());
    let occupancy = occupancy_badge(config.apc_mode, journey, false);
    let vehicle_id = if config.show_vehicle_id_in_stop_popup {
        journey
            .vehicle_ref
            .as_deref()
            .map(|v| util::strip_agency(v).to_string())
    } else {
        None
    };

    let status = journey.progress_status.as_deref().unwrap_or("");
    let layover = status.contains("layover");
    let prev_trip = status.contains("prevTrip");
    let estimated = status == "spooking";

    let departure = journey
        .origin_aimed_departure_time
        .as_deref()
        .and_then(util::parse_iso8601);
    let qualifier =
        departure_qualifier(eta.is_some(), layover, prev_trip, departure.as_ref(), reference_ms);

    Some(ArrivalItem {
        eta,
        distance,
        occupancy,
        vehicle_id,
        qualifier,
        estimated,
        last,
    })
}

fn departure_qualifier(
    time_mode: bool,
    layover: bool,
    prev_trip: bool,
    departure: Option<&DateTime<FixedOffset>>,
    reference_ms: i64,
) -> Option<DepartureQualifier> {
    match departure {
        Some(departure) => {
            let on_schedule = util::epoch_ms(departure) >= reference_ms;
            if layover {
                Some(if on_schedule {
                    DepartureQualifier::LayoverOnSchedule(util::clock_time(departure))
                } else {
                    DepartureQualifier::LayoverLate
                })
            } else if prev_trip {
                Some(if on_schedule {
                    DepartureQualifier::PrevTripOnSchedule(util::clock_time(departure))
                } else {
                    DepartureQualifier::PrevTripLate
                })
            } else {
                None
            }
        }
        // without an aimed departure only the time-based rendering carries
        // the terminal annotation
        None => {
            if time_mode && layover {
                Some(DepartureQualifier::LayoverLate)
            } else {
                None
            }
        }
    }
}

fn alert_link_for(
    alert_index: &AlertIndex,
    stop_code: &str,
    route_id: &str,
    short_name: &str,
) -> Option<AlertLink> {
    if !alert_index.contains_key(route_id) {
        return None;
    }
    Some(AlertLink {
        stop_code: Some(stop_code.to_string()),
        route_id: route_id.to_string(),
        route_short_name: Some(short_name.to_string()),
        label: "Alert".to_string(),
    })
}

/// Assemble the full stop bubble content from a combined stop response.
pub fn build_stop_content(
    response: &StopBubbleResponse,
    container_id: &str,
    config: &Config,
    hooks: &Hooks,
    route_filter: Option<&str>,
) -> BubbleContent {
    let delivery = &response.siri.siri.service_delivery;
    let stop = &response.stop;
    let alert_index = build_alert_index(&delivery.situation_exchange_delivery);
    let stop_code = util::strip_agency(&stop.id).to_string();
    let visits = delivery.stop_visits();

    let reference_ms = delivery
        .response_timestamp
        .as_deref()
        .and_then(util::parse_iso8601)
        .map(|t| util::epoch_ms(&t))
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    // the stamp ages from the newest vehicle report, not the response time
    let newest_recorded_ms = visits
        .iter()
        .filter_map(|v| v.recorded_at_time.as_deref())
        .filter_map(util::parse_iso8601)
        .map(|t| util::epoch_ms(&t))
        .max()
        .unwrap_or(reference_ms);
    let age_secs = (reference_ms - newest_recorded_ms) as f64 / 1000.0;
    let updated = UpdatedStamp {
        age_secs,
        stale: age_secs > config.stale_timeout_secs as f64,
        reference_epoch_ms: Utc::now().timestamp_millis(),
    };

    let mut partition = partition_stop_routes(stop, route_filter);
    partition.overlay_visits(visits);
    let cap = max_observations(partition.total_route_count);

    let mut sections = Vec::new();

    if !partition.arrivals.is_empty() {
        let mut groups = Vec::new();
        for bucket in &partition.arrivals {
            let first = match bucket.journeys.first() {
                Some(j) => j,
                None => continue,
            };
            let short_name = first.published_line_name.clone().unwrap_or_default();
            let route_id = first.line_ref.clone().unwrap_or_default();
            let heading = RouteHeading {
                stop_code: stop_code.clone(),
                short_name: short_name.clone(),
                destination: first.destination_name.clone(),
                alert: alert_link_for(&alert_index, &stop_code, &route_id, &short_name),
            };

            let len = bucket.journeys.len();
            let mut items = Vec::new();
            for (index, journey) in bucket.journeys.iter().enumerate() {
                if index >= cap {
                    break;
                }
                let last = index == cap - 1 || index == len - 1;
                if let Some(item) = arrival_item(journey, reference_ms, config, last) {
                    items.push(item);
                }
            }
            groups.push(ArrivalGroup { heading, items });
        }
        sections.push(Section::Arrivals(groups));
    }

    if !partition.no_arrivals.is_empty() {
        let headings = partition
            .no_arrivals
            .iter()
            .map(|(_, badge)| RouteHeading {
                stop_code: stop_code.clone(),
                short_name: badge.short_name.clone(),
                destination: badge.destination.clone(),
                alert: alert_link_for(&alert_index, &stop_code, &badge.id, &badge.short_name),
            })
            .collect();
        sections.push(Section::NoArrivals(headings));
    }

    if !partition.no_service.is_empty() {
        let headings = partition
            .no_service
            .iter()
            .map(|(_, badge)| RouteHeading {
                stop_code: stop_code.clone(),
                short_name: badge.short_name.clone(),
                destination: badge.destination.clone(),
                alert: None,
            })
            .collect();
        sections.push(Section::NoService(headings));
    }

    if !partition.other_routes.is_empty() {
        sections.push(Section::OtherRoutes {
            stop_code: util::stop_code_digits(&stop.id).to_string(),
            short_names: partition.other_routes.clone(),
        });
    }

    let footer_html = hooks
        .footer
        .as_ref()
        .and_then(|f| f(FooterSubject::Stop, &stop_code));

    BubbleContent {
        container_id: container_id.to_string(),
        kind: BubbleKind::Stop,
        header: Header {
            title: stop.name.clone(),
            subtitle: format!("Stopcode {}", stop_code),
            updated: Some(updated),
        },
        sections,
        footer_html,
    }
}

/// Builder the session invokes on each refresh of a stop bubble.
pub struct StopContentBuilder {
    pub config: Arc<Config>,
    pub hooks: Arc<Hooks>,
}

impl ContentBuilder for StopContentBuilder {
    fn build(
        &self,
        payload: &Value,
        container_id: &str,
        marker: &dyn Marker,
        route_filter: Option<&str>,
    ) -> Option<BubbleContent> {
        let response: StopBubbleResponse = match serde_json::from_value(payload.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed stop monitoring payload");
                return None;
            }
        };
        let content = build_stop_content(&response, container_id, &self.config, &self.hooks, route_filter);
        // stop markers may be hidden until their bubble is requested
        marker.set_visible(true);
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stop::{RouteAtStop, RouteDirection};
    use crate::providers::siri::{
        Call, CallExtensions, Distances, ServiceDelivery, Siri, SiriEnvelope,
        StopMonitoringDelivery,
    };

    fn route(id: &str, short_name: &str, directions: Vec<(&str, &str, bool)>) -> RouteAtStop {
        RouteAtStop {
            id: id.to_string(),
            short_name: short_name.to_string(),
            directions: directions
                .into_iter()
                .map(|(direction_id, destination, has_service)| RouteDirection {
                    direction_id: direction_id.to_string(),
                    destination: destination.to_string(),
                    has_upcoming_scheduled_service: has_service,
                })
                .collect(),
        }
    }

    fn stop(routes: Vec<RouteAtStop>) -> StopResult {
        StopResult {
            id: "MTA_308209".to_string(),
            name: "ATLANTIC AV / FURMAN ST".to_string(),
            routes_available: routes,
        }
    }

    fn visit(route_id: &str, short_name: &str, direction: &str, destination: &str) -> MonitoredStopVisit {
        MonitoredStopVisit {
            recorded_at_time: Some("2024-05-01T11:59:40-04:00".to_string()),
            monitored_vehicle_journey: Some(MonitoredVehicleJourney {
                line_ref: Some(route_id.to_string()),
                published_line_name: Some(short_name.to_string()),
                direction_ref: Some(direction.to_string()),
                destination_name: Some(destination.to_string()),
                monitored: Some(true),
                monitored_call: Some(Call {
                    expected_arrival_time: Some("2024-05-01T12:05:00-04:00".to_string()),
                    extensions: Some(CallExtensions {
                        distances: Some(Distances {
                            presentable_distance: Some("1 stop away".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn reference_ms() -> i64 {
        util::epoch_ms(&util::parse_iso8601("2024-05-01T12:00:00-04:00").unwrap())
    }

    #[test]
    fn partition_splits_by_scheduled_service() {
        let stop = stop(vec![
            route("MTA NYCT_A", "A", vec![("0", "DOWNTOWN", true)]),
            route("MTA NYCT_B", "B", vec![("0", "UPTOWN", false)]),
        ]);
        let partition = partition_stop_routes(&stop, None);
        assert!(partition.arrivals.is_empty());
        assert_eq!(partition.no_arrivals.len(), 1);
        assert_eq!(partition.no_arrivals[0].1.short_name, "A");
        assert_eq!(partition.no_service.len(), 1);
        assert_eq!(partition.no_service[0].1.short_name, "B");
        assert_eq!(partition.total_route_count, 2);
    }

    #[test]
    fn overlay_promotes_key_out_of_no_arrivals() {
        let stop = stop(vec![route("MTA NYCT_A", "A", vec![("1", "X", true)])]);
        let mut partition = partition_stop_routes(&stop, None);
        let before = partition.no_arrivals.len();

        partition.overlay_visits(&[visit("MTA NYCT_A", "A", "1", "X")]);

        assert_eq!(partition.arrivals.len(), 1);
        assert_eq!(partition.arrivals_count(), 1);
        assert_eq!(partition.no_arrivals.len(), before - 1);
    }

    #[test]
    fn overlay_accumulates_visits_per_key() {
        let stop = stop(vec![route("MTA NYCT_A", "A", vec![("1", "X", true)])]);
        let mut partition = partition_stop_routes(&stop, None);
        partition.overlay_visits(&[
            visit("MTA NYCT_A", "A", "1", "X"),
            visit("MTA NYCT_A", "A", "1", "X"),
        ]);
        assert_eq!(partition.arrivals.len(), 1);
        assert_eq!(partition.arrivals[0].journeys.len(), 2);
    }

    #[test]
    fn overlay_keeps_distinct_destinations_apart() {
        let stop = stop(vec![route(
            "MTA NYCT_A",
            "A",
            vec![("1", "X", true), ("1", "Y", true)],
        )]);
        let mut partition = partition_stop_routes(&stop, None);
        partition.overlay_visits(&[visit("MTA NYCT_A", "A", "1", "X")]);
        assert_eq!(partition.arrivals.len(), 1);
        assert_eq!(partition.no_arrivals.len(), 1);
        assert_eq!(partition.no_arrivals[0].1.destination.as_deref(), Some("Y"));
    }

    #[test]
    fn matching_filter_moves_other_routes_aside() {
        let stop = stop(vec![
            route("MTA NYCT_A", "A", vec![("0", "DOWNTOWN", true)]),
            route("MTA NYCT_B", "B", vec![("0", "UPTOWN", true)]),
        ]);
        let mut partition = partition_stop_routes(&stop, Some("A"));
        partition.overlay_visits(&[visit("MTA NYCT_B", "B", "0", "UPTOWN")]);

        assert_eq!(partition.other_routes, vec!["B".to_string()]);
        assert_eq!(partition.total_route_count, 1);
        // the filtered-out route's visit never reaches the buckets
        assert!(partition.arrivals.is_empty());
        assert_eq!(partition.no_arrivals.len(), 1);
        assert_eq!(partition.no_arrivals[0].1.short_name, "A");
    }

    #[test]
    fn unmatched_filter_is_ignored() {
        let stop = stop(vec![route("MTA NYCT_A", "A", vec![("0", "DOWNTOWN", true)])]);
        let partition = partition_stop_routes(&stop, Some("Q99"));
        assert!(partition.filter.is_none());
        assert!(partition.other_routes.is_empty());
        assert_eq!(partition.no_arrivals.len(), 1);
    }

    #[test]
    fn observation_cap_shrinks_with_route_count() {
        assert_eq!(max_observations(6), 1);
        assert_eq!(max_observations(5), 2);
        assert_eq!(max_observations(4), 2);
        assert_eq!(max_observations(3), 3);
        assert_eq!(max_observations(1), 3);
    }

    #[test]
    fn arrival_item_prefers_time_rendering() {
        let journey = visit("MTA NYCT_A", "A", "1", "X")
            .monitored_vehicle_journey
            .unwrap();
        let item = arrival_item(&journey, reference_ms(), &Config::default(), true).unwrap();
        assert_eq!(item.eta.as_deref(), Some("5 minutes"));
        assert_eq!(item.distance.as_deref(), Some("1 stop away"));
        assert!(item.last);
        assert!(!item.estimated);
        assert!(item.vehicle_id.is_none());
    }

    #[test]
    fn arrival_item_without_call_is_skipped() {
        let journey = MonitoredVehicleJourney {
            line_ref: Some("MTA NYCT_A".to_string()),
            ..Default::default()
        };
        assert!(arrival_item(&journey, reference_ms(), &Config::default(), false).is_none());
    }

    #[test]
    fn arrival_item_shows_vehicle_id_when_configured() {
        let mut journey = visit("MTA NYCT_A", "A", "1", "X")
            .monitored_vehicle_journey
            .unwrap();
        journey.vehicle_ref = Some("MTA NYCT_7421".to_string());
        let config = Config {
            show_vehicle_id_in_stop_popup: true,
            ..Default::default()
        };
        let item = arrival_item(&journey, reference_ms(), &config, false).unwrap();
        assert_eq!(item.vehicle_id.as_deref(), Some("7421"));
    }

    #[test]
    fn spooking_marks_item_estimated() {
        let mut journey = visit("MTA NYCT_A", "A", "1", "X")
            .monitored_vehicle_journey
            .unwrap();
        journey.progress_status = Some("spooking".to_string());
        let item = arrival_item(&journey, reference_ms(), &Config::default(), false).unwrap();
        assert!(item.estimated);
    }

    #[test]
    fn layover_qualifier_tracks_departure_schedule() {
        let on_time = util::parse_iso8601("2024-05-01T12:10:00-04:00").unwrap();
        let late = util::parse_iso8601("2024-05-01T11:50:00-04:00").unwrap();

        assert_eq!(
            departure_qualifier(true, true, false, Some(&on_time), reference_ms()),
            Some(DepartureQualifier::LayoverOnSchedule("12:10 PM".to_string()))
        );
        assert_eq!(
            departure_qualifier(true, true, false, Some(&late), reference_ms()),
            Some(DepartureQualifier::LayoverLate)
        );
        assert_eq!(
            departure_qualifier(false, false, true, Some(&on_time), reference_ms()),
            Some(DepartureQualifier::PrevTripOnSchedule("12:10 PM".to_string()))
        );
        assert_eq!(
            departure_qualifier(false, false, true, Some(&late), reference_ms()),
            Some(DepartureQualifier::PrevTripLate)
        );
        // no aimed departure: annotated only in the time rendering
        assert_eq!(
            departure_qualifier(true, true, false, None, reference_ms()),
            Some(DepartureQualifier::LayoverLate)
        );
        assert_eq!(departure_qualifier(false, true, false, None, reference_ms()), None);
        assert_eq!(departure_qualifier(true, false, false, None, reference_ms()), None);
    }

    fn response(stop: StopResult, visits: Vec<MonitoredStopVisit>) -> StopBubbleResponse {
        StopBubbleResponse {
            siri: SiriEnvelope {
                siri: Siri {
                    service_delivery: ServiceDelivery {
                        response_timestamp: Some("2024-05-01T12:00:00-04:00".to_string()),
                        vehicle_monitoring_delivery: Vec::new(),
                        stop_monitoring_delivery: vec![StopMonitoringDelivery {
                            monitored_stop_visit: visits,
                        }],
                        situation_exchange_delivery: Vec::new(),
                    },
                },
            },
            stop,
        }
    }

    #[test]
    fn sections_appear_in_contract_order() {
        let stop = stop(vec![
            route("MTA NYCT_A", "A", vec![("1", "X", true)]),
            route("MTA NYCT_B", "B", vec![("0", "UPTOWN", false)]),
            route("MTA NYCT_C", "C", vec![("0", "DOWNTOWN", true)]),
        ]);
        let response = response(stop, vec![visit("MTA NYCT_A", "A", "1", "X")]);
        let content = build_stop_content(
            &response,
            "container-1",
            &Config::default(),
            &Hooks::default(),
            None,
        );

        assert_eq!(content.kind, BubbleKind::Stop);
        assert_eq!(content.header.subtitle, "Stopcode 308209");
        let kinds: Vec<&str> = content
            .sections
            .iter()
            .map(|s| match s {
                Section::Arrivals(_) => "arrivals",
                Section::NoArrivals(_) => "no_arrivals",
                Section::NoService(_) => "no_service",
                Section::OtherRoutes { .. } => "other_routes",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["arrivals", "no_arrivals", "no_service"]);
    }

    #[test]
    fn stamp_ages_from_newest_visit() {
        let stop = stop(vec![route("MTA NYCT_A", "A", vec![("1", "X", true)])]);
        let response = response(stop, vec![visit("MTA NYCT_A", "A", "1", "X")]);
        let content = build_stop_content(
            &response,
            "container-1",
            &Config::default(),
            &Hooks::default(),
            None,
        );
        let updated = content.header.updated.unwrap();
        // visit recorded 20s before the response timestamp
        assert_eq!(updated.age_secs, 20.0);
        assert!(!updated.stale);
    }

    #[test]
    fn empty_visits_render_placeholder_sections_only() {
        let stop = stop(vec![route("MTA NYCT_A", "A", vec![("1", "X", true)])]);
        let response = response(stop, Vec::new());
        let content = build_stop_content(
            &response,
            "container-1",
            &Config::default(),
            &Hooks::default(),
            None,
        );
        assert_eq!(content.sections.len(), 1);
        assert!(matches!(&content.sections[0], Section::NoArrivals(h) if h.len() == 1));
        // with no visits the stamp falls back to the response timestamp
        assert_eq!(content.header.updated.unwrap().age_secs, 0.0);
    }
}

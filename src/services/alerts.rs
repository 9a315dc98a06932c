//! Correlation of service alerts to routes.
//!
//! The situation exchange delivery lists alerts with the vehicle journeys
//! they affect. Rendering only needs "does this route have an alert", so
//! the list is folded into a per-route index once per render.

use std::collections::HashMap;

use crate::providers::siri::{PtSituationElement, SituationExchangeDelivery};

/// route id -> situation number -> situation.
pub type AlertIndex = HashMap<String, HashMap<String, PtSituationElement>>;

/// Build the per-route alert index from a snapshot's situation list.
/// Situations naming no affected vehicle journeys are system-wide notices
/// and are skipped; so are situations without a number to key on.
pub fn build_alert_index(deliveries: &[SituationExchangeDelivery]) -> AlertIndex {
    let mut index: AlertIndex = HashMap::new();

    let situations = match deliveries.first().and_then(|d| d.situations.as_ref()) {
        Some(s) => &s.pt_situation_element,
        None => return index,
    };

    for situation in situations {
        let number = match &situation.situation_number {
            Some(n) => n,
            None => continue,
        };
        let journeys = match situation.affects.as_ref().and_then(|a| a.vehicle_journeys.as_ref()) {
            Some(j) => &j.affected_vehicle_journey,
            None => continue,
        };
        for journey in journeys {
            let line_ref = match &journey.line_ref {
                Some(l) => l,
                None => continue,
            };
            index
                .entry(line_ref.clone())
                .or_default()
                .entry(number.clone())
                .or_insert_with(|| situation.clone());
        }
    }

    index
}

//! HTML rendering of the content tree.
//!
//! The markup vocabulary (element structure and css classes) is the
//! contract with the embedding page's stylesheet, so the renderer is the
//! only place it appears.

use crate::models::content::{
    ArrivalGroup, ArrivalItem, AlertLink, BubbleContent, BubbleKind, DepartureQualifier, NextStops,
    OccupancyBadge, OccupancyLevel, RouteHeading, Section, UpdatedStamp,
};
use crate::util;

/// Render a bubble's content tree to markup.
pub fn render_html(content: &BubbleContent) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<div id=\"{}\" class=\"popup\">",
        escape(&content.container_id)
    ));

    let header_class = match content.kind {
        BubbleKind::Vehicle => "header vehicle",
        BubbleKind::Stop => "header stop",
    };
    html.push_str(&format!("<div class=\"{}\">", header_class));
    html.push_str(&format!("<p class=\"title\">{}</p><p>", escape(&content.header.title)));
    html.push_str(&format!("<span class=\"type\">{}</span>", escape(&content.header.subtitle)));
    if let Some(updated) = &content.header.updated {
        html.push_str(&updated_span(updated));
    }
    html.push_str("</p></div>");

    for section in &content.sections {
        html.push_str(&render_section(section));
    }

    if let Some(footer) = &content.footer_html {
        html.push_str(footer);
    }

    html.push_str("<ul class=\"links\"><a href=\"#\" id=\"zoomHere\">Center &amp; Zoom Here</a></ul>");
    html.push_str("</div>");
    html
}

/// The label text the one-second tick rewrites in place.
pub fn updated_label(age_secs: f64) -> String {
    format!("Data updated {}", util::display_time(age_secs))
}

fn updated_span(updated: &UpdatedStamp) -> String {
    let stale_class = if updated.stale { " stale" } else { "" };
    format!(
        "<span class=\"updated{}\" age=\"{}\" referenceEpoch=\"{}\">{}</span>",
        stale_class,
        updated.age_secs,
        updated.reference_epoch_ms,
        updated_label(updated.age_secs)
    )
}

fn render_section(section: &Section) -> String {
    match section {
        Section::Occupancy(badge) => format!(
            "<p><span class=\"service\">Occupancy: </span> <span class=\"occupancy\">{}</span> </p>",
            occupancy_html(badge)
        ),
        Section::NextStops(stops) => next_stops_html(stops),
        Section::VehicleAlert(link) => alert_link_html(link, &link.label),
        Section::Arrivals(groups) => arrivals_html(groups),
        Section::NoArrivals(headings) => no_arrivals_html(headings),
        Section::NoService(headings) => no_service_html(headings),
        Section::OtherRoutes { stop_code, short_names } => other_routes_html(stop_code, short_names),
    }
}

fn next_stops_html(stops: &NextStops) -> String {
    match stops {
        NextStops::Unknown => {
            "<p class=\"service\">Next stops are not known for this vehicle.</p>".to_string()
        }
        NextStops::NoStops => "<p class=\"service\">No stops... </p>".to_string(),
        NextStops::Calls(calls) => {
            let mut html = String::from("<p class=\"service\">Next stops:</p><ul>");
            for call in calls {
                let last_class = if call.last { " last" } else { "" };
                let mut detail = String::new();
                if let Some(eta) = &call.eta {
                    detail.push_str(&escape(eta));
                    if call.distance.is_some() {
                        detail.push_str(", ");
                    }
                }
                if let Some(distance) = &call.distance {
                    detail.push_str(&escape(distance));
                }
                html.push_str(&format!(
                    "<li class=\"nextStop{}\"><a href=\"#{}\">{}</a><span>{}</span></li>",
                    last_class,
                    escape(&call.stop_code),
                    escape(&call.name),
                    detail
                ));
            }
            html.push_str("</ul>");
            html
        }
    }
}

fn alert_link_html(link: &AlertLink, text: &str) -> String {
    format!(
        " <a id=\"alert-link|{}|{}|{}\" class=\"alert-link\" href=\"#\">{}</a>",
        link.stop_code.as_deref().map(escape).unwrap_or_default(),
        escape(&link.route_id),
        link.route_short_name.as_deref().map(escape).unwrap_or_default(),
        escape(text)
    )
}

fn route_link_html(heading: &RouteHeading, muted: bool, with_destination: bool) -> String {
    let muted_class = if muted { " class=\"muted\"" } else { "" };
    let destination = if with_destination {
        heading
            .destination
            .as_deref()
            .map(|d| format!("&nbsp;&nbsp; {}", escape(d)))
            .unwrap_or_default()
    } else {
        String::new()
    };
    format!(
        "<a{} href=\"#{}%20{}\"><span class=\"route-name\">{}</span>{}</a>",
        muted_class,
        escape(&heading.stop_code),
        escape(&heading.short_name),
        escape(&heading.short_name),
        destination
    )
}

fn arrivals_html(groups: &[ArrivalGroup]) -> String {
    let mut html = String::from("<p class=\"service\">Buses en-route:</p>");
    for group in groups {
        html.push_str("<ul>");
        html.push_str("<li class=\"route\">");
        html.push_str(&route_link_html(&group.heading, false, true));
        if let Some(alert) = &group.heading.alert {
            html.push_str(&alert_link_html(alert, &alert.label));
        }
        html.push_str("</li>");
        for item in &group.items {
            html.push_str(&arrival_item_html(item));
        }
        html.push_str("</ul>");
    }
    html
}

fn arrival_item_html(item: &ArrivalItem) -> String {
    // the distance part carries the occupancy badge and the optional
    // vehicle id; in time mode it trails the minutes estimate
    let mut distance_part = item.distance.as_deref().map(escape).unwrap_or_default();
    if let Some(badge) = &item.occupancy {
        distance_part.push_str(&occupancy_html(badge));
    }
    if let Some(vehicle_id) = &item.vehicle_id {
        distance_part.push_str(&format!(
            "<span class=\"vehicleId\"> (#{})</span>",
            escape(vehicle_id)
        ));
    }

    let mut text = match &item.eta {
        Some(eta) => format!("{}, {}", escape(eta), distance_part),
        None => distance_part,
    };
    if let Some(qualifier) = &item.qualifier {
        text.push_str(&qualifier_html(qualifier));
    }
    if item.estimated {
        text.push_str(" (Estimated)");
    }

    let arrival_class = if item.estimated { "scheduled_arrival" } else { "arrival" };
    let last_class = if item.last { " last" } else { "" };
    format!("<li class=\"{}{}\">{}</li>", arrival_class, last_class, text)
}

fn qualifier_html(qualifier: &DepartureQualifier) -> String {
    let text = match qualifier {
        DepartureQualifier::LayoverOnSchedule(time) => {
            format!("(at terminal, scheduled to depart at {})", escape(time))
        }
        DepartureQualifier::LayoverLate => "(at terminal)".to_string(),
        DepartureQualifier::PrevTripOnSchedule(time) => {
            format!("(+layover, scheduled to depart terminal at {})", escape(time))
        }
        DepartureQualifier::PrevTripLate => "(+ scheduled layover at terminal)".to_string(),
    };
    format!(" <span class=\"not_bold\">{}</span>", text)
}

fn no_arrivals_html(headings: &[RouteHeading]) -> String {
    let mut html =
        String::from("<p class=\"service muted\">No buses en-route to this stop for:</p><ul>");
    for heading in headings {
        html.push_str("<li class=\"route\">");
        html.push_str(&route_link_html(heading, true, true));
        if let Some(alert) = &heading.alert {
            html.push_str(&alert_link_html(alert, &alert.label));
        }
        html.push_str("</li>");
    }
    html.push_str("<li class=\"last muted\">(check back shortly for an update)</li></ul>");
    html
}

fn no_service_html(headings: &[RouteHeading]) -> String {
    let mut html = String::from(
        "<p class=\"service muted\">No scheduled service at this time for:</p><ul class=\"no-service-routes\">",
    );
    for heading in headings {
        html.push_str("<li class=\"route\">");
        html.push_str(&route_link_html(heading, true, false));
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

fn other_routes_html(stop_code: &str, short_names: &[String]) -> String {
    let mut html = String::from(
        "<div class=\"popup-filtered-matches\"><h2 class=\"service\">Other Routes Here:</h2><ul>",
    );
    for short_name in short_names {
        html.push_str(&format!(
            "<li class=\"filtered-match\"><a href=\"#{}%20{}\"><span class=\"route-name\">{}</span></a></li>",
            escape(stop_code),
            escape(short_name),
            escape(short_name)
        ));
    }
    // the trailing link clears the filter
    html.push_str(&format!(
        "<li class=\"filtered-match\"><a href=\"#{}\"><span class=\"route-name\">See&nbsp;All</span></a></li>",
        escape(stop_code)
    ));
    html.push_str("</ul></div>");
    html
}

fn occupancy_html(badge: &OccupancyBadge) -> String {
    match badge {
        OccupancyBadge::Occupancy { level, dashed } => match level {
            Some(level) => {
                let (suffix, text) = match level {
                    OccupancyLevel::Low => ("G", "Seats Available"),
                    OccupancyLevel::Medium => ("Y", "Limited Seating"),
                    OccupancyLevel::High => ("R", "Standing Room Only"),
                };
                let mut html = format!(
                    "<span class=\"apcDot{}\"></span><span id=\"apcText{}\">{}</span>",
                    suffix, suffix, text
                );
                if *dashed {
                    html.push_str(&dashed_line_div(suffix));
                }
                html
            }
            None => "N/A".to_string(),
        },
        OccupancyBadge::LoadFactor { level, dashed } => match level {
            Some(level) => {
                let (suffix, text) = load_factor_text(*level);
                let mut html = format!(" <span id=\"apcText{}\">{}</span>", suffix, text);
                if *dashed {
                    html.push_str(&format!(
                        " <span class=\"apcDashedLine\"><img src=\"img/occupancy/apcLoad{}.png\"></span>",
                        suffix
                    ));
                }
                html
            }
            None => "N/A".to_string(),
        },
        OccupancyBadge::PassengerCount { count } => {
            format!(" <span>~{} passengers on vehicle</span>", count)
        }
        OccupancyBadge::LoadFactorCount { level, count, dashed } => match level {
            Some(level) => {
                let (suffix, text) = load_factor_text(*level);
                let mut html = format!(
                    "<span id=\"apcText{}\">{} ({} Passengers)</span>",
                    suffix, text, count
                );
                if *dashed {
                    html.push_str(&dashed_line_div(suffix));
                }
                html
            }
            None => "N/A".to_string(),
        },
    }
}

fn load_factor_text(level: OccupancyLevel) -> (&'static str, &'static str) {
    match level {
        OccupancyLevel::Low => ("G", "Low"),
        OccupancyLevel::Medium => ("Y", "Medium"),
        OccupancyLevel::High => ("R", "High"),
    }
}

fn dashed_line_div(suffix: &str) -> String {
    format!(
        "<div class=\"apcDashedLine\"><img src=\"img/occupancy/apcLoad{}.png\"></div>",
        suffix
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

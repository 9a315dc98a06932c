//! Typed content tree for bubbles.
//!
//! Content builders produce a [`BubbleContent`] value; the rendering layer
//! turns it into markup. Section order in the tree is render order.

/// Which kind of bubble the content describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Vehicle,
    Stop,
}

#[derive(Debug, Clone)]
pub struct BubbleContent {
    /// Id of the container element, generated per opened popup.
    pub container_id: String,
    pub kind: BubbleKind,
    pub header: Header,
    pub sections: Vec<Section>,
    /// Caller-supplied footer markup, appended verbatim.
    pub footer_html: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Header {
    /// Route + destination for vehicles, stop name for stops.
    pub title: String,
    /// "Vehicle #7421" or "Stopcode 308209".
    pub subtitle: String,
    pub updated: Option<UpdatedStamp>,
}

/// The "Data updated N ago" stamp. `reference_epoch_ms` is the wall clock
/// at render time; the one-second tick ages the label from it without
/// refetching.
#[derive(Debug, Clone, Copy)]
pub struct UpdatedStamp {
    pub age_secs: f64,
    pub stale: bool,
    pub reference_epoch_ms: i64,
}

#[derive(Debug, Clone)]
pub enum Section {
    /// Vehicle bubble occupancy paragraph.
    Occupancy(OccupancyBadge),
    /// Vehicle bubble onward stops.
    NextStops(NextStops),
    /// Vehicle bubble service alert link.
    VehicleAlert(AlertLink),
    /// Stop bubble "Buses en-route:" groups.
    Arrivals(Vec<ArrivalGroup>),
    /// Stop bubble routes with scheduled service but nothing tracked yet.
    NoArrivals(Vec<RouteHeading>),
    /// Stop bubble routes with no scheduled service at this time.
    NoService(Vec<RouteHeading>),
    /// Routes excluded by an active route filter.
    OtherRoutes { stop_code: String, short_names: Vec<String> },
}

#[derive(Debug, Clone)]
pub enum NextStops {
    /// The vehicle has no call data at all.
    Unknown,
    /// Onward calls are present but the call list is missing.
    NoStops,
    Calls(Vec<NextStop>),
}

#[derive(Debug, Clone)]
pub struct NextStop {
    pub stop_code: String,
    pub name: String,
    /// "N minutes" estimate, absent when no prediction exists.
    pub eta: Option<String>,
    pub distance: Option<String>,
    pub last: bool,
}

/// A clickable service alert link. Clicks either reveal an already
/// rendered alert panel for the route or fall back to navigation.
#[derive(Debug, Clone)]
pub struct AlertLink {
    pub stop_code: Option<String>,
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub label: String,
}

/// A route line within a stop bubble section.
#[derive(Debug, Clone)]
pub struct RouteHeading {
    pub stop_code: String,
    pub short_name: String,
    pub destination: Option<String>,
    pub alert: Option<AlertLink>,
}

#[derive(Debug, Clone)]
pub struct ArrivalGroup {
    pub heading: RouteHeading,
    pub items: Vec<ArrivalItem>,
}

/// One tracked vehicle within an arrival group.
#[derive(Debug, Clone)]
pub struct ArrivalItem {
    /// Minutes-until text. When present the line leads with it; otherwise
    /// the distance alone is the primary rendering.
    pub eta: Option<String>,
    pub distance: Option<String>,
    pub occupancy: Option<OccupancyBadge>,
    /// Short vehicle id, shown when configured.
    pub vehicle_id: Option<String>,
    pub qualifier: Option<DepartureQualifier>,
    /// Schedule-derived prediction: styled as a scheduled arrival and
    /// suffixed "(Estimated)".
    pub estimated: bool,
    pub last: bool,
}

/// Layover and previous-trip annotations on an arrival line. The
/// on-schedule variants carry the formatted departure time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartureQualifier {
    LayoverOnSchedule(String),
    LayoverLate,
    PrevTripOnSchedule(String),
    PrevTripLate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyLevel {
    Low,
    Medium,
    High,
}

/// Occupancy rendering, one variant per display mode. A `None` level means
/// the feed sent a value outside the known vocabulary; it renders as
/// "N/A". The dashed variants add the load image used in vehicle bubbles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupancyBadge {
    Occupancy { level: Option<OccupancyLevel>, dashed: bool },
    LoadFactor { level: Option<OccupancyLevel>, dashed: bool },
    PassengerCount { count: u32 },
    LoadFactorCount { level: Option<OccupancyLevel>, count: u32, dashed: bool },
}

impl BubbleContent {
    /// All alert links in the content, in render order. Used to wire click
    /// handling after a render.
    pub fn alert_links(&self) -> Vec<&AlertLink> {
        let mut links = Vec::new();
        for section in &self.sections {
            match section {
                Section::VehicleAlert(link) => links.push(link),
                Section::Arrivals(groups) => {
                    links.extend(groups.iter().filter_map(|g| g.heading.alert.as_ref()))
                }
                Section::NoArrivals(headings) => {
                    links.extend(headings.iter().filter_map(|h| h.alert.as_ref()))
                }
                _ => {}
            }
        }
        links
    }
}

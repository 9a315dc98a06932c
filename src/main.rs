//! Terminal harness for watching a stop bubble against a live feed.
//!
//! Renders the bubble markup to stdout instead of a map widget. Useful
//! for poking at a feed without a browser:
//!
//! ```text
//! STOP_ID=MTA_308209 FEED_URL=https://host/api/siri/stop-monitoring.json cargo run
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stopbubble::config::Config;
use stopbubble::map::{MapView, Marker, PopupWindow, WindowFactory};
use stopbubble::providers::siri::FeedClient;
use stopbubble::services::stop_bubble::StopContentBuilder;
use stopbubble::session::{Hooks, PopupSession};

struct ConsoleMarker {
    id: String,
}

impl Marker for ConsoleMarker {
    fn subject_id(&self) -> &str {
        &self.id
    }
    fn position(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
    fn icon_height(&self) -> u32 {
        32
    }
    fn set_visible(&self, _visible: bool) {}
}

struct ConsoleMap;

impl MapView for ConsoleMap {
    fn set_center(&self, position: (f64, f64)) {
        tracing::info!(?position, "map recentered");
    }
    fn set_zoom(&self, level: u8) {
        tracing::info!(level, "map zoomed");
    }
}

struct ConsoleWindow;

impl PopupWindow for ConsoleWindow {
    fn open(&self) {
        tracing::info!("bubble opened");
    }
    fn close(&self) {
        tracing::info!("bubble closed");
    }
    fn set_content(&self, html: &str) {
        println!("{}", html);
    }
    fn content_size(&self) -> (u32, u32) {
        (0, 0)
    }
    fn clamp_height(&self, _height: u32) {}
    fn clamp_width(&self, _width: u32) {}
    fn scroll_top(&self) -> u32 {
        0
    }
    fn set_scroll_top(&self, _offset: u32) {}
    fn set_updated_label(&self, text: &str) {
        tracing::debug!(text, "stamp tick");
    }
}

struct ConsoleWindows;

impl WindowFactory for ConsoleWindows {
    fn create(&self, _pixel_offset_y: i32, subject_id: &str) -> Arc<dyn PopupWindow> {
        tracing::info!(subject_id, "bubble created");
        Arc::new(ConsoleWindow)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::load("config.yaml") {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "No usable config.yaml, using defaults");
            Config::default()
        }
    };

    let endpoint = std::env::var("FEED_URL")
        .unwrap_or_else(|_| "http://localhost:8080/api/siri/stop-monitoring.json".to_string());
    let stop_id = std::env::var("STOP_ID").unwrap_or_else(|_| "MTA_308209".to_string());
    tracing::info!(endpoint = %endpoint, stop_id = %stop_id, "Watching stop bubble");

    let transport = FeedClient::new(
        Duration::from_secs(config.fetch_timeout_secs),
        Duration::from_secs(config.connect_timeout_secs),
    )
    .expect("Failed to build feed client");

    let config = Arc::new(config);
    let hooks = Arc::new(Hooks::default());
    let session = Arc::new(PopupSession::new(
        config.clone(),
        Arc::new(transport),
        Arc::new(ConsoleWindows),
        Arc::new(ConsoleMap),
        hooks.clone(),
    ));

    session.open_live_popup(
        Arc::new(ConsoleMarker { id: stop_id.clone() }),
        &endpoint,
        vec![
            ("MonitoringRef".to_string(), stop_id),
            ("StopMonitoringDetailLevel".to_string(), "normal".to_string()),
        ],
        Arc::new(StopContentBuilder {
            config: config.clone(),
            hooks,
        }),
        None,
    );

    let timers = session.spawn_timers();

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c");
    session.close_popup();
    timers.shutdown();
}

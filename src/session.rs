//! Popup session and refresh scheduling.
//!
//! One session owns at most one open bubble. Opening a bubble closes the
//! previous one; the periodic refresh and the one-second timestamp tick
//! only ever act on the currently open bubble. At most one refresh fetch
//! is in flight at a time: starting a refresh aborts a still-pending
//! predecessor. A response that arrives for a bubble that has since been
//! closed or replaced is detected by a generation check and dropped
//! without touching the window.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::config::Config;
use crate::map::{MapView, Marker, PopupWindow, WindowFactory};
use crate::models::content::{AlertLink, BubbleContent, BubbleKind};
use crate::providers::siri::{refresh_params, FeedError, FeedTransport};
use crate::render;

/// Zoom level applied by the "Center & Zoom Here" action.
const ZOOM_HERE_LEVEL: u8 = 16;

/// Content box bounds. Content exceeding a bound is clamped and the
/// affected axis switched to clipped or scrollable layout.
const MAX_CONTENT_HEIGHT: u32 = 300;
const CLAMPED_CONTENT_HEIGHT: u32 = 280;
const MAX_CONTENT_WIDTH: u32 = 500;
const CLAMPED_CONTENT_WIDTH: u32 = 480;

/// What a footer hook is being asked to decorate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooterSubject {
    Route,
    Stop,
}

pub type FooterFn = Box<dyn Fn(FooterSubject, &str) -> Option<String> + Send + Sync>;
/// Navigation callback for alert deep-links; receives the stop code and
/// the route short name.
pub type NavigateFn = Box<dyn Fn(&str, &str) + Send + Sync>;
pub type StopBubbleTrigger = Box<dyn Fn() + Send + Sync>;

/// Alert panels already rendered elsewhere on the page. When a clicked
/// alert link's route has one, the panel is revealed in place instead of
/// navigating.
pub trait AlertPanelHost: Send + Sync {
    fn has_panel(&self, route_id: &str) -> bool;
    fn reveal(&self, route_id: &str);
}

/// Outbound hooks supplied by the embedder.
#[derive(Default)]
pub struct Hooks {
    pub footer: Option<FooterFn>,
    pub navigate: Option<NavigateFn>,
    pub alert_panels: Option<Box<dyn AlertPanelHost>>,
}

/// Builds bubble content from a fetched payload. Returning `None` means
/// the payload had nothing to show; the bubble is emptied, not errored.
pub trait ContentBuilder: Send + Sync {
    fn build(
        &self,
        payload: &Value,
        container_id: &str,
        marker: &dyn Marker,
        route_filter: Option<&str>,
    ) -> Option<BubbleContent>;
}

struct RefreshOp {
    endpoint: String,
    params: Vec<(String, String)>,
    builder: Arc<dyn ContentBuilder>,
    route_filter: Option<String>,
    marker: Arc<dyn Marker>,
    window: Arc<dyn PopupWindow>,
    container_id: String,
    generation: u64,
}

struct StampState {
    age_secs: f64,
    captured: Instant,
}

#[derive(Default)]
struct SessionState {
    window: Option<Arc<dyn PopupWindow>>,
    marker: Option<Arc<dyn Marker>>,
    subject_id: Option<String>,
    refresh: Option<Arc<RefreshOp>>,
    in_flight: Option<AbortHandle>,
    stamp: Option<StampState>,
    /// Bumped whenever the active popup changes. Refresh completions
    /// carry the generation they were started under and are dropped on
    /// mismatch.
    generation: u64,
}

pub struct PopupSession {
    config: Arc<Config>,
    transport: Arc<dyn FeedTransport>,
    windows: Arc<dyn WindowFactory>,
    map: Arc<dyn MapView>,
    hooks: Arc<Hooks>,
    state: Mutex<SessionState>,
    stop_bubble_listener: Mutex<Option<StopBubbleTrigger>>,
}

/// Handles of the two periodic loops, so an embedder can shut them down.
pub struct SessionTimers {
    pub refresh: JoinHandle<()>,
    pub ticker: JoinHandle<()>,
}

impl SessionTimers {
    pub fn shutdown(self) {
        self.refresh.abort();
        self.ticker.abort();
    }
}

impl PopupSession {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn FeedTransport>,
        windows: Arc<dyn WindowFactory>,
        map: Arc<dyn MapView>,
        hooks: Arc<Hooks>,
    ) -> Self {
        Self {
            config,
            transport,
            windows,
            map,
            hooks,
            state: Mutex::new(SessionState::default()),
            stop_bubble_listener: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a bubble with fixed content and no refresh loop.
    pub fn open_static_popup(&self, marker: Arc<dyn Marker>, html: &str) {
        let mut state = self.lock_state();
        close_locked(&mut state);

        let window = self
            .windows
            .create((marker.icon_height() / 2) as i32, marker.subject_id());
        window.set_content(html);
        window.open();

        state.subject_id = Some(marker.subject_id().to_string());
        state.window = Some(window);
        state.marker = Some(marker);
    }

    /// Open a bubble fed from the realtime endpoint. The first refresh
    /// opens the bubble; the periodic timer then updates it in place.
    pub fn open_live_popup(
        self: &Arc<Self>,
        marker: Arc<dyn Marker>,
        endpoint: &str,
        params: Vec<(String, String)>,
        builder: Arc<dyn ContentBuilder>,
        route_filter: Option<String>,
    ) {
        let op = {
            let mut state = self.lock_state();
            close_locked(&mut state);

            let window = self
                .windows
                .create((marker.icon_height() / 2) as i32, marker.subject_id());
            let container_id = format!("container-{}", Uuid::new_v4().simple());
            let op = Arc::new(RefreshOp {
                endpoint: endpoint.to_string(),
                params,
                builder,
                route_filter,
                marker: marker.clone(),
                window: window.clone(),
                container_id,
                generation: state.generation,
            });

            state.subject_id = Some(marker.subject_id().to_string());
            state.window = Some(window);
            state.marker = Some(marker);
            state.refresh = Some(op.clone());
            op
        };
        self.start_refresh(op, true);
    }

    /// Run the active bubble's refresh operation, if there is one. Called
    /// by the periodic timer; also useful to force an immediate update.
    pub fn refresh_now(self: &Arc<Self>) {
        let op = self.lock_state().refresh.clone();
        if let Some(op) = op {
            self.start_refresh(op, false);
        }
    }

    fn start_refresh(self: &Arc<Self>, op: Arc<RefreshOp>, mut open_bubble: bool) {
        let params = refresh_params(&op.params, self.config.time_override_ms);
        let fetch = self.transport.get_json(&op.endpoint, params);

        let mut state = self.lock_state();
        if state.generation != op.generation {
            return;
        }
        // one fetch in flight at a time; the superseded request's bubble
        // opening falls to the request replacing it
        if let Some(pending) = state.in_flight.take() {
            pending.abort();
            open_bubble = true;
        }

        let session = self.clone();
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            session.finish_refresh(op, open_bubble, result);
        });
        state.in_flight = Some(handle.abort_handle());
    }

    fn finish_refresh(&self, op: Arc<RefreshOp>, open_bubble: bool, result: Result<Value, FeedError>) {
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                // the next tick self-heals; nothing to surface
                tracing::debug!(endpoint = %op.endpoint, error = %e, "Refresh fetch failed");
                let mut state = self.lock_state();
                if state.generation == op.generation {
                    state.in_flight = None;
                }
                return;
            }
        };

        let mut fire_stop_trigger = false;
        {
            let mut state = self.lock_state();
            // the bubble this response belongs to may be gone
            if state.generation != op.generation || state.window.is_none() {
                return;
            }
            state.in_flight = None;

            let scroll = op.window.scroll_top();
            let content = op.builder.build(
                &payload,
                &op.container_id,
                op.marker.as_ref(),
                op.route_filter.as_deref(),
            );

            match content {
                Some(content) => {
                    let html = render::render_html(&content);
                    op.window.set_content(&html);
                    if open_bubble {
                        op.window.open();
                    }

                    let (width, height) = op.window.content_size();
                    let mut resized = false;
                    if height > MAX_CONTENT_HEIGHT {
                        op.window.clamp_height(CLAMPED_CONTENT_HEIGHT);
                        resized = true;
                    }
                    if width > MAX_CONTENT_WIDTH {
                        op.window.clamp_width(CLAMPED_CONTENT_WIDTH);
                        resized = true;
                    }
                    if resized {
                        op.window.set_content(&html);
                        op.window.open();
                    }
                    op.window.set_scroll_top(scroll);

                    state.stamp = content.header.updated.map(|updated| StampState {
                        age_secs: updated.age_secs,
                        captured: Instant::now(),
                    });
                    fire_stop_trigger = content.kind == BubbleKind::Stop;
                }
                None => {
                    op.window.set_content("");
                    if open_bubble {
                        op.window.open();
                    }
                    state.stamp = None;
                }
            }
        }

        if fire_stop_trigger {
            let listener = self
                .stop_bubble_listener
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(trigger) = listener.as_ref() {
                trigger();
            }
        }
    }

    /// Rewrite the "Data updated N ago" label from the captured reference
    /// instant. Called by the one-second tick; never fetches.
    pub fn update_timestamp(&self) {
        let state = self.lock_state();
        if let (Some(window), Some(stamp)) = (state.window.as_ref(), state.stamp.as_ref()) {
            let age = stamp.age_secs + stamp.captured.elapsed().as_secs_f64();
            window.set_updated_label(&render::updated_label(age));
        }
    }

    /// Close the active bubble. Safe to call when none is open, and safe
    /// to call repeatedly; the widget's close-intent event should land
    /// here.
    pub fn close_popup(&self) {
        let mut state = self.lock_state();
        close_locked(&mut state);
    }

    pub fn reset(&self) {
        self.close_popup();
    }

    /// The identifier the active bubble is anchored to.
    pub fn active_subject_id(&self) -> Option<String> {
        self.lock_state().subject_id.clone()
    }

    /// Resolve a click on an alert link: reveal the page's alert panel for
    /// the route when one exists, otherwise navigate.
    pub fn handle_alert_link(&self, link: &AlertLink) {
        if let Some(panels) = &self.hooks.alert_panels {
            if panels.has_panel(&link.route_id) {
                panels.reveal(&link.route_id);
                return;
            }
        }
        if let Some(navigate) = &self.hooks.navigate {
            navigate(
                link.stop_code.as_deref().unwrap_or(""),
                link.route_short_name.as_deref().unwrap_or(""),
            );
        }
    }

    /// Recenter the map on the active bubble's marker and zoom in.
    pub fn zoom_here(&self) {
        let marker = self.lock_state().marker.clone();
        if let Some(marker) = marker {
            self.map.set_center(marker.position());
            self.map.set_zoom(ZOOM_HERE_LEVEL);
        }
    }

    /// Register the external observer fired after every stop bubble
    /// render. Only one observer is tracked; a new registration replaces
    /// the previous one.
    pub fn register_stop_bubble_listener(&self, trigger: StopBubbleTrigger) {
        *self
            .stop_bubble_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(trigger);
    }

    pub fn unregister_stop_bubble_listener(&self) {
        *self
            .stop_bubble_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Spawn the periodic refresh loop and the one-second timestamp tick.
    /// Both are no-ops while no bubble is open.
    pub fn spawn_timers(self: &Arc<Self>) -> SessionTimers {
        let refresh_session = self.clone();
        let refresh = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                refresh_session.config.refresh_interval_secs.max(1),
            ));
            // skip the immediate first tick; opening a bubble already ran
            // its first refresh
            interval.tick().await;
            loop {
                interval.tick().await;
                refresh_session.refresh_now();
            }
        });

        let tick_session = self.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                tick_session.update_timestamp();
            }
        });

        SessionTimers { refresh, ticker }
    }
}

fn close_locked(state: &mut SessionState) {
    if let Some(window) = state.window.take() {
        window.close();
    }
    state.marker = None;
    state.subject_id = None;
    state.refresh = None;
    state.stamp = None;
    // the in-flight handle is kept: its completion is dropped by the
    // generation check, and the next refresh aborts it if still pending
    state.generation += 1;
}

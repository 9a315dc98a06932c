//! Seams to the map widget. The widget itself (marker placement, pixel
//! geometry, pan and zoom, the info-window primitive) lives outside this
//! crate; the session drives it through these traits.

use std::sync::Arc;

/// A marker a bubble can be anchored to. Stop markers may start hidden and
/// are made visible when their bubble is first rendered.
pub trait Marker: Send + Sync {
    /// The stop or vehicle identifier this marker represents.
    fn subject_id(&self) -> &str;
    /// (longitude, latitude) of the marker.
    fn position(&self) -> (f64, f64);
    /// Height in pixels of the marker icon, used to offset the bubble.
    fn icon_height(&self) -> u32;
    fn set_visible(&self, visible: bool);
}

/// The map view hosting the markers.
pub trait MapView: Send + Sync {
    fn set_center(&self, position: (f64, f64));
    fn set_zoom(&self, level: u8);
}

/// An info-window instance created by the widget. The widget owns layout
/// and events; the session owns content and lifecycle. The widget's
/// close-intent event must be wired back to `PopupSession::close_popup`.
pub trait PopupWindow: Send + Sync {
    fn open(&self);
    fn close(&self);
    fn set_content(&self, html: &str);
    /// (width, height) in pixels of the content as last laid out.
    fn content_size(&self) -> (u32, u32);
    /// Clamp the content box height and make the vertical axis scrollable.
    fn clamp_height(&self, height: u32);
    /// Clamp the content box width and clip the horizontal axis.
    fn clamp_width(&self, width: u32);
    fn scroll_top(&self) -> u32;
    fn set_scroll_top(&self, offset: u32);
    /// Rewrite only the "Data updated ..." label without re-rendering.
    fn set_updated_label(&self, text: &str);
}

/// Creates info-windows. One window is created per opened bubble.
pub trait WindowFactory: Send + Sync {
    /// `pixel_offset_y` positions the bubble above the marker icon;
    /// `subject_id` is retained so the widget can lock the icon on the map
    /// while its bubble is open.
    fn create(&self, pixel_offset_y: i32, subject_id: &str) -> Arc<dyn PopupWindow>;
}

//! Interactive information bubbles for a transit map.
//!
//! A [`session::PopupSession`] anchors at most one bubble to a map marker,
//! fetches live vehicle or stop data from a SIRI-like realtime feed
//! through [`providers::siri`], shapes it into a typed content tree via
//! the builders in [`services`], renders it with [`render`] and keeps it
//! fresh on a periodic timer. The map widget, the page router and the
//! surrounding document are reached only through the traits in [`map`]
//! and the hooks in [`session`].

pub mod config;
pub mod map;
pub mod models;
pub mod providers;
pub mod render;
pub mod services;
pub mod session;
pub mod util;

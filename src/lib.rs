//! # paperdash
//!
//! Backend for a wall-mounted e-ink dashboard.
//!
//! The server periodically pulls weather data from Open-Meteo and calendar
//! events from one or more CalDAV servers for each configured user, keeps the
//! combined result in an in-memory snapshot store, and renders it to a
//! 960x540 PNG on request. The embedded display client only ever fetches that
//! PNG over HTTP and sleeps between fetches.
//!
//! ## Pipeline
//!
//! ```text
//! refresh loop -> per user -> weather fetch (Open-Meteo)
//!                          -> agenda fetch -> per CalDAV source -> raw .ics
//!                             occurrences -> normalize -> bucket/dedup/sort
//!                          -> UserSnapshot, published atomically
//! serving path -> read snapshot -> dashboard HTML -> Chrome headless -> PNG
//! ```
//!
//! The interesting part is the calendar pipeline in [`event`] and [`agenda`]:
//! recurrence-override reconciliation, all-day vs. timed classification,
//! timezone localization into the user's zone, per-day deduplication, and
//! per-source failure isolation. Everything else is plumbing around it.
//!
//! ## Failure tiers
//!
//! - a malformed event instance is skipped and logged, never user-visible
//! - a failing CalDAV source becomes one `ERR` line in that user's today list
//! - a failing user keeps their previous snapshot for the cycle
//! - a failing weather fetch renders as placeholder values
//!
//! Nothing propagates far enough to take down the serving process.

pub mod agenda;
pub mod caldav;
pub mod config;
pub mod error;
pub mod event;
pub mod render;
pub mod server;
pub mod snapshot;
pub mod weather;

pub use agenda::Agenda;
pub use caldav::SourceError;
pub use config::{AppConfig, UserConfig};
pub use error::Error;
pub use event::EventEntry;
pub use snapshot::{SnapshotStore, UserSnapshot};
pub use weather::WeatherReport;

/// Display width in pixels (M5Paper-class panel, landscape).
pub const DISPLAY_WIDTH: u32 = 960;

/// Display height in pixels.
pub const DISPLAY_HEIGHT: u32 = 540;

/// Connect/read timeout for CalDAV requests, per source.
pub const CALDAV_TIMEOUT_SECS: u64 = 30;

/// Timeout for the Open-Meteo forecast request.
pub const WEATHER_TIMEOUT_SECS: u64 = 10;

/// Timeout for the Open-Meteo geocoding request.
pub const GEOCODE_TIMEOUT_SECS: u64 = 5;

/// Default interval between refresh cycles when the config omits one.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10 * 60;

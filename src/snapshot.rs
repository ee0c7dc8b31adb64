//! The published snapshot store and the refresh orchestrator.
//!
//! One background task rebuilds every user's snapshot on a fixed interval
//! and publishes the whole map at once; the serving path only ever reads.
//! Readers can never observe a half-updated map, and a user whose refresh
//! fails keeps their previous snapshot visible for the cycle instead of
//! blocking the other users.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Serialize, Serializer};

use crate::agenda::{self, DayWindow};
use crate::config::{AppConfig, UserConfig};
use crate::event::EventEntry;
use crate::weather::{self, WeatherReport};

fn serialize_tz<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

/// Everything the renderer needs for one user, frozen at refresh time.
#[derive(Debug, Clone, Serialize)]
pub struct UserSnapshot {
    /// Weather result, or `None` when the fetch failed this cycle.
    pub weather: Option<WeatherReport>,
    /// Error entries, then all-day, then timed events for today.
    pub today: Vec<EventEntry>,
    /// All-day then timed events for tomorrow.
    pub tomorrow: Vec<EventEntry>,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    pub last_updated: DateTime<Utc>,
}

/// Process-wide snapshot map, keyed by user id.
///
/// Starts empty; the first synchronous refresh populates it before the
/// server accepts traffic. Writers replace the map wholesale under the
/// lock, readers get an `Arc` clone and never a mutable reference.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<HashMap<String, Arc<UserSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> SnapshotStore {
        SnapshotStore::default()
    }

    /// Current snapshot for a user, or `None` before the first successful
    /// refresh for them.
    pub fn get(&self, user_id: &str) -> Option<Arc<UserSnapshot>> {
        // A poisoned lock only means a writer panicked mid-swap of a
        // HashMap, which leaves it structurally intact; keep serving.
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(user_id).cloned()
    }

    /// Atomically replace the published map.
    pub fn publish(&self, snapshots: HashMap<String, Arc<UserSnapshot>>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *map = snapshots;
    }
}

/// Refresh every configured user and publish the result as one atomic
/// swap. Users are refreshed independently: a failing user keeps their
/// previously published snapshot (if any) for this cycle.
pub async fn refresh_all(http: &Client, config: &AppConfig, store: &SnapshotStore) {
    let started = std::time::Instant::now();
    let mut next: HashMap<String, Arc<UserSnapshot>> = HashMap::new();

    for (user_id, user) in &config.users {
        tracing::info!(user = %user_id, "refreshing");
        match refresh_user(http, user).await {
            Some(snapshot) => {
                next.insert(user_id.clone(), Arc::new(snapshot));
            }
            None => match store.get(user_id) {
                Some(previous) => {
                    tracing::warn!(user = %user_id, "refresh failed, keeping previous snapshot");
                    next.insert(user_id.clone(), previous);
                }
                None => {
                    tracing::error!(user = %user_id, "refresh failed with no previous snapshot");
                }
            },
        }
    }

    store.publish(next);
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "refresh cycle complete");
}

/// Build one user's snapshot. Weather failures downgrade to `None`;
/// returns `None` only when the user's local midnight cannot be resolved,
/// which leaves the previous snapshot in place.
async fn refresh_user(http: &Client, user: &UserConfig) -> Option<UserSnapshot> {
    let weather = match weather::fetch(http, &user.weather_location, user.timezone.name()).await {
        Ok(report) => Some(report),
        Err(err) => {
            tracing::warn!(location = %user.weather_location, "weather fetch failed: {}", err);
            None
        }
    };

    let now = Utc::now().with_timezone(&user.timezone);
    let Some(midnight) = local_midnight(now) else {
        tracing::error!(timezone = %user.timezone, "could not resolve local midnight");
        return None;
    };
    let window = DayWindow::from_midnight(midnight);

    let agenda = agenda::fetch(
        http,
        &user.caldav_urls,
        user.calendar_filters.as_ref(),
        window,
        user.timezone,
    )
    .await;

    Some(UserSnapshot {
        weather,
        today: agenda.today,
        tomorrow: agenda.tomorrow,
        timezone: user.timezone,
        last_updated: Utc::now(),
    })
}

/// Start of the current local day, rolling forward when the zone skips
/// midnight on a DST day. Shares the rule all-day events use so the
/// window anchor and their sort keys agree.
fn local_midnight(now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    crate::event::day_start_in(now.timezone(), now.date_naive())
}

/// Run [`refresh_all`] forever on the configured interval. The caller is
/// expected to have done the initial synchronous refresh already; the
/// first tick here fires after one full interval.
pub async fn run_refresh_loop(http: Client, config: Arc<AppConfig>, store: Arc<SnapshotStore>) {
    let mut interval = tokio::time::interval(config.refresh_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // tokio intervals tick immediately; the initial refresh already ran.
    interval.tick().await;

    loop {
        interval.tick().await;
        refresh_all(&http, &config, &store).await;
    }
}

//! Aggregation of normalized events into the per-user day agenda.
//!
//! Drives the CalDAV client across every configured source, normalizes each
//! returned occurrence, and buckets the results into today/tomorrow times
//! all-day/timed. Deduplication happens at insert time per bucket; a
//! failing source contributes exactly one `ERR` line to the today list and
//! never stops the sources after it.
//!
//! The network-free core is [`assemble`], which takes per-source outcomes
//! and produces the agenda. [`fetch`] is the thin wrapper that supplies
//! those outcomes from live sources, in configured order.

use std::collections::HashSet;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Serialize;

use crate::caldav::{self, RawInstance, SourceError};
use crate::event::{normalize_instance, EventEntry};

/// Outcome of searching one CalDAV source: the calendars with their raw
/// occurrences, or one classified failure for the whole source.
pub type SourceOutcome = Result<Vec<(String, Vec<RawInstance>)>, SourceError>;

/// The two ordered, deduplicated event lists for one user.
///
/// `today` is error entries, then all-day events (title order), then timed
/// events (start order). `tomorrow` is the same without error entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Agenda {
    pub today: Vec<EventEntry>,
    pub tomorrow: Vec<EventEntry>,
}

/// The 48-hour aggregation window, anchored at the user's local midnight.
///
/// Boundaries are half-open: an event belongs to today iff its localized
/// start is in `[today_start, today_end)`, to tomorrow iff in
/// `[today_end, tomorrow_end)`, and is dropped otherwise.
#[derive(Debug, Clone, Copy)]
pub struct DayWindow {
    pub today_start: DateTime<Tz>,
    pub today_end: DateTime<Tz>,
    pub tomorrow_end: DateTime<Tz>,
}

impl DayWindow {
    /// Build the window from the user's local midnight.
    pub fn from_midnight(today_start: DateTime<Tz>) -> DayWindow {
        let today_end = today_start + Duration::hours(24);
        DayWindow {
            today_start,
            today_end,
            tomorrow_end: today_end + Duration::hours(24),
        }
    }
}

/// Fetch and aggregate the agenda for one user from live CalDAV sources.
///
/// Sources are processed in configured order; within a source, calendars in
/// server order. That ordering only governs which duplicate wins.
pub async fn fetch(
    http: &Client,
    source_urls: &[String],
    filters: Option<&HashSet<String>>,
    window: DayWindow,
    user_tz: Tz,
) -> Agenda {
    let mut outcomes = Vec::with_capacity(source_urls.len());
    for url in source_urls {
        outcomes.push(
            caldav::search(http, url, filters, window.today_start, window.tomorrow_end).await,
        );
    }
    assemble(outcomes, window, user_tz)
}

/// Assemble per-source outcomes into the final agenda. Pure; no I/O.
pub fn assemble(outcomes: Vec<SourceOutcome>, window: DayWindow, user_tz: Tz) -> Agenda {
    let mut errors: Vec<EventEntry> = Vec::new();
    let mut buckets = Buckets::default();

    for outcome in outcomes {
        match outcome {
            Err(err) => {
                tracing::warn!(host = err.host(), "calendar source failed: {}", err);
                // Error entries sort to the front of today.
                errors.push(EventEntry {
                    time: "ERR".to_string(),
                    title: err.to_string(),
                    sort_key: window.today_start,
                });
            }
            Ok(calendars) => {
                for (calendar_name, instances) in calendars {
                    for instance in &instances {
                        let Some((entry, is_all_day)) =
                            normalize_instance(&instance.data, user_tz)
                        else {
                            tracing::debug!(
                                calendar = %calendar_name,
                                href = instance.href.as_deref().unwrap_or("-"),
                                "skipped instance"
                            );
                            continue;
                        };
                        buckets.insert(entry, is_all_day, &window);
                    }
                }
            }
        }
    }

    buckets.into_agenda(errors)
}

/// The four day-bucket accumulators with their insert-time dedup sets.
#[derive(Default)]
struct Buckets {
    all_day_today: Vec<EventEntry>,
    timed_today: Vec<EventEntry>,
    all_day_tomorrow: Vec<EventEntry>,
    timed_tomorrow: Vec<EventEntry>,
    seen_all_day_today: HashSet<String>,
    seen_timed_today: HashSet<(String, String)>,
    seen_all_day_tomorrow: HashSet<String>,
    seen_timed_tomorrow: HashSet<(String, String)>,
}

impl Buckets {
    /// Route an entry into exactly one bucket, or drop it when its start
    /// falls outside the window. First-seen duplicates win.
    fn insert(&mut self, entry: EventEntry, is_all_day: bool, window: &DayWindow) {
        let today = entry.sort_key >= window.today_start && entry.sort_key < window.today_end;
        let tomorrow = entry.sort_key >= window.today_end && entry.sort_key < window.tomorrow_end;

        let (bucket, seen_all_day, seen_timed) = if today {
            (
                if is_all_day {
                    &mut self.all_day_today
                } else {
                    &mut self.timed_today
                },
                &mut self.seen_all_day_today,
                &mut self.seen_timed_today,
            )
        } else if tomorrow {
            (
                if is_all_day {
                    &mut self.all_day_tomorrow
                } else {
                    &mut self.timed_tomorrow
                },
                &mut self.seen_all_day_tomorrow,
                &mut self.seen_timed_tomorrow,
            )
        } else {
            return;
        };

        let fresh = if is_all_day {
            seen_all_day.insert(entry.title.clone())
        } else {
            seen_timed.insert((entry.time.clone(), entry.title.clone()))
        };
        if fresh {
            bucket.push(entry);
        }
    }

    fn into_agenda(mut self, errors: Vec<EventEntry>) -> Agenda {
        self.all_day_today.sort_by(|a, b| a.title.cmp(&b.title));
        self.all_day_tomorrow.sort_by(|a, b| a.title.cmp(&b.title));
        self.timed_today.sort_by_key(|e| e.sort_key);
        self.timed_tomorrow.sort_by_key(|e| e.sort_key);

        let mut today = errors;
        today.extend(self.all_day_today);
        today.extend(self.timed_today);

        let mut tomorrow = self.all_day_tomorrow;
        tomorrow.extend(self.timed_tomorrow);

        Agenda { today, tomorrow }
    }
}

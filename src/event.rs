//! Event normalization: one raw iCalendar occurrence in, one canonical
//! agenda entry out.
//!
//! CalDAV servers hand back whole VCALENDAR objects per expanded occurrence.
//! This module extracts the first VEVENT, reconciles RECURRENCE-ID
//! overrides against the series DTSTART, classifies the occurrence as
//! all-day or timed, and localizes the start into the owning user's
//! timezone. Anything malformed is a *skip*, never a failure: a single bad
//! event must not take out its siblings.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use serde::Serialize;

/// Canonical normalized event.
///
/// `time` is the display string: `"HH:MM"` (24-hour) for timed events,
/// `"All Day"` for date-only events, `"ERR"` for source-failure entries.
/// `sort_key` is always timezone-aware in the owning user's zone; it drives
/// both day-bucketing and ordering and is never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    pub time: String,
    pub title: String,
    pub sort_key: DateTime<Tz>,
}

/// An event start as iCalendar actually models it: a bare date, or a
/// datetime that is UTC, floating, or pinned to a named zone.
#[derive(Debug, Clone, PartialEq)]
enum EventStart {
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    Floating(NaiveDateTime),
    Zoned { local: NaiveDateTime, tzid: String },
}

impl From<DatePerhapsTime> for EventStart {
    fn from(value: DatePerhapsTime) -> Self {
        match value {
            DatePerhapsTime::Date(date) => EventStart::Date(date),
            DatePerhapsTime::DateTime(dt) => match dt {
                CalendarDateTime::Utc(utc) => EventStart::Utc(utc),
                CalendarDateTime::Floating(naive) => EventStart::Floating(naive),
                CalendarDateTime::WithTimezone { date_time, tzid } => EventStart::Zoned {
                    local: date_time,
                    tzid,
                },
            },
        }
    }
}

impl EventStart {
    fn is_date_only(&self) -> bool {
        matches!(self, EventStart::Date(_))
    }

    /// Replace the date component, keeping this start's time-of-day and
    /// zone. Used for date-only RECURRENCE-ID overrides of timed events.
    fn with_date(&self, date: NaiveDate) -> EventStart {
        match self {
            EventStart::Date(_) => EventStart::Date(date),
            EventStart::Utc(dt) => {
                EventStart::Utc(Utc.from_utc_datetime(&date.and_time(dt.time())))
            }
            EventStart::Floating(naive) => EventStart::Floating(date.and_time(naive.time())),
            EventStart::Zoned { local, tzid } => EventStart::Zoned {
                local: date.and_time(local.time()),
                tzid: tzid.clone(),
            },
        }
    }
}

/// Normalize one raw calendar object into `(entry, is_all_day)`.
///
/// Returns `None` to skip the instance: no VEVENT, missing SUMMARY or
/// DTSTART, an unparseable value, or a start that does not exist in the
/// target zone (DST gap). Skips are logged at `warn` and never abort
/// sibling instances.
pub fn normalize_instance(raw: &str, user_tz: Tz) -> Option<(EventEntry, bool)> {
    let unfolded = unfold(raw);
    let calendar = match read_calendar(&unfolded) {
        Ok(calendar) => calendar,
        Err(err) => {
            tracing::warn!("skipping unparseable calendar object: {}", err);
            return None;
        }
    };

    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let summary = vevent.find_prop("SUMMARY")?.val.to_string();
    let dtstart = EventStart::from(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|prop| DatePerhapsTime::try_from(prop).ok())
        .map(EventStart::from);

    let effective = effective_start(&dtstart, recurrence_id.as_ref());

    let (sort_key, time, is_all_day) = match localize(&effective, user_tz) {
        Some(localized) => localized,
        None => {
            tracing::warn!(
                title = %summary,
                "skipping event with unmappable start time in {}",
                user_tz
            );
            return None;
        }
    };

    Some((
        EventEntry {
            time,
            title: summary,
            sort_key,
        },
        is_all_day,
    ))
}

/// Resolve the effective start of this occurrence.
///
/// A datetime RECURRENCE-ID marks a moved occurrence of a recurring series
/// and replaces DTSTART outright. A bare-date override only replaces a
/// date-only DTSTART; against a timed DTSTART it shifts the date while
/// keeping the original time-of-day and zone, so the occurrence stays a
/// timed event.
fn effective_start(dtstart: &EventStart, recurrence_id: Option<&EventStart>) -> EventStart {
    match recurrence_id {
        None => dtstart.clone(),
        Some(EventStart::Date(date)) => {
            if dtstart.is_date_only() {
                EventStart::Date(*date)
            } else {
                dtstart.with_date(*date)
            }
        }
        Some(override_dt) => override_dt.clone(),
    }
}

/// Localize an effective start into the user's zone, producing the sort
/// key, display time, and all-day flag.
///
/// Naive (floating) datetimes are interpreted as already being in the
/// user's zone; no UTC or system-local assumption is ever applied.
fn localize(start: &EventStart, user_tz: Tz) -> Option<(DateTime<Tz>, String, bool)> {
    match start {
        EventStart::Date(date) => {
            let midnight = day_start_in(user_tz, *date)?;
            Some((midnight, "All Day".to_string(), true))
        }
        EventStart::Utc(dt) => {
            let local = dt.with_timezone(&user_tz);
            let time = local.format("%H:%M").to_string();
            Some((local, time, false))
        }
        EventStart::Floating(naive) => {
            let local = local_in(user_tz, *naive)?;
            let time = local.format("%H:%M").to_string();
            Some((local, time, false))
        }
        EventStart::Zoned { local, tzid } => {
            let localized = match tzid.parse::<Tz>() {
                Ok(source_tz) => local_in(source_tz, *local)?.with_timezone(&user_tz),
                Err(_) => {
                    tracing::warn!("unknown TZID '{}', interpreting as user-local", tzid);
                    local_in(user_tz, *local)?
                }
            };
            let time = localized.format("%H:%M").to_string();
            Some((localized, time, false))
        }
    }
}

/// Map a wall-clock value into a zone. During DST fold the earliest valid
/// instant wins; in a DST gap there is nothing to map to.
fn local_in(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Start of a calendar day in a zone. Some zones spring forward at
/// midnight (America/Santiago, Atlantic/Azores), so the transition day has
/// no 00:00; an all-day entry rolls forward to the earliest instant of the
/// day rather than disappearing.
pub(crate) fn day_start_in(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=120).find_map(|minutes| {
            tz.from_local_datetime(&(midnight + Duration::minutes(minutes)))
                .single()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{New_York, Santiago};
    use chrono_tz::Europe::Berlin;

    fn vcalendar(event_lines: &[&str]) -> String {
        let mut lines = vec![
            "BEGIN:VCALENDAR",
            "VERSION:2.0",
            "PRODID:-//test//EN",
            "BEGIN:VEVENT",
            "UID:test-event",
        ];
        lines.extend_from_slice(event_lines);
        lines.push("END:VEVENT");
        lines.push("END:VCALENDAR");
        lines.join("\r\n")
    }

    #[test]
    fn test_all_day_bare_date() {
        let raw = vcalendar(&["SUMMARY:Holiday", "DTSTART;VALUE=DATE:20240601"]);
        let (entry, is_all_day) = normalize_instance(&raw, New_York).unwrap();

        assert!(is_all_day);
        assert_eq!(entry.time, "All Day");
        assert_eq!(entry.title, "Holiday");
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_all_day_rolls_forward_past_skipped_midnight() {
        // Chile springs forward at midnight; 2024-09-08 starts at 01:00
        let raw = vcalendar(&["SUMMARY:Vote", "DTSTART;VALUE=DATE:20240908"]);
        let (entry, is_all_day) = normalize_instance(&raw, Santiago).unwrap();

        assert!(is_all_day);
        assert_eq!(entry.time, "All Day");
        assert_eq!(
            entry.sort_key,
            Santiago.with_ymd_and_hms(2024, 9, 8, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_naive_datetime_is_user_local_not_utc() {
        let raw = vcalendar(&["SUMMARY:Dentist", "DTSTART:20240601T143000"]);
        let (entry, is_all_day) = normalize_instance(&raw, New_York).unwrap();

        assert!(!is_all_day);
        assert_eq!(entry.time, "14:30");
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_utc_datetime_converts_to_user_zone() {
        // 12:00Z is 08:00 in New York during DST
        let raw = vcalendar(&["SUMMARY:Call", "DTSTART:20240601T120000Z"]);
        let (entry, _) = normalize_instance(&raw, New_York).unwrap();
        assert_eq!(entry.time, "08:00");
    }

    #[test]
    fn test_zoned_datetime_converts_to_user_zone() {
        // 16:00 Berlin is 10:00 New York in June
        let raw = vcalendar(&[
            "SUMMARY:Sync",
            "DTSTART;TZID=Europe/Berlin:20240601T160000",
        ]);
        let (entry, _) = normalize_instance(&raw, New_York).unwrap();
        assert_eq!(entry.time, "10:00");
        assert_eq!(
            entry.sort_key,
            Berlin
                .with_ymd_and_hms(2024, 6, 1, 16, 0, 0)
                .unwrap()
                .with_timezone(&New_York)
        );
    }

    #[test]
    fn test_datetime_recurrence_id_replaces_start() {
        let raw = vcalendar(&[
            "SUMMARY:Standup",
            "DTSTART:20240601T090000",
            "RRULE:FREQ=DAILY",
            "RECURRENCE-ID:20240603T090000",
        ]);
        let (entry, _) = normalize_instance(&raw, New_York).unwrap();
        assert_eq!(entry.time, "09:00");
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_recurrence_id_keeps_time_of_timed_start() {
        // Bare-date override of a timed series: date moves, 09:00 is kept.
        let raw = vcalendar(&[
            "SUMMARY:Standup",
            "DTSTART:20240601T090000",
            "RECURRENCE-ID;VALUE=DATE:20240603",
        ]);
        let (entry, is_all_day) = normalize_instance(&raw, New_York).unwrap();
        assert!(!is_all_day);
        assert_eq!(entry.time, "09:00");
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_recurrence_id_moves_all_day_start() {
        let raw = vcalendar(&[
            "SUMMARY:Trash day",
            "DTSTART;VALUE=DATE:20240601",
            "RECURRENCE-ID;VALUE=DATE:20240608",
        ]);
        let (entry, is_all_day) = normalize_instance(&raw, New_York).unwrap();
        assert!(is_all_day);
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_date_recurrence_id_keeps_zone_of_zoned_start() {
        let raw = vcalendar(&[
            "SUMMARY:Sync",
            "DTSTART;TZID=Europe/Berlin:20240601T160000",
            "RECURRENCE-ID;VALUE=DATE:20240605",
        ]);
        let (entry, _) = normalize_instance(&raw, New_York).unwrap();
        // Still 16:00 Berlin, now on the 5th -> 10:00 New York
        assert_eq!(entry.time, "10:00");
        assert_eq!(
            entry.sort_key,
            Berlin
                .with_ymd_and_hms(2024, 6, 5, 16, 0, 0)
                .unwrap()
                .with_timezone(&New_York)
        );
    }

    #[test]
    fn test_missing_summary_skips() {
        let raw = vcalendar(&["DTSTART:20240601T090000"]);
        assert!(normalize_instance(&raw, New_York).is_none());
    }

    #[test]
    fn test_missing_dtstart_skips() {
        let raw = vcalendar(&["SUMMARY:No start"]);
        assert!(normalize_instance(&raw, New_York).is_none());
    }

    #[test]
    fn test_no_vevent_skips() {
        let raw = [
            "BEGIN:VCALENDAR",
            "VERSION:2.0",
            "BEGIN:VTODO",
            "SUMMARY:A task",
            "END:VTODO",
            "END:VCALENDAR",
        ]
        .join("\r\n");
        assert!(normalize_instance(&raw, New_York).is_none());
    }

    #[test]
    fn test_garbage_skips() {
        assert!(normalize_instance("not an icalendar object", New_York).is_none());
    }

    #[test]
    fn test_unknown_tzid_falls_back_to_user_local() {
        let raw = vcalendar(&[
            "SUMMARY:Mystery",
            "DTSTART;TZID=Atlantis/Lost:20240601T111500",
        ]);
        let (entry, _) = normalize_instance(&raw, New_York).unwrap();
        assert_eq!(entry.time, "11:15");
        assert_eq!(
            entry.sort_key,
            New_York.with_ymd_and_hms(2024, 6, 1, 11, 15, 0).unwrap()
        );
    }
}

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A named fixed-offset zone used to turn civil event fields into instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventZone {
    pub name: &'static str,
    pub utc_offset_seconds: i32,
}

impl EventZone {
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds)
    }
}

/// Fixed UTC-3; no DST rules apply.
pub const AMERICA_FORTALEZA: EventZone = EventZone {
    name: "America/Fortaleza",
    utc_offset_seconds: -3 * 3600,
};

pub const DEFAULT_ZONE: EventZone = AMERICA_FORTALEZA;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEvent {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub administratively_disabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Scheduled,
    Active,
    Ended,
    Undefined,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Scheduled => "scheduled",
            Status::Active => "active",
            Status::Ended => "ended",
            Status::Undefined => "undefined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Status::Scheduled),
            "active" => Some(Status::Active),
            "ended" => Some(Status::Ended),
            "undefined" => Some(Status::Undefined),
            _ => None,
        }
    }
}

/// Composed `[start, end)` window of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn digits(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

/// Accepts `YYYY-MM-DD` or `DD/MM/YYYY` and returns the zero-padded dashed
/// form. Day and month may be one digit; the year must have four.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(['/', '-']).collect();
    let (year, month, day) = match parts.as_slice() {
        [d, m, y] if raw.contains('/') && !raw.contains('-') => (*y, *m, *d),
        [y, m, d] if !raw.contains('/') => (*y, *m, *d),
        _ => return None,
    };
    if !digits(year, 4, 4) || !digits(month, 1, 2) || !digits(day, 1, 2) {
        return None;
    }
    Some(format!("{year}-{month:0>2}-{day:0>2}"))
}

/// Pads to `HH:MM`; a trailing `:SS` is dropped.
pub fn normalize_time(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let (hours, minutes) = match parts.as_slice() {
        [h, m] => (*h, *m),
        [h, m, sec] if digits(sec, 1, 2) => (*h, *m),
        _ => return None,
    };
    if !digits(hours, 1, 2) || !digits(minutes, 1, 2) {
        return None;
    }
    Some(format!("{hours:0>2}:{minutes:0>2}"))
}

fn compose(date: &str, time: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(&normalize_date(date)?, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(&normalize_time(time)?, "%H:%M").ok()?;
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
}

pub fn event_window(event: &TimedEvent, zone: EventZone) -> Option<EventWindow> {
    let start_date = required(&event.start_date)?;
    let start_time = required(&event.start_time)?;
    let end_date = required(&event.end_date)?;
    let end_time = required(&event.end_time)?;

    let offset = zone.offset()?;
    let start = compose(start_date, start_time, offset)?;
    let end = compose(end_date, end_time, offset)?;
    Some(EventWindow { start, end })
}

pub fn resolve_status(event: &TimedEvent, now: DateTime<Utc>) -> Status {
    resolve_status_in(event, now, DEFAULT_ZONE)
}

pub fn resolve_status_in(event: &TimedEvent, now: DateTime<Utc>, zone: EventZone) -> Status {
    let Some(window) = event_window(event, zone) else {
        return Status::Undefined;
    };
    if event.administratively_disabled == Some(true) {
        return Status::Ended;
    }

    let start = window.start.with_timezone(&Utc);
    let end = window.end.with_timezone(&Utc);
    if now < start {
        Status::Scheduled
    } else if now < end {
        Status::Active
    } else {
        Status::Ended
    }
}

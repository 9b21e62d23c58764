//! Guest lineup grouped by day.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::error::{Result, ServerError};

/// Placeholder shown for missing guest details
const MISSING: &str = "-";

/// One schedule row joined with its guest
#[derive(Clone, Debug)]
pub struct LineupEntry {
    pub schedule_id: i32,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub stage: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineupGuest {
    pub schedule_id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub stage: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineupDay {
    pub date: String,
    pub guests: Vec<LineupGuest>,
}

fn or_missing(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| MISSING.to_string())
}

/// Group entries by date, days ascending and each day ordered by start time
pub fn group_by_day(entries: Vec<LineupEntry>) -> Vec<LineupDay> {
    let mut days: BTreeMap<String, Vec<LineupEntry>> = BTreeMap::new();
    for entry in entries {
        days.entry(entry.date.clone()).or_default().push(entry);
    }

    days.into_iter()
        .map(|(date, mut entries)| {
            entries.sort_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then(a.schedule_id.cmp(&b.schedule_id))
            });
            LineupDay {
                date,
                guests: entries
                    .into_iter()
                    .map(|e| LineupGuest {
                        schedule_id: e.schedule_id,
                        name: or_missing(e.guest_name),
                        email: or_missing(e.guest_email),
                        phone: or_missing(e.guest_phone),
                        stage: or_missing(e.stage),
                        start_time: e.start_time,
                        end_time: e.end_time,
                    })
                    .collect(),
            }
        })
        .collect()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ServerError::InvalidRequest(format!("Invalid date {:?}, expected YYYY-MM-DD", raw)))
}

/// `HH:MM` or `HH:MM:SS`
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ServerError::InvalidRequest(format!("Invalid time {:?}, expected HH:MM", raw)))
}

/// Check a schedule slot against the event's dates.
/// Events without both dates accept any day.
pub fn validate_slot(
    event_start: Option<&str>,
    event_end: Option<&str>,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> Result<()> {
    let date = parse_date(date)?;

    if let (Some(start), Some(end)) = (event_start, event_end) {
        let (start, end) = (parse_date(start)?, parse_date(end)?);
        if date < start || date > end {
            return Err(ServerError::InvalidRequest(format!(
                "Schedule date {} is outside the event ({} to {})",
                date, start, end
            )));
        }
    }

    if parse_time(start_time)? >= parse_time(end_time)? {
        return Err(ServerError::InvalidRequest(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

//! Attendance by day and gender.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::parse_day;

/// Longest event span charted day by day
const MAX_RANGE_DAYS: usize = 366;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(g) if g.eq_ignore_ascii_case("male") => Gender::Male,
            Some(g) if g.eq_ignore_ascii_case("female") => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

/// Every day from `start` through `end`, empty when the range is inverted
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .take(MAX_RANGE_DAYS)
        .collect()
}

/// `5 Mar`
pub fn day_label(date: NaiveDate) -> String {
    date.format("%-d %b").to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenderByDay {
    pub labels: Vec<String>,
    pub male: Vec<u64>,
    pub female: Vec<u64>,
}

/// Male/female attendee counts for each day of the event.
/// Attendees dated outside the event are not counted.
pub fn gender_by_day<'a>(
    start: NaiveDate,
    end: NaiveDate,
    attendees: impl IntoIterator<Item = (Option<&'a str>, Option<&'a str>)>,
) -> GenderByDay {
    let days = date_range(start, end);
    let mut male = vec![0u64; days.len()];
    let mut female = vec![0u64; days.len()];

    for (event_date, gender) in attendees {
        let Some(day) = event_date.and_then(parse_day) else {
            continue;
        };
        let Some(i) = days.iter().position(|d| *d == day) else {
            continue;
        };
        match Gender::parse(gender) {
            Gender::Male => male[i] += 1,
            Gender::Female => female[i] += 1,
            Gender::Unknown => {}
        }
    }

    GenderByDay {
        labels: days.into_iter().map(day_label).collect(),
        male,
        female,
    }
}

/// `[male, female, not checked in]` for the check-in chart.
///
/// Only checked-in attendees are passed in; whoever is not male or female
/// is folded into the remainder.
pub fn checkin_split<'a>(total_tickets: u64, genders: impl IntoIterator<Item = Option<&'a str>>) -> [u64; 3] {
    let (mut male, mut female) = (0u64, 0u64);
    for gender in genders {
        match Gender::parse(gender) {
            Gender::Male => male += 1,
            Gender::Female => female += 1,
            Gender::Unknown => {}
        }
    }
    [male, female, total_tickets.saturating_sub(male + female)]
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: u64,
}

/// Check-ins grouped by calendar day, oldest first
pub fn checkins_per_day<'a>(timestamps: impl IntoIterator<Item = &'a str>) -> Vec<DayCount> {
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for ts in timestamps {
        if let Some(day) = parse_day(ts) {
            *per_day.entry(day).or_default() += 1;
        }
    }
    per_day
        .into_iter()
        .map(|(day, count)| DayCount {
            date: day.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect()
}

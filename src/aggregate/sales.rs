//! Sales trend and ticket totals.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Months shown in the sales chart, ending at the event's month
pub const TREND_MONTHS: u32 = 3;

/// `count` consecutive `(year, month)` pairs ending at `anchor`'s month, oldest first
pub fn month_buckets(anchor: NaiveDate, count: u32) -> Vec<(i32, u32)> {
    let anchor_index = anchor.year() * 12 + anchor.month0() as i32;
    (0..count as i32)
        .rev()
        .map(|back| {
            let index = anchor_index - back;
            (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SalesTrend {
    pub labels: Vec<&'static str>,
    pub data: Vec<u64>,
}

/// Count orders per month bucket, matching on both year and month
pub fn sales_trend(anchor: NaiveDate, order_dates: impl IntoIterator<Item = NaiveDate>) -> SalesTrend {
    let buckets = month_buckets(anchor, TREND_MONTHS);
    let mut data = vec![0u64; buckets.len()];

    for date in order_dates {
        if let Some(i) = buckets
            .iter()
            .position(|&(y, m)| y == date.year() && m == date.month())
        {
            data[i] += 1;
        }
    }

    SalesTrend {
        labels: buckets
            .iter()
            .map(|&(_, m)| MONTH_LABELS[(m - 1) as usize])
            .collect(),
        data,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub quantity: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TicketSummary {
    pub total: u64,
    pub categories: Vec<CategoryCount>,
}

/// Sum `(ticket type, quantity)` pairs; categories keep first-seen order
pub fn ticket_summary<S: Into<String>>(items: impl IntoIterator<Item = (S, i32)>) -> TicketSummary {
    let mut total = 0u64;
    let mut categories: Vec<CategoryCount> = Vec::new();

    for (name, quantity) in items {
        let quantity = quantity.max(0) as u64;
        let name = name.into();
        total += quantity;
        match categories.iter_mut().find(|c| c.name == name) {
            Some(category) => category.quantity += quantity,
            None => categories.push(CategoryCount { name, quantity }),
        }
    }

    TicketSummary { total, categories }
}

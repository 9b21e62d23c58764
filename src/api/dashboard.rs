//! Per-event dashboard.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use super::auth::Session;
use super::handlers::{json_response, AppState};
use crate::aggregate::attendance::{checkin_split, gender_by_day, GenderByDay};
use crate::aggregate::parse_day;
use crate::aggregate::sales::{sales_trend, ticket_summary, SalesTrend, TicketSummary};
use crate::db::entities::{checkin, order, order_item, ticket, ticket_detail};
use crate::error::Result;

const PAID: &str = "paid";
const RECENT_ORDERS: usize = 5;

#[derive(Serialize)]
struct Dashboard {
    event_id: i32,
    total_orders: usize,
    recent_orders: Vec<order::Model>,
    sales_trend: SalesTrend,
    tickets: TicketSummary,
    gender_by_day: GenderByDay,
    /// `[male, female, not checked in]`
    checkins: [u64; 3],
}

/// GET /api/events/:id/dashboard
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
) -> Result<Response> {
    let event = state.owned_event(&session, event_id).await?;

    let orders = order::Entity::find()
        .filter(order::Column::EventId.eq(event_id))
        .order_by_asc(order::Column::OrderDate)
        .order_by_asc(order::Column::Id)
        .all(&state.db)
        .await?;
    let paid: Vec<order::Model> = orders.iter().filter(|o| o.status == PAID).cloned().collect();
    let paid_ids: Vec<i32> = paid.iter().map(|o| o.id).collect();
    let all_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();

    // Events without a start date chart the current month
    let anchor = event
        .start_date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or_else(|| Utc::now().date_naive());
    let trend = sales_trend(anchor, paid.iter().filter_map(|o| parse_day(&o.order_date)));

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(paid_ids))
        .order_by_asc(order_item::Column::Id)
        .find_also_related(ticket::Entity)
        .all(&state.db)
        .await?;
    let tickets = ticket_summary(items.into_iter().map(|(item, ticket)| {
        let name = ticket
            .map(|t| t.ticket_type)
            .unwrap_or_else(|| "Unknown".to_string());
        (name, item.quantity)
    }));

    let details = ticket_detail::Entity::find()
        .filter(ticket_detail::Column::OrderId.is_in(all_ids))
        .find_with_related(checkin::Entity)
        .all(&state.db)
        .await?;

    let genders = match (
        event.start_date.as_deref().and_then(parse_day),
        event.end_date.as_deref().and_then(parse_day),
    ) {
        (Some(start), Some(end)) => gender_by_day(
            start,
            end,
            details
                .iter()
                .map(|(d, _)| (d.event_date.as_deref(), d.gender.as_deref())),
        ),
        _ => GenderByDay {
            labels: Vec::new(),
            male: Vec::new(),
            female: Vec::new(),
        },
    };

    let checked_in = details
        .iter()
        .filter(|(_, checkins)| checkins.iter().any(|c| c.checked_in_at.is_some()))
        .map(|(d, _)| d.gender.as_deref());
    let checkins = checkin_split(tickets.total, checked_in);

    let dashboard = Dashboard {
        event_id,
        total_orders: paid.len(),
        recent_orders: paid.into_iter().take(RECENT_ORDERS).collect(),
        sales_trend: trend,
        tickets,
        gender_by_day: genders,
        checkins,
    };
    Ok(json_response(StatusCode::OK, &dashboard))
}

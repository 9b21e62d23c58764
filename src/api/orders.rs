//! Order routes: an event's orders and the detail of one order.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use super::auth::Session;
use super::events::SearchQuery;
use super::handlers::{json_response, AppState};
use crate::db::entities::{checkin, order, order_item, ticket, ticket_detail};
use crate::error::{Result, ServerError};

/// One row of an event's order list
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: i32,
    pub order_date: String,
    pub status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    /// Tickets across all lines of the order
    pub quantity: i32,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderLine {
    pub ticket_id: i32,
    pub ticket_type: Option<String>,
    pub price: Option<i64>,
    pub quantity: i32,
}

/// A ticket holder with the category they were sold and whether they
/// have been scanned in
#[derive(Debug, Serialize)]
pub struct TicketHolder {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub event_date: Option<String>,
    pub ticket_type: Option<String>,
    pub price: Option<i64>,
    pub checked_in: bool,
    pub checked_in_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<OrderLine>,
    pub total: i64,
    pub ticket_details: Vec<TicketHolder>,
}

async fn ticket_prices(state: &AppState, event_id: i32) -> Result<HashMap<i32, ticket::Model>> {
    let tickets = ticket::Entity::find()
        .filter(ticket::Column::EventId.eq(event_id))
        .all(&state.db)
        .await?;
    Ok(tickets.into_iter().map(|t| (t.id, t)).collect())
}

fn line_total(items: &[order_item::Model], tickets: &HashMap<i32, ticket::Model>) -> i64 {
    items
        .iter()
        .map(|item| {
            let price = tickets.get(&item.ticket_id).map(|t| t.price).unwrap_or(0);
            price * i64::from(item.quantity)
        })
        .sum()
}

/// GET /api/events/:id/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
    Query(query): Query<SearchQuery>,
) -> Result<Response> {
    state.owned_event(&session, event_id).await?;

    let mut select = order::Entity::find().filter(order::Column::EventId.eq(event_id));
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(order::Column::CustomerName.contains(term))
                .add(order::Column::CustomerEmail.contains(term))
                .add(order::Column::CustomerPhone.contains(term)),
        );
    }

    let rows = select
        .order_by_asc(order::Column::OrderDate)
        .order_by_asc(order::Column::Id)
        .find_with_related(order_item::Entity)
        .all(&state.db)
        .await?;
    let tickets = ticket_prices(&state, event_id).await?;

    let orders: Vec<OrderSummary> = rows
        .into_iter()
        .map(|(order, items)| OrderSummary {
            id: order.id,
            quantity: items.iter().map(|i| i.quantity).sum(),
            total: line_total(&items, &tickets),
            order_date: order.order_date,
            status: order.status,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
        })
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "event_id": event_id, "orders": orders }),
    ))
}

/// GET /api/orders/:id
///
/// Ticket holders carry no category of their own; they are matched to the
/// order's lines in line order, one holder per ticket sold.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(order_id): Path<i32>,
) -> Result<Response> {
    let order = order::Entity::find_by_id(order_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Order {} not found", order_id)))?;
    state.owned_event(&session, order.event_id).await?;

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(&state.db)
        .await?;
    let tickets = ticket_prices(&state, order.event_id).await?;

    let lines: Vec<OrderLine> = items
        .iter()
        .map(|item| {
            let ticket = tickets.get(&item.ticket_id);
            OrderLine {
                ticket_id: item.ticket_id,
                ticket_type: ticket.map(|t| t.ticket_type.clone()),
                price: ticket.map(|t| t.price),
                quantity: item.quantity,
            }
        })
        .collect();

    let mut seats = lines
        .iter()
        .flat_map(|line| std::iter::repeat(line).take(usize::try_from(line.quantity).unwrap_or(0)));

    let holders = ticket_detail::Entity::find()
        .filter(ticket_detail::Column::OrderId.eq(order_id))
        .order_by_asc(ticket_detail::Column::Id)
        .find_with_related(checkin::Entity)
        .all(&state.db)
        .await?;

    let ticket_details = holders
        .into_iter()
        .map(|(detail, checkins)| {
            let seat = seats.next();
            let checked_in_at = checkins.into_iter().find_map(|c| c.checked_in_at);
            TicketHolder {
                id: detail.id,
                name: detail.name,
                email: detail.email,
                phone: detail.phone,
                gender: detail.gender,
                event_date: detail.event_date,
                ticket_type: seat.and_then(|line| line.ticket_type.clone()),
                price: seat.and_then(|line| line.price),
                checked_in: checked_in_at.is_some(),
                checked_in_at,
            }
        })
        .collect();

    let detail = OrderDetail {
        total: line_total(&items, &tickets),
        order,
        items: lines,
        ticket_details,
    };
    Ok(json_response(StatusCode::OK, &detail))
}

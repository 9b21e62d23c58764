//! Attendee check-in routes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use super::auth::Session;
use super::handlers::{json_response, AppState};
use crate::aggregate::attendance::checkins_per_day;
use crate::db::entities::{checkin, order, ticket_detail};
use crate::error::{Result, ServerError};

fn participant_not_found() -> ServerError {
    ServerError::NotFound("Participant not found".to_string())
}

#[derive(Deserialize)]
pub struct CheckinRequest {
    pub id: String,
}

/// POST /api/checkin
pub async fn checkin(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(req): Json<CheckinRequest>,
) -> Result<Response> {
    let record = checkin::Entity::find_by_id(req.id.trim().to_string())
        .one(&state.db)
        .await?
        .ok_or_else(participant_not_found)?;

    let (_, order) = ticket_detail::Entity::find_by_id(record.ticket_detail_id)
        .find_also_related(order::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(participant_not_found)?;
    let order = order.ok_or_else(participant_not_found)?;
    state.owned_event(&session, order.event_id).await?;

    if record.checked_in_at.is_some() {
        return Err(ServerError::InvalidRequest(
            "Participant already checked in".to_string(),
        ));
    }

    let id = record.id.clone();
    let mut active: checkin::ActiveModel = record.into();
    active.checked_in_at = Set(Some(chrono::Utc::now().to_rfc3339()));
    active.update(&state.db).await?;

    tracing::info!("Checked in {} for event {}", id, order.event_id);
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "message": "Checkin Success" }),
    ))
}

#[derive(Serialize)]
struct CheckinRow {
    id: String,
    name: String,
    email: Option<String>,
    gender: Option<String>,
    event_date: Option<String>,
    checked_in_at: String,
}

/// GET /api/events/:id/checkins
pub async fn list_checkins(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
) -> Result<Response> {
    state.owned_event(&session, event_id).await?;

    let order_ids: Vec<i32> = order::Entity::find()
        .filter(order::Column::EventId.eq(event_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|o| o.id)
        .collect();

    let details = ticket_detail::Entity::find()
        .filter(ticket_detail::Column::OrderId.is_in(order_ids))
        .find_with_related(checkin::Entity)
        .all(&state.db)
        .await?;

    let mut rows: Vec<CheckinRow> = details
        .into_iter()
        .flat_map(|(detail, checkins)| {
            checkins.into_iter().filter_map(move |c| {
                c.checked_in_at.map(|at| CheckinRow {
                    id: c.id,
                    name: detail.name.clone(),
                    email: detail.email.clone(),
                    gender: detail.gender.clone(),
                    event_date: detail.event_date.clone(),
                    checked_in_at: at,
                })
            })
        })
        .collect();
    rows.sort_by(|a, b| a.checked_in_at.cmp(&b.checked_in_at));

    let per_day = checkins_per_day(rows.iter().map(|r| r.checked_in_at.as_str()));
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "checkins": rows, "per_day": per_day }),
    ))
}

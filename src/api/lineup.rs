//! Guest lineup routes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use super::auth::Session;
use super::handlers::{json_response, AppState};
use crate::aggregate::lineup::{group_by_day, validate_slot, LineupEntry};
use crate::db::entities::{event, guest, guest_schedule};
use crate::error::{Result, ServerError};

async fn ensure_guest(state: &AppState, guest_id: i32) -> Result<()> {
    guest::Entity::find_by_id(guest_id)
        .one(&state.db)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServerError::NotFound(format!("Guest {} not found", guest_id)))
}

/// Load a schedule row whose event the session's merchant owns
async fn owned_schedule(
    state: &AppState,
    session: &Session,
    schedule_id: i32,
) -> Result<(guest_schedule::Model, event::Model)> {
    let schedule = guest_schedule::Entity::find_by_id(schedule_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Schedule {} not found", schedule_id)))?;
    let event = state.owned_event(session, schedule.event_id).await?;
    Ok((schedule, event))
}

/// GET /api/events/:id/lineup
pub async fn get_lineup(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
) -> Result<Response> {
    state.owned_event(&session, event_id).await?;

    let rows = guest_schedule::Entity::find()
        .filter(guest_schedule::Column::EventId.eq(event_id))
        .order_by_asc(guest_schedule::Column::ScheduleDate)
        .find_also_related(guest::Entity)
        .all(&state.db)
        .await?;

    let entries = rows
        .into_iter()
        .map(|(schedule, guest)| LineupEntry {
            schedule_id: schedule.id,
            date: schedule.schedule_date,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            stage: schedule.stage,
            guest_name: guest.as_ref().map(|g| g.name.clone()),
            guest_email: guest.as_ref().and_then(|g| g.email.clone()),
            guest_phone: guest.and_then(|g| g.phone),
        })
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "event_id": event_id, "days": group_by_day(entries) }),
    ))
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub guest_id: i32,
    pub schedule_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub stage: Option<String>,
}

/// POST /api/events/:id/lineup
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Response> {
    let event = state.owned_event(&session, event_id).await?;
    validate_slot(
        event.start_date.as_deref(),
        event.end_date.as_deref(),
        &req.schedule_date,
        &req.start_time,
        &req.end_time,
    )?;
    ensure_guest(&state, req.guest_id).await?;

    let schedule = guest_schedule::ActiveModel {
        event_id: Set(event_id),
        guest_id: Set(req.guest_id),
        schedule_date: Set(req.schedule_date.trim().to_string()),
        start_time: Set(req.start_time.trim().to_string()),
        end_time: Set(req.end_time.trim().to_string()),
        stage: Set(req.stage.filter(|s| !s.trim().is_empty())),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!("Scheduled guest {} for event {}", schedule.guest_id, event_id);
    Ok(json_response(StatusCode::CREATED, &schedule))
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub guest_id: Option<i32>,
    pub schedule_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub stage: Option<String>,
}

/// PUT /api/lineup/:schedule_id
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(schedule_id): Path<i32>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Response> {
    let (schedule, event) = owned_schedule(&state, &session, schedule_id).await?;

    let date = req.schedule_date.unwrap_or_else(|| schedule.schedule_date.clone());
    let start_time = req.start_time.unwrap_or_else(|| schedule.start_time.clone());
    let end_time = req.end_time.unwrap_or_else(|| schedule.end_time.clone());
    validate_slot(
        event.start_date.as_deref(),
        event.end_date.as_deref(),
        &date,
        &start_time,
        &end_time,
    )?;

    let mut active: guest_schedule::ActiveModel = schedule.into();
    if let Some(guest_id) = req.guest_id {
        ensure_guest(&state, guest_id).await?;
        active.guest_id = Set(guest_id);
    }
    if let Some(stage) = req.stage {
        active.stage = Set(Some(stage).filter(|s| !s.trim().is_empty()));
    }
    active.schedule_date = Set(date.trim().to_string());
    active.start_time = Set(start_time.trim().to_string());
    active.end_time = Set(end_time.trim().to_string());

    let updated = active.update(&state.db).await?;
    Ok(json_response(StatusCode::OK, &updated))
}

/// DELETE /api/lineup/:schedule_id
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(schedule_id): Path<i32>,
) -> Result<Response> {
    let (schedule, _) = owned_schedule(&state, &session, schedule_id).await?;
    guest_schedule::Entity::delete_by_id(schedule.id)
        .exec(&state.db)
        .await?;

    Ok(json_response(StatusCode::OK, &serde_json::json!({ "success": true })))
}

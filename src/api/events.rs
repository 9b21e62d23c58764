//! Event, template and asset slot routes.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use super::auth::Session;
use super::handlers::{json_response, AppState};
use super::upload::UploadForm;
use crate::aggregate::lineup::parse_date;
use crate::assets::AssetSlot;
use crate::db::entities::{event, template};
use crate::db::now_secs;
use crate::error::{Result, ServerError};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// GET /api/events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<SearchQuery>,
) -> Result<Response> {
    let mut select = event::Entity::find().filter(event::Column::MerchantId.eq(session.merchant_id));

    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(event::Column::Name.contains(term))
                .add(event::Column::Description.contains(term))
                .add(event::Column::Location.contains(term)),
        );
    }

    let events = select
        .order_by_desc(event::Column::CreatedAt)
        .order_by_desc(event::Column::Id)
        .all(&state.db)
        .await?;

    Ok(json_response(StatusCode::OK, &serde_json::json!({ "events": events })))
}

/// GET /api/events/:id
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
) -> Result<Response> {
    let event = state.owned_event(&session, event_id).await?;
    Ok(json_response(StatusCode::OK, &event))
}

/// Editable event fields. On update, absent fields keep their value and an
/// empty string clears an optional text field.
#[derive(Deserialize)]
pub struct EventForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub capacity: Option<i32>,
    pub status: Option<bool>,
}

/// The editable part of an event row
struct EventFields {
    name: String,
    description: Option<String>,
    location: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    capacity: Option<i32>,
    status: bool,
}

fn optional_text(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl EventFields {
    fn new() -> Self {
        Self {
            name: String::new(),
            description: None,
            location: None,
            start_date: None,
            end_date: None,
            capacity: None,
            status: true,
        }
    }

    fn from_model(event: &event::Model) -> Self {
        Self {
            name: event.name.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_date: event.start_date.clone(),
            end_date: event.end_date.clone(),
            capacity: event.capacity,
            status: event.status,
        }
    }

    fn merge(&mut self, form: EventForm) {
        if let Some(name) = form.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = form.description {
            self.description = optional_text(description);
        }
        if let Some(location) = form.location {
            self.location = optional_text(location);
        }
        if let Some(start_date) = form.start_date {
            self.start_date = optional_text(start_date);
        }
        if let Some(end_date) = form.end_date {
            self.end_date = optional_text(end_date);
        }
        if form.capacity.is_some() {
            self.capacity = form.capacity;
        }
        if let Some(status) = form.status {
            self.status = status;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ServerError::InvalidRequest("Event name is required".to_string()));
        }
        if matches!(self.capacity, Some(c) if c < 0) {
            return Err(ServerError::InvalidRequest("Capacity cannot be negative".to_string()));
        }

        let start = self.start_date.as_deref().map(parse_date).transpose()?;
        let end = self.end_date.as_deref().map(parse_date).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(ServerError::InvalidRequest(format!(
                    "Event ends ({}) before it starts ({})",
                    end, start
                )));
            }
        }
        Ok(())
    }

    fn write(self, active: &mut event::ActiveModel) {
        active.name = Set(self.name);
        active.description = Set(self.description);
        active.location = Set(self.location);
        active.start_date = Set(self.start_date);
        active.end_date = Set(self.end_date);
        active.capacity = Set(self.capacity);
        active.status = Set(self.status);
    }
}

/// POST /api/events
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(form): Json<EventForm>,
) -> Result<Response> {
    let mut fields = EventFields::new();
    fields.merge(form);
    fields.validate()?;

    let mut active = event::ActiveModel {
        merchant_id: Set(session.merchant_id),
        created_at: Set(now_secs()),
        ..Default::default()
    };
    fields.write(&mut active);
    let event = active.insert(&state.db).await?;

    tracing::info!("Merchant {} created event {}", session.merchant_id, event.id);
    Ok(json_response(StatusCode::CREATED, &event))
}

/// PUT /api/events/:id
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
    Json(form): Json<EventForm>,
) -> Result<Response> {
    let event = state.owned_event(&session, event_id).await?;

    let mut fields = EventFields::from_model(&event);
    fields.merge(form);
    fields.validate()?;

    let mut active: event::ActiveModel = event.into();
    fields.write(&mut active);
    let event = active.update(&state.db).await?;

    tracing::info!("Updated event {}", event_id);
    Ok(json_response(StatusCode::OK, &event))
}

fn event_slot(raw: &str) -> Result<AssetSlot> {
    let slot: AssetSlot = raw.parse()?;
    if !slot.is_event_slot() {
        return Err(ServerError::InvalidRequest(format!("{} is not an event slot", slot)));
    }
    Ok(slot)
}

/// PUT /api/events/:id/assets/:slot
pub async fn put_asset(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((event_id, slot)): Path<(i32, String)>,
    multipart: Multipart,
) -> Result<Response> {
    let slot = event_slot(&slot)?;
    state.owned_event(&session, event_id).await?;

    let file = UploadForm::read(multipart).await?.require_file()?;
    let stored = state.assets.replace_event_asset(event_id, slot, file).await?;

    Ok(json_response(StatusCode::OK, &stored))
}

/// DELETE /api/events/:id/assets/:slot
pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((event_id, slot)): Path<(i32, String)>,
) -> Result<Response> {
    let slot = event_slot(&slot)?;
    state.owned_event(&session, event_id).await?;

    let remote = state.assets.remove_event_asset(event_id, slot).await?;
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "remote": remote }),
    ))
}

/// GET /api/events/:id/assets/:slot
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((event_id, slot)): Path<(i32, String)>,
) -> Result<Response> {
    let slot = event_slot(&slot)?;
    state.owned_event(&session, event_id).await?;

    let (path, slot_state) = state.assets.slot_state(event_id, slot).await?;
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "slot": slot.as_str(), "path": path, "state": slot_state }),
    ))
}

#[derive(Deserialize)]
pub struct ApplyTemplateRequest {
    pub template_id: i32,
}

/// POST /api/events/:id/template
pub async fn apply_template(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(event_id): Path<i32>,
    Json(req): Json<ApplyTemplateRequest>,
) -> Result<Response> {
    state.owned_event(&session, event_id).await?;
    let event = state.assets.apply_template(event_id, req.template_id).await?;
    Ok(json_response(StatusCode::OK, &event))
}

/// GET /api/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> Result<Response> {
    let templates = template::Entity::find()
        .order_by_asc(template::Column::Id)
        .all(&state.db)
        .await?;
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "templates": templates })))
}

/// PUT /api/merchants/me/logo
pub async fn put_logo(
    State(state): State<Arc<AppState>>,
    session: Session,
    multipart: Multipart,
) -> Result<Response> {
    let file = UploadForm::read(multipart).await?.require_file()?;
    let stored = state.assets.replace_merchant_logo(session.merchant_id, file).await?;
    Ok(json_response(StatusCode::OK, &stored))
}

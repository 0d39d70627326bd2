// HTTP surface for the discovery pipeline and the organizer event flows.
// Handlers stay thin: auth + input validation here, semantics in discovery
// and database.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    auth,
    discovery::{self, DEFAULT_RADIUS_KM},
    error::{AppError, AppResult},
    geo::{days_left_label, days_until},
    models::{EventDetails, EventDraft, InteractionType},
};

#[derive(Deserialize)]
pub struct NearbyParams {
    pub lat: Option<String>,
    #[serde(rename = "long")]
    pub lng: Option<String>,
    pub radius: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub size: Option<usize>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct EventActionRequest {
    pub event_id: Uuid,
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub details: EventDetails,
}

const DEFAULT_RECOMMEND_SIZE: usize = 10;

pub async fn nearby_handler(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Value>, AppError> {
    let lat = parse_coord(params.lat.as_deref())?;
    let lng = parse_coord(params.lng.as_deref())?;
    // Invalid or absent radius falls back to the default rather than erroring.
    let radius = params
        .radius
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(DEFAULT_RADIUS_KM);

    let events = discovery::nearby(&state.db, lat, lng, radius, Utc::now()).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Nearby events fetched successfully",
        "events": events,
    })))
}

fn parse_coord(value: Option<&str>) -> AppResult<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::Validation("Latitude and longitude are required".to_string()))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("Query required".to_string()))?;

    let hits = discovery::semantic_search(&state.db, state.embedder.as_ref(), query).await?;
    Ok(Json(json!(hits)))
}

pub async fn recommend_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = auth::require_user(&state.db, &headers).await?;

    let (Some(lat), Some(lng)) = (req.latitude, req.longitude) else {
        return Err(AppError::Validation(
            "Missing latitude or longitude".to_string(),
        ));
    };
    let size = req.size.unwrap_or(DEFAULT_RECOMMEND_SIZE);

    let events =
        discovery::recommend(&state.db, state.scorer.as_ref(), user_id, lat, lng, size).await?;
    Ok(Json(json!({
        "success": true,
        "events": events,
    })))
}

pub async fn view_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventActionRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = auth::require_user(&state.db, &headers).await?;
    let event = state
        .db
        .get_event(req.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    state
        .db
        .record_interaction(user_id, event.id, InteractionType::View)
        .await?;

    let now = Utc::now();
    let status = match (event.start_time, event.end_time) {
        (Some(start), _) if start > now => "Upcoming",
        (_, Some(end)) if end > now => "Ongoing",
        _ => "Past",
    };
    let days = event.start_time.map(|s| days_until(s, now)).unwrap_or(0);
    let count = state.db.registration_count(event.id).await?;
    let requirements = state.db.volunteer_requirements(event.id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Event viewed successfully",
        "data": {
            "id": event.id,
            "title": event.title,
            "description": event.description,
            "city": event.city,
            "venue": event.venue,
            "latitude": event.latitude,
            "longitude": event.longitude,
            "startTime": event.start_time,
            "endTime": event.end_time,
            "capacity": event.capacity,
            "count": count,
            "requirement": requirements,
            "status": status,
            "days": days,
            "daysLeft": days_left_label(days),
        },
    })))
}

pub async fn save_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventActionRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = auth::require_user(&state.db, &headers).await?;
    let interaction = state
        .db
        .record_interaction(user_id, req.event_id, InteractionType::Save)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Event saved successfully",
        "data": interaction,
    })))
}

pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventActionRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = auth::require_user(&state.db, &headers).await?;
    let event = state
        .db
        .get_event(req.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    // Organizers cannot register for their own events.
    if let Some(organizer) = state.db.organizer_for_user(user_id).await? {
        if event.organizer_id == organizer.id {
            return Err(AppError::BadRequest(
                "Organizers cannot register for their own events".to_string(),
            ));
        }
    }

    state.db.create_registration(user_id, event.id).await?;
    let interaction = state
        .db
        .record_interaction(user_id, event.id, InteractionType::Register)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Registration created successfully",
        "data": interaction,
    })))
}

pub async fn attend_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventActionRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = auth::require_user(&state.db, &headers).await?;
    state.db.mark_attended(user_id, req.event_id).await?;
    let interaction = state
        .db
        .record_interaction(user_id, req.event_id, InteractionType::Attended)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Event attended successfully",
        "data": interaction,
    })))
}

pub async fn draft_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<EventDraft>,
) -> Result<Json<Value>, AppError> {
    let organizer = auth::require_organizer(&state.db, &headers).await?;
    if draft.title.len() < 3 {
        return Err(AppError::Validation(
            "Title must be at least 3 characters long".to_string(),
        ));
    }
    let event = state.db.save_draft(organizer.id, &draft).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Draft saved successfully",
        "data": event,
    })))
}

pub async fn publish_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PublishRequest>,
) -> Result<Json<Value>, AppError> {
    let organizer = auth::require_organizer(&state.db, &headers).await?;
    if !organizer.verified {
        return Err(AppError::Forbidden(
            "Only verified organizers can publish events".to_string(),
        ));
    }

    req.details.validate()?;

    // Embed before touching storage: a provider failure aborts the publish
    // and leaves the event fully unpublished with a null embedding.
    let interest_names = state.db.interest_names(&req.details.interest_ids).await?;
    let text = req.details.embedding_text(&interest_names);
    let vector = state.embedder.embed(&text).await?;

    let event = state
        .db
        .publish_event(req.id, organizer.id, &req.details, &vector)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Event published successfully",
        "data": event,
    })))
}

pub async fn cancel_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EventActionRequest>,
) -> Result<Json<Value>, AppError> {
    let organizer = auth::require_organizer(&state.db, &headers).await?;
    state.db.cancel_event(req.event_id, organizer.id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Event cancelled successfully",
    })))
}

pub async fn delete_event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let organizer = auth::require_organizer(&state.db, &headers).await?;
    state.db.delete_event(id, organizer.id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Event deleted successfully",
    })))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Discovery pipeline
        .route("/nearby", get(nearby_handler))
        .route("/search", get(search_handler))
        .route("/recommend", post(recommend_handler))
        // Interaction-recording callers
        .route("/events/view", post(view_handler))
        .route("/events/save", post(save_handler))
        .route("/events/register", post(register_handler))
        .route("/events/attend", post(attend_handler))
        // Organizer event lifecycle
        .route("/organizer/events", post(draft_handler))
        .route("/organizer/events/publish", post(publish_handler))
        .route("/organizer/events/cancel", post(cancel_handler))
        .route("/organizer/events/{id}", delete(delete_event_handler))
        .with_state(state)
}

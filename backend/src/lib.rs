pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod store;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use santa_core::{export_csv, DrawError, DrawProgress, DrawState, Event, Participant};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::{DrawEngine, Reveal, RevealPolicy};
use crate::error::ApiError;
use crate::store::{MemoryStore, ParticipantStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<DrawEngine>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()), RevealPolicy::default())
    }
}

impl AppState {
    pub fn new(store: Arc<dyn ParticipantStore>, policy: RevealPolicy) -> Self {
        Self {
            engine: Arc::new(DrawEngine::new(store, policy)),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = match &config.persist_path {
            Some(path) => MemoryStore::with_persistence(path.clone()).await?,
            None => MemoryStore::new(),
        };
        Ok(Self::new(Arc::new(store), config.reveal_policy))
    }

    fn store(&self) -> &Arc<dyn ParticipantStore> {
        self.engine.store()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/:id", get(get_event))
        .route("/events/:id/participants", post(add_participant))
        .route(
            "/events/:id/participants/:participant_id/reveal",
            post(reveal_for_participant),
        )
        .route("/events/:id/draw", post(draw_all))
        .route("/events/:id/draw/next", post(draw_next))
        .route("/events/:id/reset", post(reset_draw))
        .route("/events/:id/export", get(export_event))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateEventRequest {
    name: String,
}

#[derive(Deserialize)]
struct AddParticipantRequest {
    name: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct DrawParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct EventView {
    id: String,
    owner_id: String,
    name: String,
    created_at: u64,
    draw_state: DrawState,
    #[serde(flatten)]
    progress: DrawProgress,
}

impl EventView {
    fn new(event: Event, participants: &[Participant]) -> Self {
        Self {
            id: event.id,
            owner_id: event.owner_id,
            name: event.name,
            created_at: event.created_at,
            draw_state: event.draw_state,
            progress: DrawProgress::of(participants),
        }
    }
}

/// Public participant fields; recipients are never listed.
#[derive(Serialize)]
struct ParticipantView {
    /// Unlocks a reveal; listed for the event owner only.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    is_drawn: bool,
}

impl ParticipantView {
    fn without_id(p: &Participant) -> Self {
        Self {
            id: None,
            ..Self::from(p)
        }
    }
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: Some(p.id.clone()),
            name: p.name.clone(),
            is_drawn: p.is_drawn,
        }
    }
}

#[derive(Serialize)]
struct EventDetail {
    #[serde(flatten)]
    event: EventView,
    participants: Vec<ParticipantView>,
}

#[derive(Serialize)]
struct RecipientView {
    id: String,
    name: String,
    email: Option<String>,
}

#[derive(Serialize)]
struct RevealResponse {
    participant: ParticipantView,
    recipient: RecipientView,
}

impl From<Reveal> for RevealResponse {
    fn from(reveal: Reveal) -> Self {
        Self {
            participant: ParticipantView::from(&reveal.giver),
            recipient: RecipientView {
                id: reveal.recipient.id,
                name: reveal.recipient.name,
                email: reveal.recipient.email,
            },
        }
    }
}

#[derive(Serialize)]
struct DrawResponse {
    draw_state: DrawState,
    participants: usize,
}

fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

async fn load_event(state: &AppState, event_id: &str) -> Result<Event, ApiError> {
    state
        .store()
        .get_event(event_id)
        .await?
        .ok_or_else(|| DrawError::EventNotFound(event_id.to_string()).into())
}

async fn owned_event(
    state: &AppState,
    event_id: &str,
    headers: &HeaderMap,
) -> Result<Event, ApiError> {
    let caller = caller_id(headers)?;
    let event = load_event(state, event_id).await?;
    if event.owner_id != caller {
        return Err(ApiError::Forbidden);
    }
    Ok(event)
}

async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = caller_id(&headers)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name required".into()));
    }

    let event = state.store().create_event(&owner_id, name).await?;
    tracing::info!(event_id = %event.id, owner_id = %owner_id, "event created");
    Ok((StatusCode::CREATED, Json(EventView::new(event, &[]))))
}

async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller_id(&headers)?;
    let events = state.store().list_events_by_user(&user_id).await?;

    let mut views = Vec::with_capacity(events.len());
    for event in events {
        let participants = state.store().list_participants(&event.id).await?;
        views.push(EventView::new(event, &participants));
    }
    Ok(Json(views))
}

async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let event = load_event(&state, &event_id).await?;
    let is_owner = caller_id(&headers).is_ok_and(|caller| caller == event.owner_id);
    let participants = state.store().list_participants(&event_id).await?;
    Ok(Json(EventDetail {
        participants: participants
            .iter()
            .map(|p| {
                if is_owner {
                    ParticipantView::from(p)
                } else {
                    ParticipantView::without_id(p)
                }
            })
            .collect(),
        event: EventView::new(event, &participants),
    }))
}

async fn add_participant(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<AddParticipantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_event(&state, &event_id, &headers).await?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name required".into()));
    }
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let participant = state.engine.add_participant(&event_id, name, email).await?;
    Ok((StatusCode::CREATED, Json(ParticipantView::from(&participant))))
}

async fn draw_all(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<DrawParams>,
) -> Result<impl IntoResponse, ApiError> {
    owned_event(&state, &event_id, &headers).await?;
    let assignment = state.engine.ensure_assignment(&event_id, params.seed).await?;
    Ok(Json(DrawResponse {
        draw_state: DrawState::Drawn,
        participants: assignment.len(),
    }))
}

async fn draw_next(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<DrawParams>,
) -> Result<impl IntoResponse, ApiError> {
    owned_event(&state, &event_id, &headers).await?;
    let reveal = state.engine.draw_next(&event_id, params.seed).await?;
    Ok(Json(RevealResponse::from(reveal)))
}

async fn reveal_for_participant(
    State(state): State<AppState>,
    Path((event_id, participant_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let reveal = state.engine.draw_for(&event_id, &participant_id).await?;
    Ok(Json(RevealResponse::from(reveal)))
}

async fn reset_draw(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    owned_event(&state, &event_id, &headers).await?;
    let event = state.engine.reset_draw(&event_id).await?;
    let participants = state.store().list_participants(&event_id).await?;
    Ok(Json(EventView::new(event, &participants)))
}

async fn export_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let event = owned_event(&state, &event_id, &headers).await?;
    if event.draw_state != DrawState::Drawn {
        return Err(ApiError::Conflict("event has not been drawn".into()));
    }
    let participants = state.store().list_participants(&event_id).await?;
    let csv = export_csv(&participants)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"draw-{event_id}.csv\""),
            ),
        ],
        csv,
    ))
}

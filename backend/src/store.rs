//! Participant store: the persistence collaborator the draw engine writes through.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use santa_core::{DrawError, DrawFields, DrawState, Event, EventId, Participant, ParticipantId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for DrawError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => DrawError::ConcurrentDrawConflict,
            StoreError::EventNotFound(id) => DrawError::EventNotFound(id),
            StoreError::ParticipantNotFound(id) => DrawError::ParticipantNotFound(id),
            other => DrawError::PersistenceFailure(other.to_string()),
        }
    }
}

/// Tables for events and participants.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn create_event(&self, owner_id: &str, name: &str) -> Result<Event, StoreError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StoreError>;

    async fn list_events_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError>;

    async fn add_participant(
        &self,
        event_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<Participant, StoreError>;

    /// Participants of an event in insertion order.
    async fn list_participants(&self, event_id: &str) -> Result<Vec<Participant>, StoreError>;

    async fn update_participant(
        &self,
        participant_id: &str,
        fields: DrawFields,
    ) -> Result<Participant, StoreError>;

    /// Moves the event to `state` if its version still equals `expected_version`.
    async fn set_draw_state(
        &self,
        event_id: &str,
        expected_version: u64,
        state: DrawState,
    ) -> Result<Event, StoreError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Tables {
    events: HashMap<EventId, Event>,
    participants: HashMap<EventId, Vec<Participant>>,
}

impl Tables {
    fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|p| p.id == participant_id)
    }
}

/// In-memory tables, optionally mirrored to a JSON snapshot on disk.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` if one exists; every later mutation rewrites it.
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            path = %path.display(),
            events = tables.events.len(),
            "loaded store snapshot"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            persist_path: Some(path),
        })
    }

    /// Runs `mutate` on a copy of the tables and swaps the copy in only once
    /// the snapshot write succeeded, so a failed write changes nothing.
    async fn apply<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let out = mutate(&mut next)?;
        if let Some(path) = &self.persist_path {
            write_snapshot(path, &next).await?;
        }
        *tables = next;
        Ok(out)
    }
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes next to the snapshot and renames over it; a crash mid-write leaves
/// the previous snapshot intact.
async fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(tables)?;
    let tmp = snapshot_tmp_path(path);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn create_event(&self, owner_id: &str, name: &str) -> Result<Event, StoreError> {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            created_at: now_millis(),
            draw_state: DrawState::Open,
            draw_version: 0,
        };
        self.apply(|tables| {
            tables.events.insert(event.id.clone(), event.clone());
            tables.participants.insert(event.id.clone(), Vec::new());
            Ok(event)
        })
        .await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.read().await.events.get(event_id).cloned())
    }

    async fn list_events_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| e.owner_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn add_participant(
        &self,
        event_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<Participant, StoreError> {
        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            is_drawn: false,
            assigned_to: None,
            sealed_recipient: None,
        };
        self.apply(|tables| {
            if !tables.events.contains_key(event_id) {
                return Err(StoreError::EventNotFound(event_id.to_string()));
            }
            tables
                .participants
                .entry(event_id.to_string())
                .or_default()
                .push(participant.clone());
            Ok(participant)
        })
        .await
    }

    async fn list_participants(&self, event_id: &str) -> Result<Vec<Participant>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.events.contains_key(event_id) {
            return Err(StoreError::EventNotFound(event_id.to_string()));
        }
        Ok(tables
            .participants
            .get(event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_participant(
        &self,
        participant_id: &str,
        fields: DrawFields,
    ) -> Result<Participant, StoreError> {
        self.apply(|tables| {
            let participant = tables
                .participant_mut(participant_id)
                .ok_or_else(|| StoreError::ParticipantNotFound(participant_id.to_string()))?;
            participant.sealed_recipient = fields.sealed_recipient;
            participant.assigned_to = fields.assigned_to;
            participant.is_drawn = fields.is_drawn;
            Ok(participant.clone())
        })
        .await
    }

    async fn set_draw_state(
        &self,
        event_id: &str,
        expected_version: u64,
        state: DrawState,
    ) -> Result<Event, StoreError> {
        self.apply(|tables| {
            let event = tables
                .events
                .get_mut(event_id)
                .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
            if event.draw_version != expected_version {
                return Err(StoreError::VersionConflict {
                    expected: expected_version,
                    found: event.draw_version,
                });
            }
            event.draw_state = state;
            event.draw_version += 1;
            Ok(event.clone())
        })
        .await
    }
}

mod assignment;
mod export;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use assignment::{compute_assignment, compute_assignment_with_rng, validate_assignment, Assignment};
pub use export::export_csv;

pub type UserId = String;
pub type EventId = String;
pub type ParticipantId = String;

/// Fewest participants a draw can run with.
pub const MIN_PARTICIPANTS: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawState {
    Open,
    Drawing,
    Drawn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub owner_id: UserId,
    pub name: String,
    pub created_at: u64,
    pub draw_state: DrawState,
    /// Bumped on every draw state transition.
    pub draw_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub event_id: EventId,
    pub name: String,
    pub email: Option<String>,
    pub is_drawn: bool,
    pub assigned_to: Option<ParticipantId>,
    /// Recipient committed by the draw but not revealed yet.
    pub sealed_recipient: Option<ParticipantId>,
}

impl Participant {
    pub fn draw_fields(&self) -> DrawFields {
        DrawFields {
            sealed_recipient: self.sealed_recipient.clone(),
            assigned_to: self.assigned_to.clone(),
            is_drawn: self.is_drawn,
        }
    }
}

/// The participant columns a draw, reveal or reset is allowed to write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawFields {
    pub sealed_recipient: Option<ParticipantId>,
    pub assigned_to: Option<ParticipantId>,
    pub is_drawn: bool,
}

impl DrawFields {
    pub fn sealed(recipient: ParticipantId) -> Self {
        Self {
            sealed_recipient: Some(recipient),
            assigned_to: None,
            is_drawn: false,
        }
    }

    pub fn revealed(recipient: ParticipantId) -> Self {
        Self {
            sealed_recipient: Some(recipient.clone()),
            assigned_to: Some(recipient),
            is_drawn: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DrawProgress {
    pub total_participants: usize,
    pub drawn_count: usize,
}

impl DrawProgress {
    pub fn of(participants: &[Participant]) -> Self {
        Self {
            total_participants: participants.len(),
            drawn_count: participants.iter().filter(|p| p.is_drawn).count(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("at least 2 participants required, found {found}")]
    InsufficientParticipants { found: usize },
    #[error("participant {0} listed more than once")]
    DuplicateParticipant(ParticipantId),
    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),
    #[error("participant already drew a name")]
    AlreadyDrawn,
    #[error("every participant has already drawn")]
    AllDrawn,
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("another draw is in progress for this event")]
    ConcurrentDrawConflict,
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),
    #[error("event is closed to changes while a draw exists")]
    DrawClosed,
}

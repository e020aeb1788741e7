use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::{DrawError, Participant, ParticipantId, MIN_PARTICIPANTS};

/// Giver to recipient mapping for one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pairs: HashMap<ParticipantId, ParticipantId>,
}

impl Assignment {
    pub fn recipient_of(&self, giver: &str) -> Option<&ParticipantId> {
        self.pairs.get(giver)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantId)> {
        self.pairs.iter()
    }

    /// Reads the committed mapping back out of persisted participants.
    pub fn from_sealed(participants: &[Participant]) -> Result<Self, DrawError> {
        let mut pairs = HashMap::with_capacity(participants.len());
        for p in participants {
            let recipient = p.sealed_recipient.clone().ok_or_else(|| {
                DrawError::InvalidAssignment(format!("participant {} has no recipient", p.id))
            })?;
            pairs.insert(p.id.clone(), recipient);
        }
        let assignment = Self { pairs };
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        validate_assignment(&ids, &assignment)?;
        Ok(assignment)
    }
}

impl FromIterator<(ParticipantId, ParticipantId)> for Assignment {
    fn from_iter<T: IntoIterator<Item = (ParticipantId, ParticipantId)>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

pub fn compute_assignment(participant_ids: &[ParticipantId]) -> Result<Assignment, DrawError> {
    compute_assignment_with_rng(participant_ids, &mut thread_rng())
}

/// Draws a uniformly random derangement by shuffling and rejecting any
/// permutation with a fixed point. Expected retries are below e for every n.
pub fn compute_assignment_with_rng<R: Rng + ?Sized>(
    participant_ids: &[ParticipantId],
    rng: &mut R,
) -> Result<Assignment, DrawError> {
    check_unique(participant_ids)?;
    if participant_ids.len() < MIN_PARTICIPANTS {
        return Err(DrawError::InsufficientParticipants {
            found: participant_ids.len(),
        });
    }

    let mut recipients = participant_ids.to_vec();
    loop {
        recipients.shuffle(rng);
        let has_fixed_point = participant_ids
            .iter()
            .zip(recipients.iter())
            .any(|(giver, recipient)| giver == recipient);
        if !has_fixed_point {
            break;
        }
    }

    Ok(participant_ids
        .iter()
        .cloned()
        .zip(recipients)
        .collect())
}

/// Checks that `assignment` is a bijection over `participant_ids` with no
/// participant assigned to themselves.
pub fn validate_assignment(
    participant_ids: &[ParticipantId],
    assignment: &Assignment,
) -> Result<(), DrawError> {
    check_unique(participant_ids)?;
    if participant_ids.len() < MIN_PARTICIPANTS {
        return Err(DrawError::InsufficientParticipants {
            found: participant_ids.len(),
        });
    }
    if assignment.len() != participant_ids.len() {
        return Err(DrawError::InvalidAssignment(format!(
            "{} pairs for {} participants",
            assignment.len(),
            participant_ids.len()
        )));
    }

    let ids: HashSet<&ParticipantId> = participant_ids.iter().collect();
    let mut seen: HashSet<&ParticipantId> = HashSet::with_capacity(ids.len());
    for giver in participant_ids {
        let recipient = assignment.recipient_of(giver).ok_or_else(|| {
            DrawError::InvalidAssignment(format!("participant {giver} has no recipient"))
        })?;
        if recipient == giver {
            return Err(DrawError::InvalidAssignment(format!(
                "participant {giver} is assigned to themselves"
            )));
        }
        if !ids.contains(recipient) {
            return Err(DrawError::InvalidAssignment(format!(
                "recipient {recipient} is not a participant"
            )));
        }
        if !seen.insert(recipient) {
            return Err(DrawError::InvalidAssignment(format!(
                "recipient {recipient} assigned more than once"
            )));
        }
    }
    Ok(())
}

fn check_unique(participant_ids: &[ParticipantId]) -> Result<(), DrawError> {
    let mut seen = HashSet::with_capacity(participant_ids.len());
    for id in participant_ids {
        if !seen.insert(id) {
            return Err(DrawError::DuplicateParticipant(id.clone()));
        }
    }
    Ok(())
}

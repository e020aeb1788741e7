//! Draw transactions over a [`ParticipantStore`].
//!
//! A draw moves an event `open -> drawing -> drawn`. Sealed recipients are
//! written for every participant between the two transitions and rolled back
//! if any write fails, so reveals (which require `drawn`) never see a partial
//! mapping. Operations on one event are serialized by an in-process lock; the
//! store's draw version catches writers in other processes.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use santa_core::{
    compute_assignment_with_rng, Assignment, DrawError, DrawFields, DrawState, Event, EventId,
    Participant, ParticipantId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::store::{ParticipantStore, StoreError};

/// What a second reveal for the same participant does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicy {
    /// Return the recipient revealed the first time.
    #[default]
    Idempotent,
    /// Fail with `AlreadyDrawn`.
    Strict,
}

impl FromStr for RevealPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idempotent" => Ok(Self::Idempotent),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown reveal policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub giver: Participant,
    pub recipient: Participant,
}

pub struct DrawEngine {
    store: Arc<dyn ParticipantStore>,
    policy: RevealPolicy,
    locks: Mutex<HashMap<EventId, Arc<Mutex<()>>>>,
}

impl DrawEngine {
    pub fn new(store: Arc<dyn ParticipantStore>, policy: RevealPolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ParticipantStore> {
        &self.store
    }

    /// Adds a participant while the event is still open for changes.
    pub async fn add_participant(
        &self,
        event_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<Participant, DrawError> {
        let lock = self.event_lock(event_id).await;
        let _guard = lock.lock().await;

        let event = self.load_event(event_id).await?;
        if event.draw_state != DrawState::Open {
            return Err(DrawError::DrawClosed);
        }
        let existing = self.store.list_participants(event_id).await?;
        if existing.iter().any(|p| p.name == name) {
            return Err(DrawError::DuplicateParticipant(name.to_string()));
        }
        Ok(self.store.add_participant(event_id, name, email).await?)
    }

    /// Commits an assignment for the event if it has none and returns the
    /// committed one. Nothing is revealed.
    pub async fn ensure_assignment(
        &self,
        event_id: &str,
        seed: Option<u64>,
    ) -> Result<Assignment, DrawError> {
        let lock = self.event_lock(event_id).await;
        let _guard = lock.lock().await;
        let (_, assignment) = self.committed(event_id, seed).await?;
        Ok(assignment)
    }

    /// Reveals the recipient of `participant_id`, drawing the event first if
    /// needed. Any participant may trigger this, so the draw is never seeded.
    pub async fn draw_for(
        &self,
        event_id: &str,
        participant_id: &str,
    ) -> Result<Reveal, DrawError> {
        let lock = self.event_lock(event_id).await;
        let _guard = lock.lock().await;

        let (participants, _) = self.committed(event_id, None).await?;
        let giver = participants
            .iter()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| DrawError::ParticipantNotFound(participant_id.to_string()))?;
        self.reveal(giver, &participants).await
    }

    /// Reveals for the first participant, in store order, who has not drawn yet.
    pub async fn draw_next(&self, event_id: &str, seed: Option<u64>) -> Result<Reveal, DrawError> {
        let lock = self.event_lock(event_id).await;
        let _guard = lock.lock().await;

        let (participants, _) = self.committed(event_id, seed).await?;
        let giver = participants
            .iter()
            .find(|p| !p.is_drawn)
            .ok_or(DrawError::AllDrawn)?;
        self.reveal(giver, &participants).await
    }

    /// Clears every participant's draw fields and reopens the event.
    ///
    /// Also recovers an event left in `drawing` by a writer that died mid-draw.
    /// If a clear fails the event stays in `drawing` and the reset can be retried.
    pub async fn reset_draw(&self, event_id: &str) -> Result<Event, DrawError> {
        let lock = self.event_lock(event_id).await;
        let _guard = lock.lock().await;

        let event = self.load_event(event_id).await?;
        let participants = self.store.list_participants(event_id).await?;

        let claimed = match event.draw_state {
            DrawState::Open => None,
            DrawState::Drawing | DrawState::Drawn => Some(
                self.store
                    .set_draw_state(event_id, event.draw_version, DrawState::Drawing)
                    .await?,
            ),
        };

        let cleared = DrawFields::default();
        for p in participants.iter().filter(|p| p.draw_fields() != cleared) {
            self.store.update_participant(&p.id, cleared.clone()).await?;
        }

        let event = match claimed {
            Some(claimed) => {
                self.store
                    .set_draw_state(event_id, claimed.draw_version, DrawState::Open)
                    .await?
            }
            None => event,
        };
        info!(event_id, participants = participants.len(), "draw reset");
        Ok(event)
    }

    async fn event_lock(&self, event_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(event_id.to_string()).or_default().clone()
    }

    async fn load_event(&self, event_id: &str) -> Result<Event, DrawError> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or_else(|| DrawError::EventNotFound(event_id.to_string()))
    }

    /// Participants of a drawn event with their validated mapping. Runs the
    /// draw transaction first when the event is still open.
    async fn committed(
        &self,
        event_id: &str,
        seed: Option<u64>,
    ) -> Result<(Vec<Participant>, Assignment), DrawError> {
        let event = self.load_event(event_id).await?;
        match event.draw_state {
            DrawState::Drawn => {}
            DrawState::Drawing => return Err(DrawError::ConcurrentDrawConflict),
            DrawState::Open => self.commit_draw(&event, seed).await?,
        }
        let participants = self.store.list_participants(event_id).await?;
        let assignment = Assignment::from_sealed(&participants)?;
        Ok((participants, assignment))
    }

    async fn commit_draw(&self, event: &Event, seed: Option<u64>) -> Result<(), DrawError> {
        let participants = self.store.list_participants(&event.id).await?;
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        let mut rng = seed
            .map(ChaCha8Rng::seed_from_u64)
            .unwrap_or_else(ChaCha8Rng::from_entropy);
        let assignment = compute_assignment_with_rng(&ids, &mut rng)?;

        let staged = participants
            .iter()
            .map(|p| {
                assignment
                    .recipient_of(&p.id)
                    .cloned()
                    .map(|recipient| (p, DrawFields::sealed(recipient)))
                    .ok_or_else(|| {
                        DrawError::InvalidAssignment(format!("participant {} left out", p.id))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let claimed = match self
            .store
            .set_draw_state(&event.id, event.draw_version, DrawState::Drawing)
            .await
        {
            Ok(claimed) => claimed,
            Err(StoreError::VersionConflict { .. }) => {
                // Another writer got there first; accept its draw if it finished.
                let current = self.load_event(&event.id).await?;
                return match current.draw_state {
                    DrawState::Drawn => Ok(()),
                    _ => Err(DrawError::ConcurrentDrawConflict),
                };
            }
            Err(err) => return Err(err.into()),
        };

        for (written, (participant, fields)) in staged.iter().enumerate() {
            if let Err(err) = self
                .store
                .update_participant(&participant.id, fields.clone())
                .await
            {
                warn!(
                    event_id = %event.id,
                    participant_id = %participant.id,
                    error = %err,
                    "draw write failed, rolling back"
                );
                self.abort_draw(&claimed, &participants[..=written]).await;
                return Err(DrawError::PersistenceFailure(err.to_string()));
            }
        }

        if let Err(err) = self
            .store
            .set_draw_state(&event.id, claimed.draw_version, DrawState::Drawn)
            .await
        {
            warn!(event_id = %event.id, error = %err, "draw commit failed, rolling back");
            self.abort_draw(&claimed, &participants).await;
            return Err(err.into());
        }

        info!(
            event_id = %event.id,
            participants = participants.len(),
            seeded = seed.is_some(),
            "draw committed"
        );
        Ok(())
    }

    /// Restores `touched` to their pre-draw fields and reopens the event. If a
    /// restore fails the event is left in `drawing` so nothing can be revealed.
    async fn abort_draw(&self, claimed: &Event, touched: &[Participant]) {
        let mut restored = true;
        for p in touched {
            if let Err(err) = self.store.update_participant(&p.id, p.draw_fields()).await {
                error!(
                    event_id = %claimed.id,
                    participant_id = %p.id,
                    error = %err,
                    "rollback failed"
                );
                restored = false;
            }
        }
        if !restored {
            return;
        }
        if let Err(err) = self
            .store
            .set_draw_state(&claimed.id, claimed.draw_version, DrawState::Open)
            .await
        {
            error!(event_id = %claimed.id, error = %err, "could not reopen event after rollback");
        }
    }

    async fn reveal(
        &self,
        giver: &Participant,
        participants: &[Participant],
    ) -> Result<Reveal, DrawError> {
        let recipient_id = giver.sealed_recipient.clone().ok_or_else(|| {
            DrawError::InvalidAssignment(format!("participant {} has no recipient", giver.id))
        })?;
        let recipient = participants
            .iter()
            .find(|p| p.id == recipient_id)
            .cloned()
            .ok_or_else(|| DrawError::ParticipantNotFound(recipient_id.clone()))?;

        if giver.is_drawn {
            return match self.policy {
                RevealPolicy::Idempotent => Ok(Reveal {
                    giver: giver.clone(),
                    recipient,
                }),
                RevealPolicy::Strict => Err(DrawError::AlreadyDrawn),
            };
        }

        let giver = self
            .store
            .update_participant(&giver.id, DrawFields::revealed(recipient_id))
            .await?;
        info!(event_id = %giver.event_id, participant_id = %giver.id, "recipient revealed");
        Ok(Reveal { giver, recipient })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use santa_core::{validate_assignment, DrawProgress};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fails `update_participant` at call number `fail_at` (and every call
    /// after it when `sticky`).
    struct FailingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
        fail_at: usize,
        sticky: bool,
    }

    impl FailingStore {
        fn new(fail_at: usize, sticky: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                calls: AtomicUsize::new(0),
                fail_at,
                sticky,
            }
        }
    }

    #[async_trait]
    impl ParticipantStore for FailingStore {
        async fn create_event(&self, owner_id: &str, name: &str) -> Result<Event, StoreError> {
            self.inner.create_event(owner_id, name).await
        }

        async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
            self.inner.get_event(event_id).await
        }

        async fn list_events_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
            self.inner.list_events_by_user(user_id).await
        }

        async fn add_participant(
            &self,
            event_id: &str,
            name: &str,
            email: Option<&str>,
        ) -> Result<Participant, StoreError> {
            self.inner.add_participant(event_id, name, email).await
        }

        async fn list_participants(
            &self,
            event_id: &str,
        ) -> Result<Vec<Participant>, StoreError> {
            self.inner.list_participants(event_id).await
        }

        async fn update_participant(
            &self,
            participant_id: &str,
            fields: DrawFields,
        ) -> Result<Participant, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_at || (self.sticky && call > self.fail_at) {
                return Err(StoreError::Unavailable("injected failure".into()));
            }
            self.inner.update_participant(participant_id, fields).await
        }

        async fn set_draw_state(
            &self,
            event_id: &str,
            expected_version: u64,
            state: DrawState,
        ) -> Result<Event, StoreError> {
            self.inner
                .set_draw_state(event_id, expected_version, state)
                .await
        }
    }

    /// Runs a rival writer against the inner store just before the first
    /// claim lands, the way a second process would. The rival either
    /// finishes a seeded draw or stops after its own claim.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        rival: DrawEngine,
        rival_finishes: bool,
        raced: AtomicBool,
    }

    impl RacingStore {
        fn new(rival_finishes: bool) -> Self {
            let inner = Arc::new(MemoryStore::new());
            Self {
                rival: engine_over(inner.clone()),
                inner,
                rival_finishes,
                raced: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ParticipantStore for RacingStore {
        async fn create_event(&self, owner_id: &str, name: &str) -> Result<Event, StoreError> {
            self.inner.create_event(owner_id, name).await
        }

        async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
            self.inner.get_event(event_id).await
        }

        async fn list_events_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
            self.inner.list_events_by_user(user_id).await
        }

        async fn add_participant(
            &self,
            event_id: &str,
            name: &str,
            email: Option<&str>,
        ) -> Result<Participant, StoreError> {
            self.inner.add_participant(event_id, name, email).await
        }

        async fn list_participants(
            &self,
            event_id: &str,
        ) -> Result<Vec<Participant>, StoreError> {
            self.inner.list_participants(event_id).await
        }

        async fn update_participant(
            &self,
            participant_id: &str,
            fields: DrawFields,
        ) -> Result<Participant, StoreError> {
            self.inner.update_participant(participant_id, fields).await
        }

        async fn set_draw_state(
            &self,
            event_id: &str,
            expected_version: u64,
            state: DrawState,
        ) -> Result<Event, StoreError> {
            if state == DrawState::Drawing && !self.raced.swap(true, Ordering::SeqCst) {
                if self.rival_finishes {
                    self.rival
                        .ensure_assignment(event_id, Some(7))
                        .await
                        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                } else {
                    self.inner
                        .set_draw_state(event_id, expected_version, DrawState::Drawing)
                        .await?;
                }
            }
            self.inner
                .set_draw_state(event_id, expected_version, state)
                .await
        }
    }

    async fn seeded_event(store: &dyn ParticipantStore, names: &[&str]) -> Event {
        let event = store.create_event("owner", "Christmas").await.unwrap();
        for name in names {
            store.add_participant(&event.id, name, None).await.unwrap();
        }
        event
    }

    fn engine_over(store: Arc<dyn ParticipantStore>) -> DrawEngine {
        DrawEngine::new(store, RevealPolicy::Idempotent)
    }

    #[tokio::test]
    async fn bulk_draw_commits_valid_derangement() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla", "davi"]).await;
        let engine = engine_over(store.clone());

        let assignment = engine.ensure_assignment(&event.id, None).await.unwrap();
        let participants = store.list_participants(&event.id).await.unwrap();
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        validate_assignment(&ids, &assignment).unwrap();

        // Nothing revealed yet.
        assert!(participants.iter().all(|p| !p.is_drawn && p.assigned_to.is_none()));
        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Drawn);

        // A second call returns the same committed mapping.
        let again = engine.ensure_assignment(&event.id, None).await.unwrap();
        assert_eq!(assignment, again);
    }

    #[tokio::test]
    async fn draw_needs_two_participants() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["solo"]).await;
        let engine = engine_over(store.clone());

        let err = engine.ensure_assignment(&event.id, None).await.unwrap_err();
        assert_eq!(err, DrawError::InsufficientParticipants { found: 1 });
        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Open);
        assert_eq!(stored.draw_version, 0);
    }

    #[tokio::test]
    async fn two_participants_swap_on_reveal() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno"]).await;
        let engine = engine_over(store.clone());
        let participants = store.list_participants(&event.id).await.unwrap();

        let reveal = engine
            .draw_for(&event.id, &participants[0].id)
            .await
            .unwrap();
        assert_eq!(reveal.recipient.id, participants[1].id);
        assert!(reveal.giver.is_drawn);
        assert_eq!(reveal.giver.assigned_to.as_deref(), Some(participants[1].id.as_str()));
    }

    #[tokio::test]
    async fn repeated_reveal_returns_same_recipient() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());
        let ana = store.list_participants(&event.id).await.unwrap()[0].clone();

        let first = engine.draw_for(&event.id, &ana.id).await.unwrap();
        let second = engine.draw_for(&event.id, &ana.id).await.unwrap();
        assert_eq!(first.recipient.id, second.recipient.id);
        assert_eq!(first.giver, second.giver);

        let progress = DrawProgress::of(&store.list_participants(&event.id).await.unwrap());
        assert_eq!(progress.drawn_count, 1);
    }

    #[tokio::test]
    async fn strict_policy_rejects_repeated_reveal() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = DrawEngine::new(store.clone(), RevealPolicy::Strict);
        let ana = store.list_participants(&event.id).await.unwrap()[0].clone();

        engine.draw_for(&event.id, &ana.id).await.unwrap();
        let err = engine.draw_for(&event.id, &ana.id).await.unwrap_err();
        assert_eq!(err, DrawError::AlreadyDrawn);
    }

    #[tokio::test]
    async fn sequential_reveals_cover_everyone_then_stop() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());

        let mut givers = Vec::new();
        let mut recipients = Vec::new();
        for _ in 0..3 {
            let reveal = engine.draw_next(&event.id, Some(9)).await.unwrap();
            assert_ne!(reveal.giver.id, reveal.recipient.id);
            givers.push(reveal.giver.name);
            recipients.push(reveal.recipient.id);
        }
        assert_eq!(givers, vec!["ana", "bruno", "carla"]);
        recipients.sort();
        recipients.dedup();
        assert_eq!(recipients.len(), 3);

        let err = engine.draw_next(&event.id, None).await.unwrap_err();
        assert_eq!(err, DrawError::AllDrawn);

        // Once everyone revealed, assigned_to is a bijection.
        let participants = store.list_participants(&event.id).await.unwrap();
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        let revealed: Assignment = participants
            .iter()
            .map(|p| (p.id.clone(), p.assigned_to.clone().unwrap()))
            .collect();
        validate_assignment(&ids, &revealed).unwrap();
    }

    #[tokio::test]
    async fn unknown_participant_and_event_are_reported() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno"]).await;
        let engine = engine_over(store.clone());

        let err = engine.draw_for(&event.id, "ghost").await.unwrap_err();
        assert_eq!(err, DrawError::ParticipantNotFound("ghost".into()));
        let err = engine.draw_next("nope", None).await.unwrap_err();
        assert_eq!(err, DrawError::EventNotFound("nope".into()));
    }

    #[tokio::test]
    async fn reset_clears_every_participant() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());
        engine.draw_next(&event.id, None).await.unwrap();
        engine.draw_next(&event.id, None).await.unwrap();

        let reopened = engine.reset_draw(&event.id).await.unwrap();
        assert_eq!(reopened.draw_state, DrawState::Open);

        let participants = store.list_participants(&event.id).await.unwrap();
        assert_eq!(participants.len(), 3);
        for p in &participants {
            assert!(!p.is_drawn);
            assert!(p.assigned_to.is_none());
            assert!(p.sealed_recipient.is_none());
        }

        // The event can be drawn again.
        let assignment = engine.ensure_assignment(&event.id, None).await.unwrap();
        assert_eq!(assignment.len(), 3);
    }

    #[tokio::test]
    async fn participants_cannot_join_a_drawn_event() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno"]).await;
        let engine = engine_over(store.clone());

        let err = engine.add_participant(&event.id, "ana", None).await.unwrap_err();
        assert_eq!(err, DrawError::DuplicateParticipant("ana".into()));

        engine.ensure_assignment(&event.id, None).await.unwrap();
        let err = engine.add_participant(&event.id, "carla", None).await.unwrap_err();
        assert_eq!(err, DrawError::DrawClosed);
    }

    #[tokio::test]
    async fn failed_write_leaves_event_undrawn() {
        let store = Arc::new(FailingStore::new(2, false));
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla", "davi"]).await;
        let engine = engine_over(store.clone());

        let err = engine.ensure_assignment(&event.id, None).await.unwrap_err();
        assert!(matches!(err, DrawError::PersistenceFailure(_)));

        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Open);
        for p in store.list_participants(&event.id).await.unwrap() {
            assert_eq!(p.draw_fields(), DrawFields::default());
        }

        // The injected failure was one-off; a retry succeeds.
        engine.ensure_assignment(&event.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn failed_rollback_keeps_event_locked() {
        let store = Arc::new(FailingStore::new(1, true));
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());

        let err = engine.draw_next(&event.id, None).await.unwrap_err();
        assert!(matches!(err, DrawError::PersistenceFailure(_)));

        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Drawing);
        let err = engine.draw_next(&event.id, None).await.unwrap_err();
        assert_eq!(err, DrawError::ConcurrentDrawConflict);
    }

    #[tokio::test]
    async fn simultaneous_first_draws_commit_once() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla", "davi", "eva"]).await;
        let engine = Arc::new(engine_over(store.clone()));

        let (a, b) = tokio::join!(
            {
                let engine = engine.clone();
                let id = event.id.clone();
                tokio::spawn(async move { engine.ensure_assignment(&id, None).await })
            },
            {
                let engine = engine.clone();
                let id = event.id.clone();
                tokio::spawn(async move { engine.ensure_assignment(&id, None).await })
            }
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a, b);

        // open -> drawing -> drawn and nothing more.
        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_version, 2);
    }

    #[tokio::test]
    async fn losing_claim_returns_rivals_committed_draw() {
        let store = Arc::new(RacingStore::new(true));
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla", "davi"]).await;
        let engine = engine_over(store.clone());

        let seen = engine.ensure_assignment(&event.id, None).await.unwrap();

        let participants = store.list_participants(&event.id).await.unwrap();
        let committed = Assignment::from_sealed(&participants).unwrap();
        assert_eq!(seen, committed);
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        let rivals = compute_assignment_with_rng(&ids, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        assert_eq!(seen, rivals);

        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Drawn);
        assert_eq!(stored.draw_version, 2);
    }

    #[tokio::test]
    async fn losing_claim_during_rival_draw_conflicts() {
        let store = Arc::new(RacingStore::new(false));
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());

        let err = engine.ensure_assignment(&event.id, None).await.unwrap_err();
        assert_eq!(err, DrawError::ConcurrentDrawConflict);

        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Drawing);
        assert_eq!(stored.draw_version, 1);
        for p in store.list_participants(&event.id).await.unwrap() {
            assert_eq!(p.draw_fields(), DrawFields::default());
        }
    }

    #[tokio::test]
    async fn draw_retries_cleanly_after_snapshot_write_fails() {
        let dir = std::env::temp_dir().join(format!("santa_engine_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let store = Arc::new(MemoryStore::with_persistence(dir.join("state.json")).await.unwrap());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla"]).await;
        let engine = engine_over(store.clone());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
        let err = engine.ensure_assignment(&event.id, None).await.unwrap_err();
        assert!(matches!(err, DrawError::PersistenceFailure(_)));
        let stored = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.draw_state, DrawState::Open);
        assert_eq!(stored.draw_version, 0);

        tokio::fs::create_dir_all(&dir).await.unwrap();
        let assignment = engine.ensure_assignment(&event.id, None).await.unwrap();
        assert_eq!(assignment.len(), 3);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn seeded_draws_repeat_after_reset() {
        let store = Arc::new(MemoryStore::new());
        let event = seeded_event(store.as_ref(), &["ana", "bruno", "carla", "davi"]).await;
        let engine = engine_over(store.clone());

        let first = engine.ensure_assignment(&event.id, Some(42)).await.unwrap();
        engine.reset_draw(&event.id).await.unwrap();
        let second = engine.ensure_assignment(&event.id, Some(42)).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reveal_policy_parses_case_insensitively() {
        assert_eq!("Strict".parse::<RevealPolicy>(), Ok(RevealPolicy::Strict));
        assert_eq!(" idempotent ".parse::<RevealPolicy>(), Ok(RevealPolicy::Idempotent));
        assert!("sometimes".parse::<RevealPolicy>().is_err());
    }
}

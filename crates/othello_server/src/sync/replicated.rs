//! Replicated document: a last-writer-wins map per game.
//!
//! Each field is a register stamped with a Lamport clock and the writing
//! replica's id. Merging keeps the higher stamp, so replicas converge no
//! matter the delivery order. A full-state write stamps all fields with the
//! same stamp, which keeps a merged document from mixing two writes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use othello_rules::ParticipantId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::{Subscription, SyncChannel, SyncError, SyncMessage, SyncMode};
use crate::session::GameId;

/// Ordering key of a write: Lamport clock first, replica id breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    /// Lamport clock value.
    pub clock: u64,
    /// Id of the replica that wrote.
    pub replica: u64,
}

/// Single value that keeps the write with the highest stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    stamp: Stamp,
}

impl<T: Clone + PartialEq> LwwRegister<T> {
    /// Creates a register holding `value` written at `stamp`.
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Stamp of the current value.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Keeps the incoming write if its stamp is newer. Returns whether the
    /// register changed.
    pub fn merge(&mut self, value: &T, stamp: Stamp) -> bool {
        if stamp > self.stamp {
            self.value = value.clone();
            self.stamp = stamp;
            true
        } else {
            false
        }
    }
}

/// One field assignment inside a [`DocUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldWrite {
    /// Board encoding.
    Cells(String),
    /// Turn encoding.
    Turn(String),
    /// Black participant.
    BlackPlayer(ParticipantId),
    /// Move-sequence number.
    Version(u64),
}

/// A batch of field writes sharing one stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocUpdate {
    /// Game the writes belong to.
    pub session_id: GameId,
    /// Stamp of every write in the batch.
    pub stamp: Stamp,
    /// Field assignments.
    pub writes: Vec<FieldWrite>,
}

impl DocUpdate {
    /// The full state this update writes, if it carries every field.
    pub fn proposal(&self) -> Option<SyncMessage> {
        let mut doc = GameDocument::default();
        for write in &self.writes {
            doc.apply(write, self.stamp);
        }
        doc.materialize(self.session_id)
    }
}

/// The replicated fields of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameDocument {
    cells: Option<LwwRegister<String>>,
    turn: Option<LwwRegister<String>>,
    black_player: Option<LwwRegister<ParticipantId>>,
    version: Option<LwwRegister<u64>>,
}

fn merge_field<T: Clone + PartialEq>(
    slot: &mut Option<LwwRegister<T>>,
    value: &T,
    stamp: Stamp,
) -> bool {
    match slot {
        Some(register) => register.merge(value, stamp),
        None => {
            *slot = Some(LwwRegister::new(value.clone(), stamp));
            true
        }
    }
}

impl GameDocument {
    /// Applies one field write. Returns whether the document changed.
    pub fn apply(&mut self, write: &FieldWrite, stamp: Stamp) -> bool {
        match write {
            FieldWrite::Cells(v) => merge_field(&mut self.cells, v, stamp),
            FieldWrite::Turn(v) => merge_field(&mut self.turn, v, stamp),
            FieldWrite::BlackPlayer(v) => merge_field(&mut self.black_player, v, stamp),
            FieldWrite::Version(v) => merge_field(&mut self.version, v, stamp),
        }
    }

    /// The full state, once every field has been written at least once.
    pub fn materialize(&self, session_id: GameId) -> Option<SyncMessage> {
        Some(SyncMessage {
            session_id,
            cells: self.cells.as_ref()?.value().clone(),
            turn: self.turn.as_ref()?.value().clone(),
            black_player_id: *self.black_player.as_ref()?.value(),
            version: *self.version.as_ref()?.value(),
        })
    }

    /// Every field as its own update, preserving the original stamps.
    pub fn as_updates(&self, session_id: GameId) -> Vec<DocUpdate> {
        let single = |write: FieldWrite, stamp: Stamp| DocUpdate {
            session_id,
            stamp,
            writes: vec![write],
        };
        let mut updates = Vec::with_capacity(4);
        if let Some(r) = &self.cells {
            updates.push(single(FieldWrite::Cells(r.value().clone()), r.stamp()));
        }
        if let Some(r) = &self.turn {
            updates.push(single(FieldWrite::Turn(r.value().clone()), r.stamp()));
        }
        if let Some(r) = &self.black_player {
            updates.push(single(FieldWrite::BlackPlayer(*r.value()), r.stamp()));
        }
        if let Some(r) = &self.version {
            updates.push(single(FieldWrite::Version(*r.value()), r.stamp()));
        }
        updates
    }
}

/// One participant's copy of the replicated documents.
#[derive(Debug, Clone)]
pub struct Replica {
    id: u64,
    clock: u64,
    docs: HashMap<GameId, GameDocument>,
}

impl Replica {
    /// Creates an empty replica. Ids must be unique among peers.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            clock: 0,
            docs: HashMap::new(),
        }
    }

    /// This replica's id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Writes a full state locally and returns the update to ship to peers.
    #[instrument(skip(self, message), fields(replica = self.id, game_id = %message.session_id))]
    pub fn write(&mut self, message: &SyncMessage) -> DocUpdate {
        self.clock += 1;
        let update = DocUpdate {
            session_id: message.session_id,
            stamp: Stamp {
                clock: self.clock,
                replica: self.id,
            },
            writes: vec![
                FieldWrite::Cells(message.cells.clone()),
                FieldWrite::Turn(message.turn.clone()),
                FieldWrite::BlackPlayer(message.black_player_id),
                FieldWrite::Version(message.version),
            ],
        };
        self.merge(&update);
        debug!(clock = self.clock, "Local write");
        update
    }

    /// Merges an update from any replica. Returns whether anything changed.
    pub fn merge(&mut self, update: &DocUpdate) -> bool {
        self.clock = self.clock.max(update.stamp.clock);
        let doc = self.docs.entry(update.session_id).or_default();
        let mut changed = false;
        for write in &update.writes {
            changed |= doc.apply(write, update.stamp);
        }
        changed
    }

    /// Materialized state of `session`, if complete.
    pub fn snapshot(&self, session: GameId) -> Option<SyncMessage> {
        self.docs.get(&session)?.materialize(session)
    }

    /// Drops the documents of games `keep` rejects. The clock is kept, so
    /// later writes still order after everything seen so far.
    pub fn retain(&mut self, mut keep: impl FnMut(GameId) -> bool) {
        self.docs.retain(|session, _| keep(*session));
    }

    /// Number of games this replica holds a document for.
    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    /// Updates that bring an empty replica up to this one for `session`.
    pub fn state_updates(&self, session: GameId) -> Vec<DocUpdate> {
        self.docs
            .get(&session)
            .map(|doc| doc.as_updates(session))
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct Hub {
    origin: Replica,
    next_replica: u64,
    topics: HashMap<GameId, broadcast::Sender<DocUpdate>>,
}

impl Hub {
    /// Removes topics nobody listens to, and the documents of games
    /// without a topic.
    fn prune(&mut self) {
        let before = self.topics.len();
        self.topics.retain(|_, tx| tx.receiver_count() > 0);
        let topics = &self.topics;
        self.origin.retain(|session| topics.contains_key(&session));
        let pruned = before - self.topics.len();
        if pruned > 0 {
            debug!(pruned, "Idle replication topics pruned");
        }
    }
}

/// Replicated-document channel.
///
/// Holds the server's replica; every subscriber gets its own replica seeded
/// from it and kept current by merging the broadcast updates. Only
/// published (committed) states enter the document. A peer that writes on
/// its own [`Replica`] hands the resulting update to
/// [`SessionRegistry::submit_peer_write`](crate::SessionRegistry::submit_peer_write),
/// which validates it as a move before it is published.
///
/// Documents are kept only for games with live subscribers.
#[derive(Debug)]
pub struct ReplicatedChannel {
    capacity: usize,
    hub: Mutex<Hub>,
}

impl ReplicatedChannel {
    /// Creates a channel whose per-game buffers hold `capacity` updates.
    #[instrument]
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Creating replicated channel");
        Self {
            capacity: capacity.max(1),
            hub: Mutex::new(Hub {
                origin: Replica::new(0),
                next_replica: 1,
                topics: HashMap::new(),
            }),
        }
    }

    fn hub(&self) -> Result<MutexGuard<'_, Hub>, SyncError> {
        self.hub
            .lock()
            .map_err(|_| SyncError::new("Replication hub poisoned"))
    }

    /// Hands out a fresh peer replica seeded with the current document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the hub is unusable.
    pub fn peer(&self, session: GameId) -> Result<Replica, SyncError> {
        let mut hub = self.hub()?;
        Ok(Self::seeded_replica(&mut hub, session))
    }

    fn seeded_replica(hub: &mut Hub, session: GameId) -> Replica {
        let mut replica = Replica::new(hub.next_replica);
        hub.next_replica += 1;
        for update in hub.origin.state_updates(session) {
            replica.merge(&update);
        }
        replica
    }

    /// Current materialized state of `session` at the hub.
    pub fn snapshot(&self, session: GameId) -> Option<SyncMessage> {
        self.hub().ok()?.origin.snapshot(session)
    }

    /// Number of games with a live topic.
    pub fn topic_count(&self) -> usize {
        self.hub().map(|hub| hub.topics.len()).unwrap_or(0)
    }

    /// Number of games the hub holds a document for.
    pub fn document_count(&self) -> usize {
        self.hub().map(|hub| hub.origin.document_count()).unwrap_or(0)
    }
}

impl Default for ReplicatedChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl SyncChannel for ReplicatedChannel {
    fn mode(&self) -> SyncMode {
        SyncMode::Replicated
    }

    #[instrument(
        skip(self, message),
        fields(game_id = %message.session_id, version = message.version)
    )]
    async fn publish(&self, message: SyncMessage) -> Result<(), SyncError> {
        let mut hub = self.hub()?;
        let update = hub.origin.write(&message);
        match hub.topics.get(&message.session_id) {
            Some(tx) => match tx.send(update) {
                Ok(receivers) => debug!(receivers, "Document update broadcast"),
                Err(_) => debug!("No live subscribers"),
            },
            None => debug!("No replicas subscribed"),
        }
        hub.prune();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, session: GameId) -> Result<Subscription, SyncError> {
        let mut hub = self.hub()?;
        hub.prune();
        let capacity = self.capacity;
        let updates = hub
            .topics
            .entry(session)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        let replica = Self::seeded_replica(&mut hub, session);
        debug!(game_id = %session, replica = replica.id(), "Replica subscribed");
        Ok(Subscription::replicated(session, updates, replica))
    }

    #[instrument(skip(self, subscription), fields(game_id = %subscription.session()))]
    async fn unsubscribe(&self, subscription: Subscription) {
        let session = subscription.session();
        drop(subscription);
        if let Ok(mut hub) = self.hub() {
            hub.prune();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use othello_rules::BoardState;

    fn message(version: u64, black: i32) -> SyncMessage {
        SyncMessage::new(
            GameId::new(1),
            &BoardState::initial(ParticipantId::new(black)),
            version,
        )
    }

    #[test]
    fn test_register_keeps_higher_stamp() {
        let early = Stamp { clock: 1, replica: 2 };
        let late = Stamp { clock: 2, replica: 1 };
        let mut register = LwwRegister::new("a".to_string(), late);
        assert!(!register.merge(&"b".to_string(), early));
        assert_eq!(register.value(), "a");
        assert!(register.merge(&"c".to_string(), Stamp { clock: 2, replica: 3 }));
        assert_eq!(register.value(), "c");
    }

    #[test]
    fn test_concurrent_writes_converge_without_mixing() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);
        let from_a = a.write(&message(1, 10));
        let from_b = b.write(&message(1, 20));
        assert_eq!(from_a.stamp.clock, from_b.stamp.clock);

        a.merge(&from_b);
        b.merge(&from_a);

        let left = a.snapshot(GameId::new(1)).expect("Complete");
        let right = b.snapshot(GameId::new(1)).expect("Complete");
        assert_eq!(left, right);
        // Replica 2 wins the tie, and wins every field.
        assert_eq!(left, message(1, 20));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);
        let update = a.write(&message(3, 10));
        assert!(b.merge(&update));
        assert!(!b.merge(&update));
        assert_eq!(b.snapshot(GameId::new(1)), Some(message(3, 10)));
    }

    #[test]
    fn test_proposal_needs_every_field() {
        let mut a = Replica::new(1);
        let full = a.write(&message(4, 10));
        assert_eq!(full.proposal(), Some(message(4, 10)));

        let partial = DocUpdate {
            writes: full.writes[..3].to_vec(),
            ..full
        };
        assert_eq!(partial.proposal(), None);
    }

    #[test]
    fn test_retain_keeps_clock() {
        let mut a = Replica::new(1);
        a.write(&message(1, 10));
        a.retain(|_| false);
        assert_eq!(a.document_count(), 0);
        let next = a.write(&message(2, 10));
        assert_eq!(next.stamp.clock, 2);
    }

    #[test]
    fn test_state_updates_seed_empty_replica() {
        let mut a = Replica::new(1);
        a.write(&message(1, 10));
        a.write(&message(2, 11));
        let mut fresh = Replica::new(9);
        for update in a.state_updates(GameId::new(1)) {
            fresh.merge(&update);
        }
        assert_eq!(fresh.snapshot(GameId::new(1)), Some(message(2, 11)));
    }
}

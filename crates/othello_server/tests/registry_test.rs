//! Tests for the session registry: serialization, persistence and
//! propagation of committed states.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use othello_rules::{BoardState, CELL_COUNT, Cell, Color, ParticipantId, play};
use othello_server::store::{GameRecord, GameUpdate, User};
use othello_server::sync::{DocUpdate, FieldWrite};
use othello_server::{
    ApplyOutcome, ClientView, GameError, GameId, GameStore, JoinOutcome, MemoryGameStore,
    RelayChannel, ReplicatedChannel, SessionRegistry, StoreError, Subscription, SyncChannel,
    SyncError, SyncMessage, SyncMode,
};

const HOST: ParticipantId = ParticipantId::new(1);
const GUEST: ParticipantId = ParticipantId::new(2);
const STRANGER: ParticipantId = ParticipantId::new(3);

/// Memory store whose game updates can be made to fail.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryGameStore,
    fail_updates: AtomicBool,
}

impl GameStore for FlakyStore {
    fn create_user(&self, name: &str) -> Result<User, StoreError> {
        self.inner.create_user(name)
    }

    fn get_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        self.inner.get_user(id)
    }

    fn create_game(
        &self,
        host: ParticipantId,
        initial: &BoardState,
    ) -> Result<GameRecord, StoreError> {
        self.inner.create_game(host, initial)
    }

    fn get_game(&self, id: i32) -> Result<Option<GameRecord>, StoreError> {
        self.inner.get_game(id)
    }

    fn set_guest(&self, id: i32, guest: ParticipantId) -> Result<(), StoreError> {
        self.inner.set_guest(id, guest)
    }

    fn update_game(
        &self,
        id: i32,
        update: &GameUpdate,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::backend("Disk on fire"));
        }
        self.inner.update_game(id, update, expected_version)
    }
}

/// Channel that accepts subscriptions but never delivers.
#[derive(Debug, Default)]
struct BrokenChannel {
    relay: RelayChannel,
}

#[async_trait]
impl SyncChannel for BrokenChannel {
    fn mode(&self) -> SyncMode {
        SyncMode::Relay
    }

    async fn publish(&self, _message: SyncMessage) -> Result<(), SyncError> {
        Err(SyncError::new("Relay unreachable"))
    }

    async fn subscribe(&self, session: GameId) -> Result<Subscription, SyncError> {
        self.relay.subscribe(session).await
    }

    async fn unsubscribe(&self, subscription: Subscription) {
        self.relay.unsubscribe(subscription).await
    }
}

fn registry_with(store: Arc<dyn GameStore>, sync: Arc<dyn SyncChannel>) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(store, sync))
}

fn relay_registry() -> Arc<SessionRegistry> {
    registry_with(Arc::new(MemoryGameStore::new()), Arc::new(RelayChannel::default()))
}

/// Signs up HOST, GUEST and STRANGER, in that order.
async fn sign_up(registry: &SessionRegistry) {
    for (name, expected) in [("host", HOST), ("guest", GUEST), ("stranger", STRANGER)] {
        let user = registry.create_user(name.to_string()).await.expect("Sign up");
        assert_eq!(*user.id(), expected.get());
    }
}

async fn seated_game(registry: &SessionRegistry) -> GameId {
    sign_up(registry).await;
    let id = registry.create_game(HOST).await.expect("Create game");
    let outcome = registry.join_game(id, GUEST).await.expect("Join");
    assert_eq!(outcome, JoinOutcome::Seated);
    id
}

fn full_board(black: ParticipantId) -> BoardState {
    let mut cells = [Cell::White; CELL_COUNT];
    for cell in cells.iter_mut().take(33) {
        *cell = Cell::Black;
    }
    BoardState::from_parts(cells, Color::Black, black)
}

async fn next(subscription: &mut Subscription) -> SyncMessage {
    tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("Update arrives in time")
        .expect("Channel open")
}

#[tokio::test]
async fn test_create_join_and_snapshot() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;

    let snapshot = registry.snapshot(id, GUEST).await.expect("Guest reads");
    assert_eq!(snapshot.session_id, id);
    assert_eq!(snapshot.version, 0);
    assert_eq!(snapshot.board_state().expect("Decodes"), BoardState::initial(HOST));

    let err = registry.snapshot(id, STRANGER).await.expect_err("Stranger");
    assert!(matches!(err, GameError::ParticipantNotAuthorized(_)));

    let err = registry.join_game(id, STRANGER).await.expect_err("Full");
    assert!(matches!(err, GameError::GameFull(_)));
    assert_eq!(
        registry.join_game(id, GUEST).await.expect("Rejoin"),
        JoinOutcome::AlreadySeated
    );
}

#[tokio::test]
async fn test_unknown_users_cannot_create_or_join() {
    let registry = relay_registry();
    let err = registry
        .create_game(ParticipantId::new(999))
        .await
        .expect_err("Never signed up");
    assert!(matches!(err, GameError::UnknownParticipant(p) if p == ParticipantId::new(999)));

    let id = seated_game(&registry).await;
    let err = registry
        .join_game(id, ParticipantId::new(998))
        .await
        .expect_err("Never signed up");
    assert!(matches!(err, GameError::UnknownParticipant(_)));
    assert_eq!(
        registry.session(id, HOST).await.expect("Reads").guest(),
        &Some(GUEST)
    );
}

#[tokio::test]
async fn test_unknown_game() {
    let registry = relay_registry();
    let err = registry
        .submit_move(GameId::new(42), HOST, 2, 4, None)
        .await
        .expect_err("No game");
    assert!(matches!(err, GameError::GameNotFound(id) if id == GameId::new(42)));
}

#[tokio::test]
async fn test_move_is_persisted_and_broadcast() {
    let store = Arc::new(MemoryGameStore::new());
    let registry = registry_with(store.clone(), Arc::new(RelayChannel::default()));
    let id = seated_game(&registry).await;
    let (start, mut guest_feed) = registry.subscribe(id, GUEST).await.expect("Subscribe");
    assert_eq!(start.version, 0);

    let committed = registry
        .submit_move(id, HOST, 2, 4, Some(0))
        .await
        .expect("Legal");
    assert_eq!(committed.version, 1);
    assert_eq!(next(&mut guest_feed).await, committed);

    let row = store.get_game(id.get()).expect("Load").expect("Exists");
    assert_eq!(*row.version(), 1);
    assert_eq!(
        row.board_state().expect("Decodes"),
        committed.board_state().expect("Decodes")
    );

    registry.unsubscribe(guest_feed).await;
}

#[tokio::test]
async fn test_rejections_are_not_broadcast() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;
    let (_, mut feed) = registry.subscribe(id, HOST).await.expect("Subscribe");

    assert!(matches!(
        registry.submit_move(id, GUEST, 2, 4, None).await,
        Err(GameError::NotYourTurn { .. })
    ));
    assert!(matches!(
        registry.submit_move(id, HOST, 0, 0, None).await,
        Err(GameError::IllegalMove(_))
    ));
    assert!(feed.try_recv().is_none());
    assert_eq!(registry.snapshot(id, HOST).await.expect("Reads").version, 0);
}

#[tokio::test]
async fn test_stale_version_rejected() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;
    registry.submit_move(id, HOST, 2, 4, Some(0)).await.expect("Legal");

    let err = registry
        .submit_move(id, GUEST, 2, 3, Some(0))
        .await
        .expect_err("Computed against version 0");
    assert!(matches!(
        err,
        GameError::StaleVersion {
            expected: 0,
            actual: 1
        }
    ));
    registry.submit_move(id, GUEST, 2, 3, Some(1)).await.expect("Current");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_leave_one_valid_state() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;
    let initial = BoardState::initial(HOST);
    let candidates = [(2, 4), (3, 5), (4, 2), (5, 3)];

    let handles: Vec<_> = candidates
        .iter()
        .map(|&(row, col)| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit_move(id, HOST, row, col, Some(0)).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.expect("Task completes") {
            Ok(message) => winners.push(message),
            Err(GameError::StaleVersion { expected: 0, .. }) => {}
            Err(other) => panic!("Unexpected rejection: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let final_state = registry
        .snapshot(id, HOST)
        .await
        .expect("Reads")
        .board_state()
        .expect("Decodes");
    let valid: Vec<BoardState> = candidates
        .iter()
        .map(|&(row, col)| play(&initial, row, col).expect("Legal").state)
        .collect();
    assert!(valid.contains(&final_state));
    assert_eq!(final_state.occupied(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_without_versions_reject_loser() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;

    let a = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.submit_move(id, HOST, 2, 4, None).await })
    };
    let b = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.submit_move(id, HOST, 5, 3, None).await })
    };
    let results = [a.await.expect("Completes"), b.await.expect("Completes")];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(GameError::NotYourTurn { turn: Color::White, .. })))
    );
}

#[tokio::test]
async fn test_store_failure_does_not_commit() {
    let store = Arc::new(FlakyStore::default());
    let registry = registry_with(store.clone(), Arc::new(RelayChannel::default()));
    let id = seated_game(&registry).await;
    let (_, mut feed) = registry.subscribe(id, GUEST).await.expect("Subscribe");

    store.fail_updates.store(true, Ordering::SeqCst);
    let err = registry.submit_move(id, HOST, 2, 4, None).await.expect_err("Store down");
    assert!(matches!(err, GameError::Store(_)));
    assert_eq!(registry.snapshot(id, HOST).await.expect("Reads").version, 0);
    assert!(feed.try_recv().is_none());

    store.fail_updates.store(false, Ordering::SeqCst);
    let committed = registry.submit_move(id, HOST, 2, 4, None).await.expect("Store back");
    assert_eq!(committed.version, 1);
}

#[tokio::test]
async fn test_conflict_evicts_and_reloads() {
    let store = Arc::new(MemoryGameStore::new());
    let first = registry_with(store.clone(), Arc::new(RelayChannel::default()));
    let id = seated_game(&first).await;
    // A second process shares the database.
    let second = registry_with(store.clone(), Arc::new(RelayChannel::default()));
    second.submit_move(id, HOST, 2, 4, None).await.expect("Legal");

    let err = first
        .submit_move(id, HOST, 5, 3, None)
        .await
        .expect_err("Row moved on");
    assert!(matches!(err, GameError::Store(_)));

    // Reloaded from storage: White is to move now.
    let view = first.snapshot(id, GUEST).await.expect("Reads");
    assert_eq!(view.version, 1);
    assert_eq!(view.board_state().expect("Decodes").turn(), Color::White);
}

#[tokio::test]
async fn test_propagation_failure_keeps_commit() {
    let store = Arc::new(MemoryGameStore::new());
    let registry = registry_with(store.clone(), Arc::new(BrokenChannel::default()));
    let id = seated_game(&registry).await;

    let err = registry.submit_move(id, HOST, 2, 4, None).await.expect_err("Not propagated");
    assert!(matches!(err, GameError::Propagation(_)));
    assert_eq!(registry.snapshot(id, HOST).await.expect("Reads").version, 1);
    assert_eq!(*store.get_game(id.get()).expect("Load").expect("Exists").version(), 1);
}

#[tokio::test]
async fn test_rematch_after_full_board() {
    let store = Arc::new(MemoryGameStore::new());
    let record = store.create_game(HOST, &full_board(HOST)).expect("Create");
    store.set_guest(*record.id(), GUEST).expect("Seat");
    let registry = registry_with(store.clone(), Arc::new(ReplicatedChannel::default()));
    let id = GameId::new(*record.id());
    let (_, mut feed) = registry.subscribe(id, HOST).await.expect("Subscribe");

    let fresh = registry.rematch(id, HOST).await.expect("Rematch");
    assert_eq!(fresh.black_player_id, GUEST);
    assert_eq!(fresh.version, 1);
    assert_eq!(fresh.board_state().expect("Decodes"), BoardState::initial(GUEST));
    assert_eq!(next(&mut feed).await, fresh);

    let row = store.get_game(id.get()).expect("Load").expect("Exists");
    assert_eq!(*row.black_player_id(), GUEST.get());

    // The guest now moves first.
    registry.submit_move(id, GUEST, 2, 4, Some(1)).await.expect("Guest is Black");
}

#[tokio::test]
async fn test_rematch_mid_game_rejected() {
    let registry = relay_registry();
    let id = seated_game(&registry).await;
    let err = registry.rematch(id, GUEST).await.expect_err("Not over");
    assert!(matches!(err, GameError::GameNotOver));
}

#[tokio::test]
async fn test_sessions_reload_from_store() {
    let store = Arc::new(MemoryGameStore::new());
    let registry = registry_with(store.clone(), Arc::new(RelayChannel::default()));
    let id = seated_game(&registry).await;
    registry.submit_move(id, HOST, 2, 4, None).await.expect("Legal");

    let restarted = registry_with(store, Arc::new(RelayChannel::default()));
    assert_eq!(restarted.cached(), 0);
    let view = restarted.snapshot(id, GUEST).await.expect("Reads");
    assert_eq!(view.version, 1);
    assert_eq!(restarted.cached(), 1);
    restarted.submit_move(id, GUEST, 2, 3, Some(1)).await.expect("Continues");
}

/// Registry over a replicated channel the test can also reach directly.
fn replicated_registry() -> (Arc<SessionRegistry>, Arc<ReplicatedChannel>) {
    let channel = Arc::new(ReplicatedChannel::default());
    let registry = registry_with(Arc::new(MemoryGameStore::new()), channel.clone());
    (registry, channel)
}

#[tokio::test]
async fn test_peer_write_is_committed_as_move() {
    let (registry, channel) = replicated_registry();
    let id = seated_game(&registry).await;
    let (start, mut feed) = registry.subscribe(id, GUEST).await.expect("Subscribe");

    let mut peer = channel.peer(id).expect("Peer");
    let next_state = play(&BoardState::initial(HOST), 2, 4).expect("Legal").state;
    let update = peer.write(&SyncMessage::new(id, &next_state, start.version + 1));

    let committed = registry
        .submit_peer_write(id, HOST, &update)
        .await
        .expect("Legal successor");
    assert_eq!(committed.version, 1);
    assert_eq!(committed.board_state().expect("Decodes"), next_state);
    assert_eq!(next(&mut feed).await, committed);
    assert_eq!(registry.snapshot(id, GUEST).await.expect("Reads"), committed);
    assert_eq!(channel.snapshot(id), Some(committed));
}

#[tokio::test]
async fn test_bogus_peer_writes_never_reach_subscribers() {
    let (registry, channel) = replicated_registry();
    let id = seated_game(&registry).await;
    let (start, mut feed) = registry.subscribe(id, GUEST).await.expect("Subscribe");
    let mut view = ClientView::new(GUEST, &start)
        .expect("Decodes")
        .with_opponent(HOST);
    let mut peer = channel.peer(id).expect("Peer");

    // An all-Black board far ahead of the real version.
    let all_black = BoardState::from_parts([Cell::Black; CELL_COUNT], Color::White, HOST);
    let update = peer.write(&SyncMessage::new(id, &all_black, 99));
    let err = registry
        .submit_peer_write(id, HOST, &update)
        .await
        .expect_err("Far ahead");
    assert!(matches!(err, GameError::StaleVersion { expected: 98, actual: 0 }));

    // Right version, but no single move produces it.
    let update = peer.write(&SyncMessage::new(id, &all_black, 1));
    let err = registry
        .submit_peer_write(id, HOST, &update)
        .await
        .expect_err("Not a successor");
    assert!(matches!(err, GameError::RejectedWrite(_)));

    // A legal successor written by the participant whose turn it is not.
    let legal = play(&BoardState::initial(HOST), 2, 4).expect("Legal").state;
    let update = peer.write(&SyncMessage::new(id, &legal, 1));
    let err = registry
        .submit_peer_write(id, GUEST, &update)
        .await
        .expect_err("Out of turn");
    assert!(matches!(err, GameError::NotYourTurn { .. }));

    // Only some of the fields.
    let partial = DocUpdate {
        writes: vec![FieldWrite::Version(1)],
        ..update
    };
    let err = registry
        .submit_peer_write(id, HOST, &partial)
        .await
        .expect_err("Partial");
    assert!(matches!(err, GameError::RejectedWrite(_)));

    assert!(feed.try_recv().is_none());
    assert_eq!(channel.snapshot(id), None);

    // The committed move still reaches the subscriber.
    let committed = registry
        .submit_move(id, HOST, 2, 4, Some(0))
        .await
        .expect("Legal");
    let received = next(&mut feed).await;
    assert_eq!(received, committed);
    assert_eq!(view.apply(&received).expect("Decodes"), ApplyOutcome::Replaced);
    assert_eq!(view.state(), &legal);
    assert!(view.is_turn());
}

#[tokio::test]
async fn test_concurrent_peer_writes_commit_once() {
    let (registry, channel) = replicated_registry();
    let id = seated_game(&registry).await;
    let (_, mut feed) = registry.subscribe(id, HOST).await.expect("Subscribe");

    // Two peers move from the same pre-move state.
    let initial = BoardState::initial(HOST);
    let mut left = channel.peer(id).expect("Peer");
    let mut right = channel.peer(id).expect("Peer");
    let a = play(&initial, 2, 4).expect("Legal").state;
    let b = play(&initial, 5, 3).expect("Legal").state;
    let from_left = left.write(&SyncMessage::new(id, &a, 1));
    let from_right = right.write(&SyncMessage::new(id, &b, 1));

    let first = registry
        .submit_peer_write(id, HOST, &from_right)
        .await
        .expect("First wins");
    let err = registry
        .submit_peer_write(id, HOST, &from_left)
        .await
        .expect_err("Second is stale");
    assert!(matches!(err, GameError::StaleVersion { expected: 0, actual: 1 }));

    assert_eq!(first.board_state().expect("Decodes"), b);
    assert_eq!(next(&mut feed).await, first);
    assert!(feed.try_recv().is_none());
    assert_eq!(channel.snapshot(id), Some(first));
}

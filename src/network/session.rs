//! Room Session Management
//!
//! Each room wraps one [`GameState`] behind a tokio mutex, so commands for a
//! room are serialized while different rooms run in parallel. Delayed work
//! (bot turns, forced pickups, reconnect grace) runs as keyed timer tasks
//! that re-acquire the room lock and re-validate before touching state.
//!
//! Every committed mutation publishes a [`RoomChanged`] on the registry's
//! broadcast channel; the transport fetches the snapshot and fans it out.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::game::engine::JoinOutcome;
use crate::game::error::CommandError;
use crate::game::player::{ConnectionId, Zone, MAX_SEATS};
use crate::game::state::{FollowUp, GameState, GameStatus};

/// Room identifier chosen by clients or generated by the registry.
pub type RoomId = String;

/// Bots seated by a bot game: at least one, at most every other seat.
pub const MAX_BOTS: usize = MAX_SEATS - 1;

/// Published whenever a room's version changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomChanged {
    /// Room that changed.
    pub room_id: RoomId,
    /// Instance of the room; a replaced room id gets a new one.
    pub instance: Uuid,
    /// Version after the change.
    pub version: u64,
}

// =============================================================================
// TIMERS
// =============================================================================

/// One pending continuation per key; rescheduling a key replaces it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TimerKey {
    BotTurn,
    AutoPickup,
    Disconnect(String),
}

/// Work a timer performs once its delay elapses.
#[derive(Debug, Clone)]
enum Continuation {
    BotTurn(ConnectionId),
    AutoPickup(ConnectionId),
    ConvertToBot(String),
}

impl Continuation {
    fn key(&self) -> TimerKey {
        match self {
            Continuation::BotTurn(_) => TimerKey::BotTurn,
            Continuation::AutoPickup(_) => TimerKey::AutoPickup,
            Continuation::ConvertToBot(name) => TimerKey::Disconnect(name.clone()),
        }
    }
}

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

/// State guarded by the room lock.
struct RoomInner {
    game: GameState,
    timers: BTreeMap<TimerKey, PendingTimer>,
    next_generation: u64,
}

// =============================================================================
// ROOM
// =============================================================================

/// A single game room.
pub struct Room {
    id: RoomId,
    instance: Uuid,
    config: EngineConfig,
    inner: Mutex<RoomInner>,
    notify: broadcast::Sender<RoomChanged>,
    this: Weak<Room>,
}

impl Room {
    /// Wrap a game state. Timers hold only a weak reference to the room.
    pub fn new(game: GameState, config: EngineConfig, notify: broadcast::Sender<RoomChanged>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: game.id.clone(),
            instance: Uuid::new_v4(),
            config,
            inner: Mutex::new(RoomInner {
                game,
                timers: BTreeMap::new(),
                next_generation: 0,
            }),
            notify,
            this: this.clone(),
        })
    }

    /// Room identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity of this room object, distinct across rooms sharing an id.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> GameState {
        self.inner.lock().await.game.clone()
    }

    /// Current version.
    pub async fn version(&self) -> u64 {
        self.inner.lock().await.game.version
    }

    /// Number of pending timers.
    pub async fn pending_timers(&self) -> usize {
        self.inner.lock().await.timers.len()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Seat a human or reattach a disconnected one by name.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn join(&self, id: ConnectionId, name: &str) -> Result<JoinOutcome, CommandError> {
        let mut inner = self.inner.lock().await;
        let before = inner.game.version;
        let outcome = inner.game.add_player(id, name)?;
        if let JoinOutcome::Reconnected { name } = &outcome {
            if let Some(timer) = inner.timers.remove(&TimerKey::Disconnect(name.clone())) {
                timer.handle.abort();
                debug!(player = %name, "grace timer cancelled");
            }
        }
        self.settle(&mut inner, before);
        Ok(outcome)
    }

    /// Seat a bot.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn add_bot(&self, ordinal: usize) -> Result<ConnectionId, CommandError> {
        self.apply(|game| game.add_bot(ordinal)).await
    }

    /// Move to an empty seat.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn switch_seat(&self, id: ConnectionId, seat: usize) -> Result<(), CommandError> {
        self.apply(|game| game.switch_seat(&id, seat)).await
    }

    /// Mark ready.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn set_ready(&self, id: ConnectionId) -> Result<(), CommandError> {
        self.apply(|game| game.set_ready(&id)).await
    }

    /// Swap a hand card with a face-up card.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn swap_cards(&self, id: ConnectionId, hand_index: usize, face_up_index: usize) -> Result<(), CommandError> {
        self.apply(|game| game.swap_cards(&id, hand_index, face_up_index)).await
    }

    /// Host starts the game.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn start_game(&self, id: ConnectionId) -> Result<(), CommandError> {
        self.apply(|game| game.start_game(&id)).await
    }

    /// Sort the caller's hand.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn sort_hand(&self, id: ConnectionId) -> Result<(), CommandError> {
        self.apply(|game| game.sort_hand(&id)).await
    }

    /// Play cards from a zone.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn play_cards(&self, id: ConnectionId, indices: &[usize], source: Zone) -> Result<(), CommandError> {
        self.apply(|game| game.play_cards(&id, indices, source)).await
    }

    /// Take the discard pile.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn take_pile(&self, id: ConnectionId) -> Result<(), CommandError> {
        self.apply(|game| game.take_pile(&id)).await
    }

    /// Transport dropped: mark the seat and start the grace timer.
    #[instrument(skip(self), fields(room = %self.id))]
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), CommandError> {
        let mut inner = self.inner.lock().await;
        let before = inner.game.version;
        let name = inner.game.mark_disconnected(&id)?;
        let grace = self.config.reconnect_grace;
        self.schedule(&mut inner, grace, Continuation::ConvertToBot(name));
        self.settle(&mut inner, before);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn apply<T>(
        &self,
        command: impl FnOnce(&mut GameState) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        let mut inner = self.inner.lock().await;
        let before = inner.game.version;
        let result = command(&mut inner.game);
        if let Err(err) = &result {
            debug!(%err, "command rejected");
        }
        self.settle(&mut inner, before);
        result
    }

    /// Turn queued follow-ups into timers and publish a version change.
    fn settle(&self, inner: &mut RoomInner, before: u64) {
        for follow_up in inner.game.take_follow_ups() {
            match follow_up {
                FollowUp::BotTurn(id) => {
                    self.schedule(inner, self.config.bot_think_delay, Continuation::BotTurn(id));
                }
                FollowUp::AutoPickup(id) => {
                    self.schedule(inner, self.config.auto_pickup_delay, Continuation::AutoPickup(id));
                }
            }
        }

        let version = inner.game.version;
        if version != before {
            // No subscribers is fine.
            let _ = self.notify.send(RoomChanged {
                room_id: self.id.clone(),
                instance: self.instance,
                version,
            });
        }
    }

    fn schedule(&self, inner: &mut RoomInner, delay: Duration, job: Continuation) {
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let key = job.key();
        let room = self.this.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(room) = room.upgrade() {
                room.fire(generation, job).await;
            }
        });

        if let Some(previous) = inner.timers.insert(key, PendingTimer { generation, handle: handle.abort_handle() }) {
            previous.handle.abort();
        }
    }

    async fn fire(&self, generation: u64, job: Continuation) {
        let mut inner = self.inner.lock().await;
        let key = job.key();
        match inner.timers.get(&key) {
            Some(timer) if timer.generation == generation => {
                inner.timers.remove(&key);
            }
            _ => return,
        }

        let before = inner.game.version;
        let acted = match &job {
            Continuation::BotTurn(id) => inner.game.run_bot_turn(id),
            Continuation::AutoPickup(id) => inner.game.auto_pickup(id),
            Continuation::ConvertToBot(name) => inner.game.convert_to_bot(name),
        };
        if !acted {
            debug!(room = %self.id, ?job, "stale continuation dropped");
        }
        self.settle(&mut inner, before);
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        for timer in self.inner.get_mut().timers.values() {
            timer.handle.abort();
        }
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// All rooms of the process.
pub struct SessionRegistry {
    config: EngineConfig,
    rooms: RwLock<BTreeMap<RoomId, Arc<Room>>>,
    notify: broadcast::Sender<RoomChanged>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        let (notify, _) = broadcast::channel(config.notify_capacity.max(1));
        Self {
            config,
            rooms: RwLock::new(BTreeMap::new()),
            notify,
        }
    }

    /// Listen for room changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomChanged> {
        self.notify.subscribe()
    }

    /// Create a room with a generated id.
    pub async fn create_room(&self) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let room = self.build_room(&id);
        rooms.insert(id, room.clone());
        room
    }

    /// Create a room with a chosen id. A finished room under that id is replaced.
    pub async fn create_room_with_id(&self, id: &str) -> Result<Arc<Room>, CommandError> {
        let mut rooms = self.rooms.write().await;
        if let Some(existing) = rooms.get(id) {
            if existing.snapshot().await.status != GameStatus::Finished {
                return Err(CommandError::RoomExists);
            }
            info!(room = id, "replacing finished room");
        }
        let room = self.build_room(id);
        rooms.insert(id.to_string(), room.clone());
        Ok(room)
    }

    fn build_room(&self, id: &str) -> Arc<Room> {
        let game = GameState::new(id).with_log_capacity(self.config.log_capacity);
        info!(room = id, "room created");
        Room::new(game, self.config.clone(), self.notify.clone())
    }

    /// Insert a prepared state, e.g. a seeded one.
    pub async fn insert_room(&self, game: GameState) -> Result<Arc<Room>, CommandError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&game.id) {
            return Err(CommandError::RoomExists);
        }
        let id = game.id.clone();
        let room = Room::new(game, self.config.clone(), self.notify.clone());
        rooms.insert(id, room.clone());
        Ok(room)
    }

    /// Look up a room.
    pub async fn room(&self, id: &str) -> Result<Arc<Room>, CommandError> {
        let rooms = self.rooms.read().await;
        rooms.get(id).cloned().ok_or(CommandError::RoomNotFound)
    }

    /// Create a room, seat the caller and add `bot_count` bots (clamped to 1..=9).
    pub async fn join_bot_game(
        &self,
        id: &str,
        conn: ConnectionId,
        name: &str,
        bot_count: usize,
    ) -> Result<Arc<Room>, CommandError> {
        let room = self.create_room_with_id(id).await?;
        room.join(conn, name).await?;
        for ordinal in 1..=bot_count.clamp(1, MAX_BOTS) {
            room.add_bot(ordinal).await?;
        }
        Ok(room)
    }

    /// Transport closed: mark the connection disconnected in every room it sits in.
    pub async fn handle_transport_disconnect(&self, conn: ConnectionId) -> Vec<RoomId> {
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();
        let mut affected = Vec::new();
        for room in rooms {
            if room.disconnect(conn).await.is_ok() {
                affected.push(room.id().to_string());
            }
        }
        affected
    }

    /// Remove a room.
    pub async fn remove_room(&self, id: &str) -> bool {
        self.rooms.write().await.remove(id).is_some()
    }

    /// Active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop rooms no human is attached to that are empty or finished.
    pub async fn cleanup(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut to_remove = Vec::new();

        for (id, room) in rooms.iter() {
            let game = room.snapshot().await;
            let humans_online = game.players.iter().any(|p| !p.is_bot && p.connected);
            let idle = game.players.is_empty() || game.status == GameStatus::Finished;
            if idle && !humans_online {
                to_remove.push(id.clone());
            }
        }

        for id in &to_remove {
            rooms.remove(id);
            debug!(room = %id, "room removed");
        }
        to_remove.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::{Card, Rank, Suit};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    async fn two_player_game(registry: &SessionRegistry) -> (Arc<Room>, ConnectionId, ConnectionId) {
        let room = registry.insert_room(GameState::with_seed("R1", 7)).await.unwrap();
        let ana = ConnectionId::new();
        let bo = ConnectionId::new();
        room.join(ana, "Ana").await.unwrap();
        room.join(bo, "Bo").await.unwrap();
        room.set_ready(ana).await.unwrap();
        room.set_ready(bo).await.unwrap();
        room.start_game(ana).await.unwrap();
        room.set_ready(ana).await.unwrap();
        room.set_ready(bo).await.unwrap();
        assert_eq!(room.snapshot().await.status, GameStatus::Playing);
        (room, ana, bo)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_human_takes_pile_after_delay() {
        let registry = SessionRegistry::default();
        let ana = ConnectionId::new();
        let bo = ConnectionId::new();
        let mut game = GameState::with_seed("AP", 5);
        game.add_player(ana, "Ana").unwrap();
        game.add_player(bo, "Bo").unwrap();
        game.set_ready(&ana).unwrap();
        game.set_ready(&bo).unwrap();
        game.start_game(&ana).unwrap();
        game.set_ready(&ana).unwrap();
        game.set_ready(&bo).unwrap();
        game.take_follow_ups();

        game.current_player_index = 0;
        game.discard_pile.clear();
        game.players[0].hand = vec![Card::new(Rank::King, Suit::Hearts), Card::new(Rank::Five, Suit::Hearts)];
        game.players[1].hand = vec![Card::new(Rank::Three, Suit::Clubs), Card::new(Rank::Four, Suit::Clubs)];
        let room = registry.insert_room(game).await.unwrap();

        room.play_cards(ana, &[0], Zone::Hand).await.unwrap();
        let version = room.version().await;
        assert_eq!(room.pending_timers().await, 1);

        sleep(Duration::from_millis(900)).await;
        assert_eq!(room.version().await, version);

        sleep(Duration::from_millis(200)).await;
        let state = room.snapshot().await;
        assert!(state.discard_pile.is_empty());
        assert_eq!(state.players[1].hand.len(), 3);
        assert!(state.players[1].hand.contains(&Card::new(Rank::King, Suit::Hearts)));
        assert!(state.is_current(&ana));
        assert_eq!(state.version, version + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_keeps_seat() {
        let registry = SessionRegistry::default();
        let (room, ana, _) = two_player_game(&registry).await;
        let before = room.snapshot().await.player(&ana).cloned().unwrap();

        assert_eq!(registry.handle_transport_disconnect(ana).await, vec!["R1".to_string()]);
        sleep(Duration::from_secs(5)).await;

        let fresh = ConnectionId::new();
        let outcome = room.join(fresh, "Ana").await.unwrap();
        assert_eq!(outcome, JoinOutcome::Reconnected { name: "Ana".into() });

        sleep(Duration::from_secs(20)).await;
        let state = room.snapshot().await;
        let after = state.player(&fresh).unwrap();
        assert!(!after.is_bot);
        assert!(after.connected);
        assert_eq!(after.name, "Ana");
        assert_eq!(after.seat_index, before.seat_index);
        assert_eq!(after.hand, before.hand);
        assert_eq!(after.face_up, before.face_up);
        assert_eq!(after.face_down, before.face_down);
        assert_eq!(after.is_ready, before.is_ready);
        assert_eq!(after.finished_rank, before.finished_rank);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_expiry_converts_to_bot() {
        let registry = SessionRegistry::default();
        let (room, _, bo) = two_player_game(&registry).await;

        room.disconnect(bo).await.unwrap();
        sleep(Duration::from_secs(11)).await;

        let state = room.snapshot().await;
        let seat = state.players.iter().find(|p| p.name.starts_with("Bo")).unwrap();
        assert!(seat.is_bot);
        assert!(seat.connected);
        assert!(seat.is_ready);
        assert_eq!(seat.name, "Bo (Bot)");

        let late = room.join(ConnectionId::new(), "Bo").await;
        assert_eq!(late, Err(CommandError::WrongPhase(GameStatus::Playing)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_bot_room_plays_out_on_timers() {
        let registry = SessionRegistry::default();
        let room = registry.insert_room(GameState::with_seed("BOTS", 21)).await.unwrap();
        for ordinal in 1..=3 {
            room.add_bot(ordinal).await.unwrap();
        }
        let host = room.snapshot().await.host().map(|p| p.id).unwrap();
        room.start_game(host).await.unwrap();

        let mut rounds = 0;
        while room.snapshot().await.status != GameStatus::Finished {
            sleep(Duration::from_secs(2)).await;
            rounds += 1;
            assert!(rounds < 50_000, "bot game did not finish");
        }

        let state = room.snapshot().await;
        assert!(state.winner_id.is_some());
        assert_eq!(state.accounted_cards(), state.dealt);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_acts_after_delay() {
        let registry = SessionRegistry::default();
        let human = ConnectionId::new();
        let room = registry.join_bot_game("BG", human, "Ana", 1).await.unwrap();
        room.set_ready(human).await.unwrap();
        room.set_ready(human).await.unwrap();

        let state = room.snapshot().await;
        assert_eq!(state.status, GameStatus::Playing);
        if state.current_player().map(|p| p.is_bot).unwrap_or(false) {
            assert_eq!(room.pending_timers().await, 1);
            let version = state.version;

            sleep(Duration::from_millis(500)).await;
            assert_eq!(room.version().await, version);

            sleep(Duration::from_millis(1500)).await;
            assert!(room.version().await > version);
        }
    }

    #[tokio::test]
    async fn test_notifications() {
        let registry = SessionRegistry::default();
        let mut rx = registry.subscribe();
        let room = registry.create_room_with_id("N1").await.unwrap();
        let ana = ConnectionId::new();

        room.join(ana, "Ana").await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RoomChanged { room_id: "N1".into(), instance: room.instance(), version: 1 }
        );

        assert!(room.take_pile(ana).await.is_err());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_registry() {
        let registry = SessionRegistry::default();
        registry.create_room_with_id("A").await.unwrap();
        assert!(matches!(registry.create_room_with_id("A").await, Err(CommandError::RoomExists)));
        assert!(matches!(registry.room("B").await, Err(CommandError::RoomNotFound)));

        let generated = registry.create_room().await;
        assert_eq!(generated.id().len(), 6);
        assert_eq!(registry.room_count().await, 2);

        assert!(registry.remove_room("A").await);
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.cleanup().await, 1);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_bot_count_clamped() {
        let registry = SessionRegistry::default();
        let room = registry.join_bot_game("C0", ConnectionId::new(), "Ana", 0).await.unwrap();
        assert_eq!(room.snapshot().await.players.len(), 2);

        let room = registry.join_bot_game("C1", ConnectionId::new(), "Bo", 50).await.unwrap();
        let state = room.snapshot().await;
        assert_eq!(state.players.len(), MAX_SEATS);
        assert!(state.is_full());
    }

    #[tokio::test]
    async fn test_unknown_disconnect_is_ignored() {
        let registry = SessionRegistry::default();
        registry.create_room_with_id("X").await.unwrap();
        assert!(registry.handle_transport_disconnect(ConnectionId::new()).await.is_empty());
    }
}

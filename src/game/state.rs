//! Game State Definitions
//!
//! The session aggregate and the queries the engine and bots build on.
//! Mutating commands live in `engine.rs`.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::card::Card;
use crate::core::rng::DeterministicRng;
use crate::game::events::{EventLog, GameEvent};
use crate::game::player::{ConnectionId, Player, MAX_SEATS};

// =============================================================================
// STATUS
// =============================================================================

/// Session phase. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Lobby: seats open, players ready up.
    Waiting,
    /// Cards dealt, players swap hand and face-up cards.
    Preparing,
    /// Turns in progress.
    Playing,
    /// Terminal.
    Finished,
}

// =============================================================================
// CARD TO BEAT
// =============================================================================

/// Override for the card a play must beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "card", rename_all = "camelCase")]
pub enum CardToBeat {
    /// No override; compare against the discard pile top.
    #[default]
    Unset,
    /// Override in force: anything is legal.
    NoRestriction,
    /// Override in force: beat this card.
    Card(Card),
}

// =============================================================================
// FOLLOW-UPS
// =============================================================================

/// Delayed continuation requested by the engine.
///
/// The engine is synchronous; the room that owns it turns these into timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowUp {
    /// Let this bot act after its thinking delay.
    BotTurn(ConnectionId),
    /// Take the pile for a human with no legal move.
    AutoPickup(ConnectionId),
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Authoritative state of one room.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Room identifier.
    pub id: String,
    /// Roster, sorted by seat index.
    pub players: Vec<Player>,
    /// Draw pile; the last card is drawn first.
    pub deck: Vec<Card>,
    /// Discard pile; the last card is the top.
    pub discard_pile: Vec<Card>,
    /// Index into `players` of whoever acts next.
    pub current_player_index: usize,
    /// +1 or -1.
    pub direction: i8,
    /// Phase.
    pub status: GameStatus,
    /// First player to finish.
    pub winner_id: Option<ConnectionId>,
    /// Must-beat override left by a joker.
    pub card_to_beat: CardToBeat,
    /// Bumped on every committed mutation.
    pub version: u64,
    /// Newest log line.
    pub message: String,
    /// Recent log lines.
    pub log: EventLog,
    /// Cards removed from play by bombs and tens.
    pub burned: usize,
    /// Cards in play when the deal happened.
    pub dealt: usize,
    #[serde(skip)]
    pub(crate) rng: DeterministicRng,
    #[serde(skip)]
    pub(crate) follow_ups: Vec<FollowUp>,
}

impl GameState {
    /// Create an empty lobby seeded from entropy.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_rng(id, DeterministicRng::from_entropy())
    }

    /// Create an empty lobby with a fixed seed (reproducible deals).
    pub fn with_seed(id: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(id, DeterministicRng::new(seed))
    }

    fn with_rng(id: impl Into<String>, rng: DeterministicRng) -> Self {
        Self {
            id: id.into(),
            players: Vec::new(),
            deck: Vec::new(),
            discard_pile: Vec::new(),
            current_player_index: 0,
            direction: 1,
            status: GameStatus::Waiting,
            winner_id: None,
            card_to_beat: CardToBeat::Unset,
            version: 0,
            message: "Waiting for players...".to_string(),
            log: EventLog::default(),
            burned: 0,
            dealt: 0,
            rng,
            follow_ups: Vec::new(),
        }
    }

    /// Replace the log with one of a different capacity.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = EventLog::with_capacity(capacity);
        self
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Index of the player with this connection.
    pub fn player_index(&self, id: &ConnectionId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *id)
    }

    /// Player with this connection.
    pub fn player(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == *id)
    }

    /// Mutable player with this connection.
    pub fn player_mut(&mut self, id: &ConnectionId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    /// Player with this display name.
    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    /// Player whose turn it is.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    /// True if `id` holds the turn in a game being played.
    pub fn is_current(&self, id: &ConnectionId) -> bool {
        self.status == GameStatus::Playing
            && self.current_player().map(|p| p.id == *id).unwrap_or(false)
    }

    /// Host: the lowest-seated human, or the lowest seat in an all-bot room.
    pub fn host(&self) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| !p.is_bot)
            .or_else(|| self.players.first())
    }

    // -------------------------------------------------------------------------
    // Seats
    // -------------------------------------------------------------------------

    /// True when every seat is taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_SEATS
    }

    /// True if no player sits at `seat`.
    pub fn seat_is_free(&self, seat: usize) -> bool {
        seat < MAX_SEATS && self.players.iter().all(|p| p.seat_index != seat)
    }

    /// Lowest free seat.
    pub fn lowest_free_seat(&self) -> Option<usize> {
        (0..MAX_SEATS).find(|seat| self.seat_is_free(*seat))
    }

    /// Restore seat order after a seat change or insertion.
    pub(crate) fn sort_by_seat(&mut self) {
        self.players.sort_by_key(|p| p.seat_index);
    }

    // -------------------------------------------------------------------------
    // Readiness
    // -------------------------------------------------------------------------

    /// True if every seated player is ready.
    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|p| p.is_ready)
    }

    /// True if any seat is computer controlled.
    pub fn has_bot(&self) -> bool {
        self.players.iter().any(|p| p.is_bot)
    }

    // -------------------------------------------------------------------------
    // Pile
    // -------------------------------------------------------------------------

    /// Literal top of the discard pile.
    pub fn top_card(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    /// Card the next play is compared against, honoring `card_to_beat`.
    pub fn effective_top(&self) -> Option<Card> {
        match self.card_to_beat {
            CardToBeat::Unset => self.top_card().copied(),
            CardToBeat::NoRestriction => None,
            CardToBeat::Card(card) => Some(card),
        }
    }

    // -------------------------------------------------------------------------
    // Finishing
    // -------------------------------------------------------------------------

    /// Players with a finishing place.
    pub fn finished_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_finished()).count()
    }

    /// Players still in the game.
    pub fn remaining_count(&self) -> usize {
        self.players.len() - self.finished_count()
    }

    /// Cards currently visible in deck, pile and zones, plus burned cards.
    pub fn accounted_cards(&self) -> usize {
        self.deck.len()
            + self.discard_pile.len()
            + self.burned
            + self.players.iter().map(Player::card_count).sum::<usize>()
    }

    // -------------------------------------------------------------------------
    // Bookkeeping
    // -------------------------------------------------------------------------

    /// Append an event to the log and make it the current message.
    pub(crate) fn record(&mut self, event: GameEvent) {
        let line = event.to_string();
        debug!(room = %self.id, "{}", line);
        self.log.push(line.clone());
        self.message = line;
    }

    /// Mark a committed mutation.
    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    /// Drain continuations requested since the last call.
    pub fn take_follow_ups(&mut self) -> Vec<FollowUp> {
        std::mem::take(&mut self.follow_ups)
    }

    pub(crate) fn push_follow_up(&mut self, follow_up: FollowUp) {
        if !self.follow_ups.contains(&follow_up) {
            self.follow_ups.push(follow_up);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::{Rank, Suit};

    #[test]
    fn test_new_lobby() {
        let state = GameState::with_seed("room", 1);
        assert_eq!(state.status, GameStatus::Waiting);
        assert_eq!(state.direction, 1);
        assert_eq!(state.version, 0);
        assert!(state.players.is_empty());
        assert_eq!(state.lowest_free_seat(), Some(0));
    }

    #[test]
    fn test_effective_top() {
        let mut state = GameState::with_seed("room", 1);
        assert_eq!(state.effective_top(), None);

        let five = Card::new(Rank::Five, Suit::Clubs);
        state.discard_pile.push(five);
        state.discard_pile.push(Card::joker());
        assert_eq!(state.effective_top(), Some(Card::joker()));

        state.card_to_beat = CardToBeat::Card(five);
        assert_eq!(state.effective_top(), Some(five));

        state.card_to_beat = CardToBeat::NoRestriction;
        assert_eq!(state.effective_top(), None);
    }

    #[test]
    fn test_seats() {
        let mut state = GameState::with_seed("room", 1);
        state.players.push(Player::bot("Bot 1", 0));
        state.players.push(Player::bot("Bot 2", 2));
        assert_eq!(state.lowest_free_seat(), Some(1));
        assert!(!state.seat_is_free(2));
        assert!(!state.seat_is_free(MAX_SEATS));
    }

    #[test]
    fn test_follow_ups_dedupe() {
        let mut state = GameState::with_seed("room", 1);
        let id = ConnectionId::new();
        state.push_follow_up(FollowUp::BotTurn(id));
        state.push_follow_up(FollowUp::BotTurn(id));
        assert_eq!(state.take_follow_ups(), vec![FollowUp::BotTurn(id)]);
        assert!(state.take_follow_ups().is_empty());
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut state = GameState::with_seed("room", 1);
        state.card_to_beat = CardToBeat::NoRestriction;
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""status":"waiting""#));
        assert!(json.contains(r#""cardToBeat":{"kind":"noRestriction"}"#));
        assert!(json.contains(r#""discardPile":[]"#));
    }
}

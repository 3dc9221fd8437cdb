//! Player and Seat Types

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::card::Card;

/// Seats per room.
pub const MAX_SEATS: usize = 10;

/// Players needed to start.
pub const MIN_PLAYERS: usize = 2;

/// Cards dealt to each zone.
pub const CARDS_PER_ZONE: usize = 2;

/// Hand is refilled to this size while the deck lasts.
pub const HAND_FLOOR: usize = 2;

/// Transport-session identity, used for routing commands to a seat.
///
/// Replaced on reconnection; the display name is the stable identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One of a player's three card zones, in play-priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Zone {
    /// Held cards; the only zone refilled from the deck.
    Hand,
    /// Visible table cards, playable once the hand is empty.
    FaceUp,
    /// Hidden table cards, played blind last.
    FaceDown,
}

/// A seated participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Current transport identity.
    pub id: ConnectionId,
    /// Display name; stable across reconnects.
    pub name: String,
    /// Hand zone.
    pub hand: Vec<Card>,
    /// Face-up zone.
    pub face_up: Vec<Card>,
    /// Face-down zone.
    pub face_down: Vec<Card>,
    /// Seat slot, unique per room.
    pub seat_index: usize,
    /// Lobby readiness / swap phase done.
    pub is_ready: bool,
    /// Computer controlled.
    pub is_bot: bool,
    /// Transport currently attached.
    pub connected: bool,
    /// 1-based finishing place, set when all zones empty.
    pub finished_rank: Option<u8>,
}

impl Player {
    /// A connected human, not ready.
    pub fn human(id: ConnectionId, name: impl Into<String>, seat_index: usize) -> Self {
        Self {
            id,
            name: name.into(),
            hand: Vec::new(),
            face_up: Vec::new(),
            face_down: Vec::new(),
            seat_index,
            is_ready: false,
            is_bot: false,
            connected: true,
            finished_rank: None,
        }
    }

    /// A bot. Bots are always ready and connected.
    pub fn bot(name: impl Into<String>, seat_index: usize) -> Self {
        Self {
            is_ready: true,
            is_bot: true,
            ..Self::human(ConnectionId::new(), name, seat_index)
        }
    }

    /// Cards in a zone.
    pub fn zone(&self, zone: Zone) -> &Vec<Card> {
        match zone {
            Zone::Hand => &self.hand,
            Zone::FaceUp => &self.face_up,
            Zone::FaceDown => &self.face_down,
        }
    }

    /// Mutable cards in a zone.
    pub fn zone_mut(&mut self, zone: Zone) -> &mut Vec<Card> {
        match zone {
            Zone::Hand => &mut self.hand,
            Zone::FaceUp => &mut self.face_up,
            Zone::FaceDown => &mut self.face_down,
        }
    }

    /// The zone the player must play from, or None when all are empty.
    pub fn active_zone(&self) -> Option<Zone> {
        if !self.hand.is_empty() {
            Some(Zone::Hand)
        } else if !self.face_up.is_empty() {
            Some(Zone::FaceUp)
        } else if !self.face_down.is_empty() {
            Some(Zone::FaceDown)
        } else {
            None
        }
    }

    /// True once every zone is empty.
    pub fn is_out_of_cards(&self) -> bool {
        self.active_zone().is_none()
    }

    /// True once a finishing place is assigned.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished_rank.is_some()
    }

    /// Total cards held across zones.
    pub fn card_count(&self) -> usize {
        self.hand.len() + self.face_up.len() + self.face_down.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::{Rank, Suit};

    #[test]
    fn test_zone_priority() {
        let mut player = Player::human(ConnectionId::new(), "Ana", 0);
        assert_eq!(player.active_zone(), None);

        player.face_down.push(Card::joker());
        assert_eq!(player.active_zone(), Some(Zone::FaceDown));

        player.face_up.push(Card::new(Rank::Five, Suit::Clubs));
        assert_eq!(player.active_zone(), Some(Zone::FaceUp));

        player.hand.push(Card::new(Rank::Six, Suit::Clubs));
        assert_eq!(player.active_zone(), Some(Zone::Hand));
        assert_eq!(player.card_count(), 3);
    }

    #[test]
    fn test_bot_defaults() {
        let bot = Player::bot("Bot 1", 3);
        assert!(bot.is_bot);
        assert!(bot.is_ready);
        assert!(bot.connected);
        assert_eq!(bot.seat_index, 3);
    }

    #[test]
    fn test_zone_serde_names() {
        assert_eq!(serde_json::to_string(&Zone::FaceUp).unwrap(), r#""faceUp""#);
        let zone: Zone = serde_json::from_str(r#""faceDown""#).unwrap();
        assert_eq!(zone, Zone::FaceDown);
    }
}

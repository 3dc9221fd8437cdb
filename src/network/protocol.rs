//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::game::error::CommandError;
use crate::game::player::{ConnectionId, Zone};
use crate::game::state::GameState;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room (generated id when absent) and join it.
    CreateRoom {
        #[serde(default)]
        room_id: Option<String>,
        name: String,
    },

    /// Join an existing room, or reclaim a disconnected seat by name.
    JoinRoom { room_id: String, name: String },

    /// Create a room with bots and join it.
    JoinBotGame {
        room_id: String,
        name: String,
        #[serde(default = "default_bot_count")]
        bot_count: usize,
    },

    /// Move to another seat in the lobby.
    SwitchSeat { room_id: String, seat: usize },

    /// Exchange a hand card with a face-up card.
    SwapCards {
        room_id: String,
        hand_index: usize,
        face_up_index: usize,
    },

    /// Sort own hand.
    SortHand { room_id: String },

    /// Mark ready.
    SetReady { room_id: String },

    /// Pick up the discard pile.
    TakePile { room_id: String },

    /// Play cards. `indices` may also be sent as a single number.
    PlayCard {
        room_id: String,
        #[serde(deserialize_with = "one_or_many")]
        indices: Vec<usize>,
        source: Zone,
    },

    /// Request the full room state.
    GetState { room_id: String },

    /// Host starts the game.
    StartGame { room_id: String },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

fn default_bot_count() -> usize {
    1
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(usize),
        Many(Vec<usize>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(index) => vec![index],
        OneOrMany::Many(indices) => indices,
    })
}

impl ClientMessage {
    /// Room the message targets, if any.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientMessage::CreateRoom { room_id, .. } => room_id.as_deref(),
            ClientMessage::JoinRoom { room_id, .. }
            | ClientMessage::JoinBotGame { room_id, .. }
            | ClientMessage::SwitchSeat { room_id, .. }
            | ClientMessage::SwapCards { room_id, .. }
            | ClientMessage::SortHand { room_id }
            | ClientMessage::SetReady { room_id }
            | ClientMessage::TakePile { room_id }
            | ClientMessage::PlayCard { room_id, .. }
            | ClientMessage::GetState { room_id }
            | ClientMessage::StartGame { room_id } => Some(room_id),
            ClientMessage::Ping { .. } => None,
        }
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat confirmed; `player_id` identifies the caller in `game_update`.
    Joined {
        room_id: String,
        player_id: ConnectionId,
    },

    /// Full room state.
    GameUpdate(Box<GameState>),

    /// Request rejected.
    Error(ServerError),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// State push for one room.
    pub fn game_update(state: GameState) -> Self {
        ServerMessage::GameUpdate(Box::new(state))
    }
}

/// Server error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&CommandError> for ServerError {
    fn from(err: &CommandError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidInput,
    /// Unknown room.
    RoomNotFound,
    /// Room id already in use.
    RoomExists,
    /// Caller has no seat in the room.
    NotInRoom,
    /// Seat, name or capacity conflict.
    JoinRejected,
    /// Command not valid in the current phase or for this caller.
    NotAllowed,
    /// Play or pickup refused by the rules.
    IllegalMove,
}

impl From<&CommandError> for ErrorCode {
    fn from(err: &CommandError) -> Self {
        match err {
            CommandError::RoomNotFound => ErrorCode::RoomNotFound,
            CommandError::RoomExists => ErrorCode::RoomExists,
            CommandError::PlayerNotFound => ErrorCode::NotInRoom,
            CommandError::RoomFull | CommandError::NameTaken | CommandError::SeatUnavailable(_) => {
                ErrorCode::JoinRejected
            }
            CommandError::WrongPhase(_)
            | CommandError::NotYourTurn
            | CommandError::NotHost
            | CommandError::NotEnoughPlayers
            | CommandError::PlayersNotReady
            | CommandError::AlreadyReady => ErrorCode::NotAllowed,
            CommandError::EmptySelection
            | CommandError::InvalidIndex(_)
            | CommandError::DuplicateIndex(_)
            | CommandError::MixedRanks
            | CommandError::BlindGroup
            | CommandError::ZoneLocked(_)
            | CommandError::IllegalPlay
            | CommandError::EmptyPile => ErrorCode::IllegalMove,
        }
    }
}

//! Command rejection reasons.
//!
//! A rejected command never mutates the session, never bumps its version and
//! never triggers a notification.

use thiserror::Error;

use crate::game::player::Zone;
use crate::game::state::GameStatus;

/// Why an inbound command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No room with that id.
    #[error("room not found")]
    RoomNotFound,

    /// A room with that id already exists.
    #[error("room already exists")]
    RoomExists,

    /// Caller does not hold a seat in the room.
    #[error("player not found")]
    PlayerNotFound,

    /// Command is not valid in the current phase.
    #[error("not allowed while {0:?}")]
    WrongPhase(GameStatus),

    /// Caller is not the current player.
    #[error("not your turn")]
    NotYourTurn,

    /// Only the host may start the game.
    #[error("only the host can start the game")]
    NotHost,

    /// Fewer than two players seated.
    #[error("not enough players")]
    NotEnoughPlayers,

    /// At least one player is not ready.
    #[error("players not ready")]
    PlayersNotReady,

    /// Every seat is taken.
    #[error("room is full")]
    RoomFull,

    /// A connected player already uses that display name.
    #[error("name already taken")]
    NameTaken,

    /// Seat index out of range or occupied.
    #[error("seat {0} unavailable")]
    SeatUnavailable(usize),

    /// Ready players may not swap.
    #[error("already ready")]
    AlreadyReady,

    /// No card indices supplied.
    #[error("no cards selected")]
    EmptySelection,

    /// Card index outside the zone.
    #[error("card index {0} out of range")]
    InvalidIndex(usize),

    /// The same index appears twice.
    #[error("card index {0} selected twice")]
    DuplicateIndex(usize),

    /// Selected cards do not share one rank.
    #[error("cards must share one rank")]
    MixedRanks,

    /// Blind plays reveal one card at a time.
    #[error("face-down cards are played one at a time")]
    BlindGroup,

    /// A higher-priority zone still holds cards.
    #[error("{0:?} is locked until earlier zones are empty")]
    ZoneLocked(Zone),

    /// The play does not beat the effective top card.
    #[error("illegal play")]
    IllegalPlay,

    /// Nothing to pick up.
    #[error("discard pile is empty")]
    EmptyPile,
}

//! Game Events
//!
//! Every committed mutation is described by one or more events. Their text
//! form feeds the bounded session log shown to players.

use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::card::Rank;

/// Default number of log lines retained per session.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Rule effect triggered by a play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayEffect {
    /// Last hand card was special with an empty deck; pile taken.
    EndGamePenalty,
    /// Blind card did not beat the pile; pile taken.
    BlindMiss,
    /// Four of a kind burned the pile.
    Bomb,
    /// A ten burned the pile.
    Burn,
    /// A two reset the requirement.
    Reset,
    /// A seven forces the next play lower.
    LowerNext,
    /// A joker reversed direction.
    Reverse,
    /// A joker in a two-player room; same player continues.
    PlayAgain,
}

impl PlayEffect {
    fn suffix(self) -> &'static str {
        match self {
            PlayEffect::EndGamePenalty => " (Final Special Penalty!)",
            PlayEffect::BlindMiss => " (Blind miss, pile taken)",
            PlayEffect::Bomb => " (BOMB!)",
            PlayEffect::Burn => " (Pile Burned)",
            PlayEffect::Reset => " (Pile Reset)",
            PlayEffect::LowerNext => " (Next < 7)",
            PlayEffect::Reverse => " (Reverse)",
            PlayEffect::PlayAgain => " (Joker, play again!)",
        }
    }
}

/// Something that happened in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A human took a seat.
    PlayerJoined { name: String, seat: usize },
    /// A bot took a seat.
    BotAdded { name: String, seat: usize },
    /// A disconnected human came back.
    PlayerReconnected { name: String },
    /// A human's transport dropped.
    PlayerDisconnected { name: String },
    /// Grace period expired; seat is now a bot.
    ConvertedToBot { name: String },
    /// Seat change in the lobby.
    SeatChanged { name: String, from: usize, to: usize },
    /// Ready flag set.
    PlayerReady { name: String },
    /// Hand/face-up exchange during preparation.
    CardsSwapped { name: String },
    /// Hand reordered.
    HandSorted { name: String },
    /// Cards dealt, swap phase open.
    PreparationStarted,
    /// Swap phase over.
    PlayingStarted { first: String },
    /// A group of cards reached the pile.
    CardsPlayed { name: String, count: usize, rank: Rank, effect: Option<PlayEffect> },
    /// Discard pile moved into a hand.
    PileTaken { name: String, count: usize },
    /// Turn moved on without a play.
    TurnForced { name: String },
    /// A player emptied all zones.
    PlayerFinished { name: String, place: u8 },
    /// One or zero players left.
    GameOver { winner: Option<String> },
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::PlayerJoined { name, seat } => write!(f, "{} joined at seat {}", name, seat + 1),
            GameEvent::BotAdded { name, seat } => write!(f, "{} added at seat {}", name, seat + 1),
            GameEvent::PlayerReconnected { name } => write!(f, "{} reconnected", name),
            GameEvent::PlayerDisconnected { name } => write!(f, "{} disconnected", name),
            GameEvent::ConvertedToBot { name } => write!(f, "{} is now played by a bot", name),
            GameEvent::SeatChanged { name, from, to } => {
                write!(f, "{} moved from seat {} to seat {}", name, from + 1, to + 1)
            }
            GameEvent::PlayerReady { name } => write!(f, "{} is ready", name),
            GameEvent::CardsSwapped { name } => write!(f, "{} swapped cards", name),
            GameEvent::HandSorted { name } => write!(f, "{} sorted their hand", name),
            GameEvent::PreparationStarted => {
                f.write_str("Preparation Phase: Swap your cards! Press Ready when done.")
            }
            GameEvent::PlayingStarted { first } => write!(f, "Game Started! {}'s turn.", first),
            GameEvent::CardsPlayed { name, count, rank, effect } => {
                write!(f, "{} played {}x {}", name, count, rank)?;
                match effect {
                    Some(effect) => f.write_str(effect.suffix()),
                    None => Ok(()),
                }
            }
            GameEvent::PileTaken { name, count } => write!(f, "{} took the pile ({} cards)", name, count),
            GameEvent::TurnForced { name } => write!(f, "{} could not move, turn passed", name),
            GameEvent::PlayerFinished { name, place } => write!(f, "{} finished #{}", name, place),
            GameEvent::GameOver { winner: Some(winner) } => write!(f, "Winner: {}!", winner),
            GameEvent::GameOver { winner: None } => f.write_str("Game over"),
        }
    }
}

/// Bounded log of event lines.
///
/// A line equal to the newest entry is dropped; the oldest line falls off once
/// `capacity` is reached.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "Vec<String>", from = "Vec<String>")]
pub struct EventLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// Empty log holding at most `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a line. Returns false if it duplicated the newest entry.
    pub fn push(&mut self, line: String) -> bool {
        if self.lines.back() == Some(&line) {
            return false;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        true
    }

    /// Newest line.
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Oldest-first iterator.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// True if any retained line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl From<EventLog> for Vec<String> {
    fn from(log: EventLog) -> Self {
        log.lines.into_iter().collect()
    }
}

impl From<Vec<String>> for EventLog {
    fn from(lines: Vec<String>) -> Self {
        let mut log = EventLog::default();
        for line in lines {
            log.push(line);
        }
        log
    }
}

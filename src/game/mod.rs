//! Game Logic Module
//!
//! Synchronous, transport-free session engine. Everything here runs under
//! the owning room's lock; delayed work is requested through [`FollowUp`].
//!
//! ## Module Structure
//!
//! - `player`: Players, zones, connection ids
//! - `rules`: Move legality and hand ordering
//! - `state`: Session aggregate and queries
//! - `engine`: Commands and the turn/phase state machine
//! - `bot`: Bot decisions and fallbacks
//! - `events`: Typed log entries and the bounded event log
//! - `error`: Command rejection reasons

pub mod bot;
pub mod engine;
pub mod error;
pub mod events;
pub mod player;
pub mod rules;
pub mod state;

// Re-export key types
pub use bot::BotMove;
pub use engine::JoinOutcome;
pub use error::CommandError;
pub use events::{EventLog, GameEvent, PlayEffect};
pub use player::{ConnectionId, Player, Zone};
pub use state::{CardToBeat, FollowUp, GameState, GameStatus};

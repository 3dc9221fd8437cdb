//! Network Layer
//!
//! Async shell around the engine: per-room serialization and timers,
//! the JSON protocol, and the WebSocket server.
//! All game rules run through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use session::{Room, RoomChanged, RoomId, SessionRegistry};
pub use server::{GameServer, GameServerError};

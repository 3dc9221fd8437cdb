//! # Palace Game Server
//!
//! Authoritative server for Palace, a multi-player shedding card game with
//! hand, face-up and face-down zones, special ranks and bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PALACE SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Value types                               │
//! │  ├── card.rs     - Suits, ranks, card values                 │
//! │  ├── deck.rs     - Deck composition and shuffling            │
//! │  └── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │                                                              │
//! │  game/           - Session engine (synchronous)              │
//! │  ├── rules.rs    - Move legality and hand ordering           │
//! │  ├── state.rs    - Session aggregate                         │
//! │  ├── engine.rs   - Commands and turn/phase machine           │
//! │  ├── bot.rs      - Bot decisions                             │
//! │  └── events.rs   - Event log                                 │
//! │                                                              │
//! │  network/        - Async shell                               │
//! │  ├── session.rs  - Rooms, timers, registry                   │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! A room's state is only ever touched under that room's lock. Commands
//! either fail without side effects or commit, bump `version` once and
//! notify listeners. Delayed continuations (bot turns, forced pickups,
//! reconnect grace) re-check the state they act on when they fire.
//!
//! Given the same seed and command sequence, the engine deals and plays
//! identically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{EngineConfig, ServerConfig};
pub use core::card::{Card, Rank, Suit};
pub use core::rng::DeterministicRng;
pub use game::{CommandError, ConnectionId, GameState, GameStatus, Zone};
pub use network::{GameServer, SessionRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

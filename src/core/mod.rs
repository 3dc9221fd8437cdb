//! Core value types.
//!
//! Cards, decks and the deterministic RNG. Nothing in here knows the rules
//! of the game.

pub mod card;
pub mod deck;
pub mod rng;

// Re-export core types
pub use card::{Card, Rank, Suit};
pub use deck::{build_deck, deck_count_for, shuffle};
pub use rng::DeterministicRng;

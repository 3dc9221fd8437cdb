//! Deck Construction
//!
//! A deck is a plain `Vec<Card>`; the tail is the top, so dealing is `pop()`.

use super::card::{Card, Rank, Suit};
use super::rng::DeterministicRng;

/// Jokers added per standard 52-card set.
pub const JOKERS_PER_SET: usize = 4;

/// Cards in one set including its jokers.
pub const CARDS_PER_SET: usize = 52 + JOKERS_PER_SET;

/// Rooms larger than this play with two sets.
pub const LARGE_ROOM_THRESHOLD: usize = 6;

/// Number of card sets for a room of `player_count` seats.
#[inline]
pub fn deck_count_for(player_count: usize) -> usize {
    if player_count > LARGE_ROOM_THRESHOLD { 2 } else { 1 }
}

/// Build `num_decks` sets in deterministic (unshuffled) order.
pub fn build_deck(num_decks: usize) -> Vec<Card> {
    let mut deck = Vec::with_capacity(CARDS_PER_SET * num_decks);
    for _ in 0..num_decks {
        for suit in Suit::STANDARD {
            for rank in Rank::STANDARD {
                deck.push(Card::new(rank, suit));
            }
        }
        deck.extend(std::iter::repeat(Card::joker()).take(JOKERS_PER_SET));
    }
    deck
}

/// Uniform Fisher-Yates shuffle in place.
pub fn shuffle(deck: &mut [Card], rng: &mut DeterministicRng) {
    rng.shuffle(deck);
}

/// Build and shuffle the deck for a room of `player_count` seats.
pub fn shuffled_deck_for(player_count: usize, rng: &mut DeterministicRng) -> Vec<Card> {
    let mut deck = build_deck(deck_count_for(player_count));
    shuffle(&mut deck, rng);
    deck
}

//! Move Validation
//!
//! Pure functions deciding whether cards may be played onto the pile.
//!
//! ## Precedence
//!
//! 1. No effective top card: anything goes.
//! 2. Special ranks (2, 7, 10, joker) are always playable.
//! 3. Top is a 7: only values strictly below 7.
//! 4. Top is a 2 or joker: anything goes.
//! 5. Otherwise: value must be at least the top's value.

use std::collections::HashMap;

use crate::core::card::{Card, Rank};

/// Cards of one rank that form a bomb.
pub const BOMB_SIZE: usize = 4;

/// Whether `candidate` may be played onto `top`.
pub fn is_legal(candidate: &Card, top: Option<&Card>) -> bool {
    let Some(top) = top else {
        return true;
    };

    if candidate.is_special() {
        return true;
    }

    if top.rank == Rank::Seven {
        return candidate.value() < Rank::Seven.value();
    }

    if top.rank == Rank::Two || top.is_joker() {
        return true;
    }

    candidate.value() >= top.value()
}

/// True for a group that burns the pile regardless of the top card.
#[inline]
pub fn is_bomb(cards: &[Card]) -> bool {
    cards.len() == BOMB_SIZE && shares_rank(cards)
}

/// True if every card has the rank of the first.
pub fn shares_rank(cards: &[Card]) -> bool {
    match cards.first() {
        Some(first) => cards.iter().all(|c| c.rank == first.rank),
        None => false,
    }
}

/// Whether a group of cards from one zone may be played onto `top`.
pub fn is_group_legal(cards: &[Card], top: Option<&Card>) -> bool {
    if !shares_rank(cards) {
        return false;
    }
    is_bomb(cards) || is_legal(&cards[0], top)
}

/// Indices of cards individually legal onto `top`.
pub fn legal_indices(cards: &[Card], top: Option<&Card>) -> Vec<usize> {
    cards
        .iter()
        .enumerate()
        .filter(|(_, card)| is_legal(card, top))
        .map(|(idx, _)| idx)
        .collect()
}

/// Whether any play exists from `cards`, counting bombs.
pub fn has_legal_play(cards: &[Card], top: Option<&Card>) -> bool {
    if cards.iter().any(|card| is_legal(card, top)) {
        return true;
    }
    let mut by_rank: HashMap<Rank, usize> = HashMap::new();
    for card in cards {
        *by_rank.entry(card.rank).or_insert(0) += 1;
    }
    by_rank.values().any(|&n| n >= BOMB_SIZE)
}

/// Ordering weight for hand sorting: normal ranks by value, then 2, 10, joker.
pub fn sort_power(rank: Rank) -> u8 {
    match rank {
        Rank::Two => 15,
        Rank::Ten => 16,
        Rank::Joker => 17,
        other => other.value(),
    }
}

/// Canonical hand order, ties broken by suit.
pub fn sort_cards(cards: &mut [Card]) {
    cards.sort_by_key(|c| (sort_power(c.rank), c.suit));
}

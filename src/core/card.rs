//! Card Value Types
//!
//! Immutable card model. Equality is by value: two jokers are the same card.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Card suit.
///
/// Declaration order doubles as the tie-break order when sorting a hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    /// Hearts
    Hearts,
    /// Diamonds
    Diamonds,
    /// Clubs
    Clubs,
    /// Spades
    Spades,
    /// Only ever paired with [`Rank::Joker`].
    Joker,
}

impl Suit {
    /// The four standard suits, in deck-building order.
    pub const STANDARD: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

/// Card rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    /// Two (special: resets the pile requirement)
    #[serde(rename = "2")]
    Two,
    /// Three
    #[serde(rename = "3")]
    Three,
    /// Four
    #[serde(rename = "4")]
    Four,
    /// Five
    #[serde(rename = "5")]
    Five,
    /// Six
    #[serde(rename = "6")]
    Six,
    /// Seven (special: next play must be lower)
    #[serde(rename = "7")]
    Seven,
    /// Eight
    #[serde(rename = "8")]
    Eight,
    /// Nine
    #[serde(rename = "9")]
    Nine,
    /// Ten (special: burns the pile)
    #[serde(rename = "10")]
    Ten,
    /// Jack
    #[serde(rename = "J")]
    Jack,
    /// Queen
    #[serde(rename = "Q")]
    Queen,
    /// King
    #[serde(rename = "K")]
    King,
    /// Ace
    #[serde(rename = "A")]
    Ace,
    /// Joker (special: reverses direction)
    #[serde(rename = "joker")]
    Joker,
}

/// Numeric value of a joker. Higher than anything it could be compared with.
pub const JOKER_VALUE: u8 = 99;

impl Rank {
    /// The thirteen ranks of a standard suit, in deck-building order.
    pub const STANDARD: [Rank; 13] = [
        Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King, Rank::Ace,
    ];

    /// Comparison value: 2..10 literal, J=11, Q=12, K=13, A=14, joker=99.
    #[inline]
    pub fn value(self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Ace => 14,
            Rank::Joker => JOKER_VALUE,
        }
    }

    /// Special ranks alter the rules: 2, 7, 10 and joker.
    #[inline]
    pub fn is_special(self) -> bool {
        matches!(self, Rank::Two | Rank::Seven | Rank::Ten | Rank::Joker)
    }

    /// Short label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
            Rank::Joker => "joker",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A playing card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Suit
    pub suit: Suit,
    /// Rank
    pub rank: Rank,
}

impl Card {
    /// Create a standard card. Use [`Card::joker`] for jokers.
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }

    /// The joker. Suit and rank are always joker together.
    pub const fn joker() -> Self {
        Self { suit: Suit::Joker, rank: Rank::Joker }
    }

    /// True if either half of the card says joker.
    #[inline]
    pub fn is_joker(&self) -> bool {
        self.rank == Rank::Joker || self.suit == Suit::Joker
    }

    /// Comparison value of the rank.
    #[inline]
    pub fn value(&self) -> u8 {
        self.rank.value()
    }

    /// See [`Rank::is_special`].
    #[inline]
    pub fn is_special(&self) -> bool {
        self.rank.is_special()
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suit = match self.suit {
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
            Suit::Spades => "♠",
            Suit::Joker => return f.write_str("joker"),
        };
        write!(f, "{}{}", self.rank, suit)
    }
}

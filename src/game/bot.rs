//! Computer Players
//!
//! Bots play from their active zone: a random legal special card if they
//! hold one, otherwise a random legal normal card, a bomb when nothing else
//! fits, and a blind random pick from the face-down zone. With no move they
//! take the pile.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::card::Rank;
use crate::game::player::{ConnectionId, Zone};
use crate::game::rules::{legal_indices, BOMB_SIZE};
use crate::game::state::{GameState, GameStatus};

/// What a bot decided to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotMove {
    /// Play these indices from a zone.
    Play { zone: Zone, indices: Vec<usize> },
    /// Pick up the discard pile.
    TakePile,
}

impl GameState {
    /// Pick a move for the player at `idx`. Consumes randomness.
    pub fn choose_bot_move(&mut self, idx: usize) -> BotMove {
        let Some(zone) = self.players[idx].active_zone() else {
            return BotMove::TakePile;
        };

        if zone == Zone::FaceDown {
            let len = self.players[idx].face_down.len();
            return BotMove::Play { zone, indices: vec![self.rng.next_index(len)] };
        }

        let top = self.effective_top();
        let cards = self.players[idx].zone(zone);

        let (specials, normals): (Vec<usize>, Vec<usize>) = legal_indices(cards, top.as_ref())
            .into_iter()
            .partition(|&i| cards[i].is_special());

        let mut by_rank: BTreeMap<Rank, Vec<usize>> = BTreeMap::new();
        for (i, card) in cards.iter().enumerate() {
            by_rank.entry(card.rank).or_default().push(i);
        }

        let pool = if !specials.is_empty() { specials } else { normals };
        if let Some(&pick) = self.rng.choose(&pool) {
            return BotMove::Play { zone, indices: vec![pick] };
        }

        match by_rank.into_values().find(|group| group.len() >= BOMB_SIZE) {
            Some(group) => BotMove::Play { zone, indices: group[..BOMB_SIZE].to_vec() },
            None => BotMove::TakePile,
        }
    }

    /// Act for a bot whose delay elapsed. False if the turn is no longer theirs.
    ///
    /// Every failure is a `CommandError` rather than a panic, so the fallback
    /// chain (play, take pile, force pass) always ends with the turn moved on.
    pub fn run_bot_turn(&mut self, bot_id: &ConnectionId) -> bool {
        if self.status != GameStatus::Playing || !self.is_current(bot_id) {
            return false;
        }
        let Some(idx) = self.player_index(bot_id) else {
            return false;
        };
        if !self.players[idx].is_bot {
            return false;
        }

        let decision = self.choose_bot_move(idx);
        debug!(room = %self.id, bot = %self.players[idx].name, ?decision, "bot move");

        let played = match &decision {
            BotMove::Play { zone, indices } => match self.play_cards(bot_id, indices, *zone) {
                Ok(()) => true,
                Err(err) => {
                    warn!(room = %self.id, bot = %self.players[idx].name, %err, "bot play rejected");
                    false
                }
            },
            BotMove::TakePile => false,
        };
        if played {
            return true;
        }

        if !self.discard_pile.is_empty() {
            match self.take_pile(bot_id) {
                Ok(()) => return true,
                Err(err) => warn!(room = %self.id, %err, "bot could not take pile"),
            }
        }

        warn!(room = %self.id, bot = %self.players[idx].name, "bot stuck, forcing turn");
        self.force_pass(idx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::card::{Card, Suit};
    use crate::game::state::FollowUp;

    fn bot_room(bots: usize, seed: u64) -> GameState {
        let mut state = GameState::with_seed("bots", seed);
        for n in 1..=bots {
            state.add_bot(n).unwrap();
        }
        state
    }

    fn all_bot_game(bots: usize, seed: u64) -> GameState {
        let mut state = bot_room(bots, seed);
        let host = state.host().map(|p| p.id).unwrap();
        state.start_game(&host).unwrap();
        assert_eq!(state.status, GameStatus::Playing);
        state
    }

    #[test]
    fn test_prefers_special() {
        let mut state = all_bot_game(2, 1);
        state.discard_pile = vec![Card::new(Rank::Five, Suit::Clubs)];
        state.players[0].hand = vec![
            Card::new(Rank::King, Suit::Hearts),
            Card::new(Rank::Ten, Suit::Hearts),
            Card::new(Rank::Queen, Suit::Hearts),
        ];

        for _ in 0..20 {
            assert_eq!(
                state.choose_bot_move(0),
                BotMove::Play { zone: Zone::Hand, indices: vec![1] }
            );
        }
    }

    #[test]
    fn test_takes_pile_without_move() {
        let mut state = all_bot_game(2, 1);
        state.discard_pile = vec![Card::new(Rank::Ace, Suit::Clubs)];
        state.players[0].hand = vec![Card::new(Rank::Three, Suit::Hearts), Card::new(Rank::Four, Suit::Hearts)];
        assert_eq!(state.choose_bot_move(0), BotMove::TakePile);
    }

    #[test]
    fn test_bomb_as_last_resort() {
        let mut state = all_bot_game(2, 1);
        state.discard_pile = vec![Card::new(Rank::Ace, Suit::Clubs)];
        state.players[0].hand = vec![
            Card::new(Rank::Four, Suit::Hearts),
            Card::new(Rank::Four, Suit::Diamonds),
            Card::new(Rank::Three, Suit::Hearts),
            Card::new(Rank::Four, Suit::Clubs),
            Card::new(Rank::Four, Suit::Spades),
        ];
        assert_eq!(
            state.choose_bot_move(0),
            BotMove::Play { zone: Zone::Hand, indices: vec![0, 1, 3, 4] }
        );
    }

    #[test]
    fn test_blind_pick_in_range() {
        let mut state = all_bot_game(2, 9);
        state.players[0].hand.clear();
        state.players[0].face_up.clear();
        for _ in 0..20 {
            match state.choose_bot_move(0) {
                BotMove::Play { zone: Zone::FaceDown, indices } => {
                    assert_eq!(indices.len(), 1);
                    assert!(indices[0] < 2);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_stale_bot_turn_ignored() {
        let mut state = all_bot_game(3, 4);
        let current = state.current_player_index;
        let other = state.players[(current + 1) % 3].id;
        let version = state.version;
        assert!(!state.run_bot_turn(&other));
        assert_eq!(state.version, version);
    }

    #[test]
    fn test_bot_turn_advances() {
        let mut state = all_bot_game(3, 4);
        let bot = state.current_player().map(|p| p.id).unwrap();
        state.take_follow_ups();

        assert!(state.run_bot_turn(&bot));
        assert!(!state.is_current(&bot));
        assert!(state.log.iter().any(|l| l.contains("played")));
    }

    #[test]
    fn test_all_bot_games_terminate_and_conserve_cards() {
        for (bots, seed) in [(2, 11), (3, 12), (4, 13), (7, 14), (10, 15)] {
            let mut state = all_bot_game(bots, seed);
            let mut steps = 0;

            while state.status == GameStatus::Playing {
                let follow_ups = state.take_follow_ups();
                let bot = match follow_ups.first() {
                    Some(FollowUp::BotTurn(id)) => *id,
                    _ => state.current_player().map(|p| p.id).unwrap(),
                };
                state.run_bot_turn(&bot);
                assert_eq!(state.accounted_cards(), state.dealt, "bots={} seed={}", bots, seed);

                steps += 1;
                assert!(steps < 100_000, "game did not end: bots={} seed={}", bots, seed);
            }

            assert_eq!(state.status, GameStatus::Finished);
            assert!(state.winner_id.is_some());
            let places: Vec<u8> = state.players.iter().filter_map(|p| p.finished_rank).collect();
            assert_eq!(places.len(), bots - 1);
            for place in 1..bots as u8 {
                assert!(places.contains(&place));
            }
        }
    }
}

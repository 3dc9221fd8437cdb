//! Session Commands and Turn Flow
//!
//! Every inbound command is a method on [`GameState`] returning
//! `Result<_, CommandError>`. A rejected command leaves the state untouched;
//! an accepted one bumps `version` exactly once.
//!
//! Delayed work (bot turns, forced pickups) is never run inline. The engine
//! queues a [`FollowUp`] and the owning room schedules it.

use tracing::{debug, info};

use crate::core::card::{Card, Rank};
use crate::core::deck::shuffled_deck_for;
use crate::game::error::CommandError;
use crate::game::events::{GameEvent, PlayEffect};
use crate::game::player::{ConnectionId, Player, Zone, CARDS_PER_ZONE, HAND_FLOOR, MIN_PLAYERS};
use crate::game::rules::{has_legal_play, is_bomb, is_legal, shares_rank, sort_cards};
use crate::game::state::{CardToBeat, FollowUp, GameState, GameStatus};

/// Result of a join request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New seat taken.
    Joined { seat: usize },
    /// A disconnected seat was reclaimed by name.
    Reconnected { name: String },
    /// The connection already held a seat.
    AlreadySeated,
}

impl GameState {
    // =========================================================================
    // ROSTER
    // =========================================================================

    /// Seat a human, or reattach a disconnected one with the same name.
    pub fn add_player(&mut self, id: ConnectionId, name: &str) -> Result<JoinOutcome, CommandError> {
        if let Some(player) = self.player_mut(&id) {
            player.connected = true;
            self.touch();
            return Ok(JoinOutcome::AlreadySeated);
        }

        if let Some(idx) = self.players.iter().position(|p| p.name == name) {
            let player = &self.players[idx];
            if player.connected || player.is_bot {
                return Err(CommandError::NameTaken);
            }

            let old_id = player.id;
            let player = &mut self.players[idx];
            player.id = id;
            player.connected = true;
            if self.winner_id == Some(old_id) {
                self.winner_id = Some(id);
            }
            info!(room = %self.id, player = name, "player reconnected");
            self.record(GameEvent::PlayerReconnected { name: name.to_string() });
            self.touch();
            return Ok(JoinOutcome::Reconnected { name: name.to_string() });
        }

        self.require_status(GameStatus::Waiting)?;
        let seat = self.lowest_free_seat().ok_or(CommandError::RoomFull)?;

        self.players.push(Player::human(id, name, seat));
        self.sort_by_seat();
        self.record(GameEvent::PlayerJoined { name: name.to_string(), seat });
        self.touch();
        Ok(JoinOutcome::Joined { seat })
    }

    /// Seat a bot named after its ordinal.
    pub fn add_bot(&mut self, ordinal: usize) -> Result<ConnectionId, CommandError> {
        self.require_status(GameStatus::Waiting)?;
        let seat = self.lowest_free_seat().ok_or(CommandError::RoomFull)?;

        let bot = Player::bot(format!("Bot {}", ordinal), seat);
        let id = bot.id;
        let name = bot.name.clone();
        self.players.push(bot);
        self.sort_by_seat();
        self.record(GameEvent::BotAdded { name, seat });
        self.touch();
        Ok(id)
    }

    /// Move to an empty seat. Lobby only.
    pub fn switch_seat(&mut self, id: &ConnectionId, target: usize) -> Result<(), CommandError> {
        self.require_status(GameStatus::Waiting)?;
        if !self.seat_is_free(target) {
            return Err(CommandError::SeatUnavailable(target));
        }
        let player = self.player_mut(id).ok_or(CommandError::PlayerNotFound)?;

        let from = player.seat_index;
        player.seat_index = target;
        let name = player.name.clone();
        self.sort_by_seat();
        self.record(GameEvent::SeatChanged { name, from, to: target });
        self.touch();
        Ok(())
    }

    /// Transport dropped. Returns the display name the grace timer is keyed by.
    pub fn mark_disconnected(&mut self, id: &ConnectionId) -> Result<String, CommandError> {
        let player = self.player_mut(id).ok_or(CommandError::PlayerNotFound)?;
        if player.is_bot || !player.connected {
            return Err(CommandError::PlayerNotFound);
        }

        player.connected = false;
        let name = player.name.clone();
        info!(room = %self.id, player = %name, "player disconnected");
        self.record(GameEvent::PlayerDisconnected { name: name.clone() });
        self.touch();
        Ok(name)
    }

    /// Hand a still-disconnected seat to a bot. False if the player came back.
    pub fn convert_to_bot(&mut self, name: &str) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.name == name) else {
            return false;
        };
        let player = &mut self.players[idx];
        if player.connected || player.is_bot {
            return false;
        }

        player.is_bot = true;
        player.connected = true;
        player.is_ready = true;
        player.name = format!("{} (Bot)", name);
        let bot_id = player.id;
        info!(room = %self.id, player = name, "converted to bot");
        self.record(GameEvent::ConvertedToBot { name: name.to_string() });

        match self.status {
            GameStatus::Waiting => self.maybe_auto_start(),
            GameStatus::Preparing => self.maybe_begin_playing(),
            GameStatus::Playing if self.is_current(&bot_id) => {
                self.push_follow_up(FollowUp::BotTurn(bot_id));
            }
            _ => {}
        }
        self.touch();
        true
    }

    // =========================================================================
    // LOBBY AND PREPARATION
    // =========================================================================

    /// Mark ready. Drives the lobby auto-start and the swap-phase exit.
    pub fn set_ready(&mut self, id: &ConnectionId) -> Result<(), CommandError> {
        if !matches!(self.status, GameStatus::Waiting | GameStatus::Preparing) {
            return Err(CommandError::WrongPhase(self.status));
        }
        let player = self.player_mut(id).ok_or(CommandError::PlayerNotFound)?;
        player.is_ready = true;
        let name = player.name.clone();
        self.record(GameEvent::PlayerReady { name });

        match self.status {
            GameStatus::Waiting => self.maybe_auto_start(),
            GameStatus::Preparing => self.maybe_begin_playing(),
            _ => {}
        }
        self.touch();
        Ok(())
    }

    /// Exchange one hand card with one face-up card. Swap phase only.
    pub fn swap_cards(
        &mut self,
        id: &ConnectionId,
        hand_index: usize,
        face_up_index: usize,
    ) -> Result<(), CommandError> {
        self.require_status(GameStatus::Preparing)?;
        let player = self.player_mut(id).ok_or(CommandError::PlayerNotFound)?;
        if player.is_ready {
            return Err(CommandError::AlreadyReady);
        }
        if hand_index >= player.hand.len() {
            return Err(CommandError::InvalidIndex(hand_index));
        }
        if face_up_index >= player.face_up.len() {
            return Err(CommandError::InvalidIndex(face_up_index));
        }

        std::mem::swap(&mut player.hand[hand_index], &mut player.face_up[face_up_index]);
        let name = player.name.clone();
        self.record(GameEvent::CardsSwapped { name });
        self.touch();
        Ok(())
    }

    /// Host starts the game once everyone is ready.
    pub fn start_game(&mut self, id: &ConnectionId) -> Result<(), CommandError> {
        self.require_status(GameStatus::Waiting)?;
        if self.players.len() < MIN_PLAYERS {
            return Err(CommandError::NotEnoughPlayers);
        }
        if self.host().map(|p| p.id) != Some(*id) {
            return Err(CommandError::NotHost);
        }
        if !self.all_ready() {
            return Err(CommandError::PlayersNotReady);
        }

        self.begin_preparation();
        self.touch();
        Ok(())
    }

    /// Canonical hand order. Allowed in any phase.
    pub fn sort_hand(&mut self, id: &ConnectionId) -> Result<(), CommandError> {
        let player = self.player_mut(id).ok_or(CommandError::PlayerNotFound)?;
        sort_cards(&mut player.hand);
        let name = player.name.clone();
        self.record(GameEvent::HandSorted { name });
        self.touch();
        Ok(())
    }

    fn maybe_auto_start(&mut self) {
        if self.status == GameStatus::Waiting
            && self.has_bot()
            && self.players.len() >= MIN_PLAYERS
            && self.all_ready()
        {
            info!(room = %self.id, "auto-starting bot game");
            self.begin_preparation();
        }
    }

    fn begin_preparation(&mut self) {
        let count = self.players.len();
        self.status = GameStatus::Preparing;
        self.deck = shuffled_deck_for(count, &mut self.rng);
        self.dealt = self.deck.len();
        self.discard_pile.clear();
        self.burned = 0;
        self.card_to_beat = CardToBeat::Unset;
        self.direction = 1;
        self.winner_id = None;
        self.current_player_index = self.rng.next_index(count);

        for idx in 0..count {
            let player = &mut self.players[idx];
            player.hand.clear();
            player.face_up.clear();
            player.face_down.clear();
            player.finished_rank = None;
            player.is_ready = player.is_bot;

            for zone in [Zone::FaceDown, Zone::FaceUp, Zone::Hand] {
                for _ in 0..CARDS_PER_ZONE {
                    if let Some(card) = self.deck.pop() {
                        player.zone_mut(zone).push(card);
                    }
                }
            }
        }

        info!(room = %self.id, players = count, deck = self.deck.len(), "cards dealt");
        self.record(GameEvent::PreparationStarted);
        self.maybe_begin_playing();
    }

    fn maybe_begin_playing(&mut self) {
        if self.status != GameStatus::Preparing {
            return;
        }
        for player in self.players.iter_mut().filter(|p| p.is_bot) {
            player.is_ready = true;
        }
        if !self.all_ready() {
            return;
        }

        self.status = GameStatus::Playing;
        let first = self.current_player().map(|p| p.name.clone()).unwrap_or_default();
        info!(room = %self.id, first = %first, "playing phase started");
        self.record(GameEvent::PlayingStarted { first });
        self.on_turn_start();
    }

    // =========================================================================
    // PLAY
    // =========================================================================

    /// Play one or more same-rank cards from a zone.
    pub fn play_cards(
        &mut self,
        id: &ConnectionId,
        indices: &[usize],
        source: Zone,
    ) -> Result<(), CommandError> {
        let idx = self.require_turn(id)?;
        let player = &self.players[idx];

        let locked = match source {
            Zone::Hand => false,
            Zone::FaceUp => !player.hand.is_empty(),
            Zone::FaceDown => !player.hand.is_empty() || !player.face_up.is_empty(),
        };
        if locked {
            return Err(CommandError::ZoneLocked(source));
        }
        if indices.is_empty() {
            return Err(CommandError::EmptySelection);
        }
        if source == Zone::FaceDown && indices.len() != 1 {
            return Err(CommandError::BlindGroup);
        }

        let zone = player.zone(source);
        for (n, &i) in indices.iter().enumerate() {
            if i >= zone.len() {
                return Err(CommandError::InvalidIndex(i));
            }
            if indices[..n].contains(&i) {
                return Err(CommandError::DuplicateIndex(i));
            }
        }

        let cards: Vec<Card> = indices.iter().map(|&i| zone[i]).collect();
        if !shares_rank(&cards) {
            return Err(CommandError::MixedRanks);
        }

        let top = self.effective_top();
        let lead = cards[0];
        let bomb = is_bomb(&cards);
        let blind = source == Zone::FaceDown;
        let beats_top = is_legal(&lead, top.as_ref());
        if !bomb && !blind && !beats_top {
            return Err(CommandError::IllegalPlay);
        }

        let blind_miss = blind && !bomb && !beats_top;
        let end_game_penalty = source == Zone::Hand
            && indices.len() == zone.len()
            && self.deck.is_empty()
            && lead.is_special();

        // Commit: move the group onto the pile.
        let mut descending = indices.to_vec();
        descending.sort_unstable_by(|a, b| b.cmp(a));
        let zone = self.players[idx].zone_mut(source);
        for i in descending {
            zone.remove(i);
        }
        self.discard_pile.extend_from_slice(&cards);
        self.card_to_beat = CardToBeat::Unset;
        if source == Zone::Hand {
            self.refill_hand(idx);
        }

        let name = self.players[idx].name.clone();
        let count = cards.len();
        debug!(room = %self.id, player = %name, count, rank = %lead.rank, ?source, "cards played");

        if end_game_penalty || blind_miss {
            let effect = if end_game_penalty { PlayEffect::EndGamePenalty } else { PlayEffect::BlindMiss };
            self.record(GameEvent::CardsPlayed { name, count, rank: lead.rank, effect: Some(effect) });
            self.collect_pile(idx);
            self.advance_turn();
            self.touch();
            return Ok(());
        }

        let mut play_again = false;
        let effect = if bomb {
            self.burn_pile();
            Some(PlayEffect::Bomb)
        } else if lead.rank == Rank::Ten {
            self.burn_pile();
            Some(PlayEffect::Burn)
        } else if lead.rank == Rank::Two {
            Some(PlayEffect::Reset)
        } else if lead.rank == Rank::Seven {
            Some(PlayEffect::LowerNext)
        } else if lead.is_joker() {
            self.direction = -self.direction;
            self.card_to_beat = self.card_beneath_jokers();
            if self.players.len() == 2 {
                play_again = true;
                Some(PlayEffect::PlayAgain)
            } else {
                Some(PlayEffect::Reverse)
            }
        } else {
            None
        };
        self.record(GameEvent::CardsPlayed { name, count, rank: lead.rank, effect });

        if self.players[idx].is_out_of_cards() {
            self.finish_player(idx);
            if self.remaining_count() <= 1 {
                self.end_game();
            } else {
                self.advance_turn();
            }
        } else if play_again {
            self.on_turn_start();
        } else {
            self.advance_turn();
        }

        self.touch();
        Ok(())
    }

    /// Current player picks up the whole pile.
    pub fn take_pile(&mut self, id: &ConnectionId) -> Result<(), CommandError> {
        let idx = self.require_turn(id)?;
        if self.discard_pile.is_empty() {
            return Err(CommandError::EmptyPile);
        }

        self.collect_pile(idx);
        self.advance_turn();
        self.touch();
        Ok(())
    }

    /// Forced pickup for a human with no legal move. False if no longer due.
    pub fn auto_pickup(&mut self, id: &ConnectionId) -> bool {
        let Some(idx) = self.player_index(id) else {
            return false;
        };
        if !self.is_current(id)
            || self.players[idx].is_bot
            || self.discard_pile.is_empty()
            || self.has_valid_move(idx)
        {
            return false;
        }

        debug!(room = %self.id, player = %self.players[idx].name, "no legal move, taking pile");
        self.collect_pile(idx);
        self.advance_turn();
        self.touch();
        true
    }

    /// Pass the turn without a play. Used only when nothing else is possible.
    pub(crate) fn force_pass(&mut self, idx: usize) {
        let name = self.players[idx].name.clone();
        self.record(GameEvent::TurnForced { name });
        self.advance_turn();
        self.touch();
    }

    // =========================================================================
    // TURN FLOW
    // =========================================================================

    /// Whether the player at `idx` can play something onto the effective top.
    pub fn has_valid_move(&self, idx: usize) -> bool {
        let player = &self.players[idx];
        let top = self.effective_top();
        if top.is_none() {
            return true;
        }
        match player.active_zone() {
            Some(Zone::FaceDown) => true,
            Some(zone) => has_legal_play(player.zone(zone), top.as_ref()),
            None => false,
        }
    }

    /// Move to the next unfinished seat in the current direction.
    pub(crate) fn advance_turn(&mut self) {
        let count = self.players.len();
        if count == 0 {
            return;
        }

        let mut next = self.current_player_index;
        for _ in 0..2 * count {
            next = (next as isize + self.direction as isize).rem_euclid(count as isize) as usize;
            if !self.players[next].is_finished() {
                break;
            }
        }
        self.current_player_index = next;
        self.on_turn_start();
    }

    /// Queue whatever the newly current seat needs: a bot turn or a forced pickup.
    fn on_turn_start(&mut self) {
        if self.status != GameStatus::Playing {
            return;
        }
        let idx = self.current_player_index;
        let Some(player) = self.players.get(idx) else {
            return;
        };

        if player.is_bot {
            self.push_follow_up(FollowUp::BotTurn(player.id));
        } else if !self.discard_pile.is_empty() && !self.has_valid_move(idx) {
            self.push_follow_up(FollowUp::AutoPickup(player.id));
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn require_status(&self, status: GameStatus) -> Result<(), CommandError> {
        if self.status == status {
            Ok(())
        } else {
            Err(CommandError::WrongPhase(self.status))
        }
    }

    fn require_turn(&self, id: &ConnectionId) -> Result<usize, CommandError> {
        self.require_status(GameStatus::Playing)?;
        let idx = self.player_index(id).ok_or(CommandError::PlayerNotFound)?;
        if idx != self.current_player_index {
            return Err(CommandError::NotYourTurn);
        }
        Ok(idx)
    }

    fn refill_hand(&mut self, idx: usize) {
        while self.players[idx].hand.len() < HAND_FLOOR {
            match self.deck.pop() {
                Some(card) => self.players[idx].hand.push(card),
                None => break,
            }
        }
    }

    fn collect_pile(&mut self, idx: usize) {
        let count = self.discard_pile.len();
        let pile = std::mem::take(&mut self.discard_pile);
        self.players[idx].hand.extend(pile);
        self.card_to_beat = CardToBeat::Unset;
        let name = self.players[idx].name.clone();
        self.record(GameEvent::PileTaken { name, count });
    }

    fn burn_pile(&mut self) {
        self.burned += self.discard_pile.len();
        self.discard_pile.clear();
    }

    fn card_beneath_jokers(&self) -> CardToBeat {
        match self.discard_pile.iter().rev().find(|c| !c.is_joker()) {
            Some(card) => CardToBeat::Card(*card),
            None => CardToBeat::NoRestriction,
        }
    }

    fn finish_player(&mut self, idx: usize) {
        let place = (self.finished_count() + 1) as u8;
        let player = &mut self.players[idx];
        player.finished_rank = Some(place);
        let name = player.name.clone();
        if self.winner_id.is_none() {
            self.winner_id = Some(player.id);
        }
        info!(room = %self.id, player = %name, place, "player finished");
        self.record(GameEvent::PlayerFinished { name, place });
    }

    fn end_game(&mut self) {
        self.status = GameStatus::Finished;
        let winner = self
            .winner_id
            .and_then(|id| self.player(&id))
            .map(|p| p.name.clone());
        info!(room = %self.id, winner = ?winner, "game over");
        self.record(GameEvent::GameOver { winner });
    }
}

// =============================================================================
// TESTS
// =============================================================================

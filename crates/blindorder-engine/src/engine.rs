//! The game engine: pure, deterministic transitions over a [`Room`].
//!
//! These functions never touch the network or storage. Randomness enters
//! exactly once, through the `Rng` handed to [`initialize_game`]; given
//! the same draw, every transition is fully determined by its inputs.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    GameError, GameEvent, PlayerId, Room, RoomPhase, EVENT_RETENTION,
    MIN_PLAYERS, NUMBER_POOL_MAX,
};

/// What a single move did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The played number was the global minimum of all unplayed numbers.
    pub correct: bool,
    /// Lives lost by this move (0 or 1).
    pub lives_lost: u32,
    /// The move exhausted the lives budget and ended the session in defeat.
    pub game_over: bool,
    /// The move completed the full sequence and ended the session in victory.
    pub victory: bool,
}

/// The read-only projection of a room's game state sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub state: RoomPhase,
    pub lives: u32,
    pub max_lives: u32,
    pub timeline: Vec<u8>,
    /// Fraction of the drawn numbers already played, `0.0..=1.0`.
    pub progress: f64,
    pub total_numbers: usize,
    /// Sorted union of all concealed hands; clients use it for the
    /// end-of-game reveal.
    pub remaining_numbers: Vec<u8>,
    pub game_events: Vec<GameEvent>,
}

/// Deals hands and moves the room from `lobby` to `playing`.
///
/// Draws `players * numbersPerPlayer` distinct integers uniformly from
/// `1..=100` and partitions them disjointly across participants. Hands
/// are sorted ascending for display; play order is decided by the moves
/// themselves. Clears the timeline and restores the lives budget.
///
/// # Errors
/// - [`GameError::StateConflict`] if the room is not in `lobby`
/// - [`GameError::Precondition`] with fewer than two participants, or
///   when the draw cannot fit in the number universe
pub fn initialize_game<R: Rng + ?Sized>(
    room: &mut Room,
    rng: &mut R,
) -> Result<(), GameError> {
    if !room.state.is_lobby() {
        return Err(GameError::StateConflict(
            "Game can only be started from the lobby".into(),
        ));
    }
    if room.players.len() < MIN_PLAYERS {
        return Err(GameError::Precondition(
            "Need at least 2 players to start".into(),
        ));
    }

    let per_player = room.numbers_per_player as usize;
    let needed = room.players.len() * per_player;
    if needed > NUMBER_POOL_MAX as usize {
        return Err(GameError::Precondition(format!(
            "Not enough unique numbers available. Need {needed} but only \
             have {NUMBER_POOL_MAX}. Reduce players or numbers per player."
        )));
    }

    // A shuffled pool makes the draw and the partition one operation:
    // consecutive chunks are disjoint and uniformly random.
    let mut pool: Vec<u8> = (1..=NUMBER_POOL_MAX).collect();
    pool.shuffle(rng);

    for player in &mut room.players {
        let mut hand: Vec<u8> = pool.drain(..per_player).collect();
        hand.sort_unstable();
        player.numbers = hand;
    }

    room.timeline.clear();
    room.lives = room.max_lives;
    room.state = RoomPhase::Playing;
    Ok(())
}

/// Applies one move: the participant plays `number` from their hand.
///
/// The move is correct iff `number` is the minimum of every number still
/// concealed in any hand. Either way the number is consumed — a played
/// number can never be replayed. An incorrect move costs one life;
/// reaching zero lives ends the session in defeat. A correct move that
/// empties the last hand ends it in victory on that same move.
///
/// # Errors
/// - [`GameError::StateConflict`] if no game is in progress
/// - [`GameError::NotFound`] if the participant is not in the room or
///   the number is not in their hand
pub fn make_move(
    room: &mut Room,
    player_id: PlayerId,
    number: u8,
) -> Result<MoveOutcome, GameError> {
    if !room.state.is_playing() {
        return Err(GameError::StateConflict(
            "No game in progress".into(),
        ));
    }

    let lowest_unplayed = room
        .players
        .iter()
        .flat_map(|p| p.numbers.iter().copied())
        .min();

    let player = room
        .player_mut(player_id)
        .ok_or_else(|| GameError::NotFound("Player not in this room".into()))?;
    let slot = player
        .numbers
        .iter()
        .position(|&n| n == number)
        .ok_or_else(|| {
            GameError::NotFound(format!("Number {number} is not in your hand"))
        })?;

    // Consumed regardless of correctness.
    player.numbers.remove(slot);

    if Some(number) == lowest_unplayed {
        room.timeline.push(number);
        let victory = room.players.iter().all(|p| p.numbers.is_empty());
        if victory {
            room.state = RoomPhase::Victory;
        }
        Ok(MoveOutcome {
            correct: true,
            lives_lost: 0,
            game_over: false,
            victory,
        })
    } else {
        room.lives = room.lives.saturating_sub(1);
        let game_over = room.lives == 0;
        if game_over {
            room.state = RoomPhase::GameOver;
        }
        Ok(MoveOutcome {
            correct: false,
            lives_lost: 1,
            game_over,
            victory: false,
        })
    }
}

/// Returns the room to `lobby`: full lives, empty timeline and hands,
/// cleared event log. Legal from any state; always succeeds.
pub fn reset_game(room: &mut Room) {
    room.state = RoomPhase::Lobby;
    room.lives = room.max_lives;
    room.timeline.clear();
    room.game_events.clear();
    for player in &mut room.players {
        player.numbers.clear();
    }
}

/// Appends to the event log, trimming the oldest entries beyond the
/// retention bound. Never fails.
pub fn add_game_event(room: &mut Room, event: GameEvent) {
    room.game_events.push(event);
    if room.game_events.len() > EVENT_RETENTION {
        let overflow = room.game_events.len() - EVENT_RETENTION;
        room.game_events.drain(..overflow);
    }
}

/// Derives the client-facing projection of the room's game state.
pub fn game_state(room: &Room) -> GameStateView {
    let total = room.total_numbers();
    let progress = if total == 0 {
        0.0
    } else {
        room.timeline.len() as f64 / total as f64
    };

    let mut remaining: Vec<u8> = room
        .players
        .iter()
        .flat_map(|p| p.numbers.iter().copied())
        .collect();
    remaining.sort_unstable();

    GameStateView {
        state: room.state,
        lives: room.lives,
        max_lives: room.max_lives,
        timeline: room.timeline.clone(),
        progress,
        total_numbers: total,
        remaining_numbers: remaining,
        game_events: room.game_events.clone(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::{GameEventPayload, Player, RoomCode};

    // -- Helpers ----------------------------------------------------------

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn room_with_players(max_lives: u32, per_player: u32, count: u64) -> Room {
        let mut room =
            Room::new(RoomCode::new("TEST01"), max_lives, per_player, 0);
        for i in 1..=count {
            room.players.push(Player {
                id: pid(i),
                username: format!("player-{i}"),
                numbers: Vec::new(),
                joined_at: i,
            });
        }
        room.host_id = Some(pid(1));
        room
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0xB11D)
    }

    /// Deals a started room and returns it.
    fn started_room(max_lives: u32, per_player: u32, count: u64) -> Room {
        let mut room = room_with_players(max_lives, per_player, count);
        initialize_game(&mut room, &mut rng()).unwrap();
        room
    }

    /// The number that is currently the global minimum across all hands.
    fn lowest(room: &Room) -> u8 {
        room.players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .min()
            .expect("at least one number in play")
    }

    /// Who holds the given number.
    fn holder(room: &Room, number: u8) -> PlayerId {
        room.players
            .iter()
            .find(|p| p.numbers.contains(&number))
            .expect("someone holds it")
            .id
    }

    fn event(payload: GameEventPayload) -> GameEvent {
        GameEvent {
            payload,
            timestamp: 0,
        }
    }

    // =====================================================================
    // initialize_game()
    // =====================================================================

    #[test]
    fn test_initialize_deals_disjoint_hands_of_requested_size() {
        let room = started_room(3, 6, 2);

        let mut seen = HashSet::new();
        for player in &room.players {
            assert_eq!(player.numbers.len(), 6);
            for &n in &player.numbers {
                assert!((1..=100).contains(&n));
                assert!(seen.insert(n), "number {n} dealt twice");
            }
        }
        assert_eq!(seen.len(), 12);
        assert_eq!(room.state, RoomPhase::Playing);
        assert_eq!(room.lives, 3);
        assert!(room.timeline.is_empty());
    }

    #[test]
    fn test_initialize_sorts_each_hand_ascending() {
        let room = started_room(3, 10, 3);
        for player in &room.players {
            let mut sorted = player.numbers.clone();
            sorted.sort_unstable();
            assert_eq!(player.numbers, sorted);
        }
    }

    #[test]
    fn test_initialize_is_deterministic_for_a_fixed_seed() {
        let mut a = room_with_players(3, 6, 2);
        let mut b = room_with_players(3, 6, 2);
        initialize_game(&mut a, &mut StdRng::seed_from_u64(7)).unwrap();
        initialize_game(&mut b, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.players, b.players);
    }

    #[test]
    fn test_initialize_requires_two_players() {
        let mut room = room_with_players(3, 6, 1);
        let result = initialize_game(&mut room, &mut rng());
        assert!(matches!(result, Err(GameError::Precondition(_))));
        assert_eq!(room.state, RoomPhase::Lobby);
    }

    #[test]
    fn test_initialize_rejects_draw_larger_than_universe() {
        // 6 players * 20 numbers = 120 > 100.
        let mut room = room_with_players(3, 20, 6);
        let result = initialize_game(&mut room, &mut rng());
        assert!(matches!(result, Err(GameError::Precondition(_))));
    }

    #[test]
    fn test_initialize_allows_draw_filling_entire_universe() {
        // 5 players * 20 numbers = exactly 100.
        let mut room = room_with_players(3, 20, 5);
        initialize_game(&mut room, &mut rng()).unwrap();
        assert_eq!(room.total_numbers(), 100);
    }

    #[test]
    fn test_initialize_outside_lobby_is_state_conflict() {
        let mut room = started_room(3, 6, 2);
        let result = initialize_game(&mut room, &mut rng());
        assert!(matches!(result, Err(GameError::StateConflict(_))));
    }

    #[test]
    fn test_initialize_restores_lives_after_previous_session() {
        let mut room = room_with_players(3, 2, 2);
        initialize_game(&mut room, &mut rng()).unwrap();
        room.lives = 1;
        reset_game(&mut room);
        initialize_game(&mut room, &mut rng()).unwrap();
        assert_eq!(room.lives, 3);
    }

    // =====================================================================
    // make_move() — correct moves
    // =====================================================================

    #[test]
    fn test_correct_move_extends_timeline_and_keeps_lives() {
        let mut room = started_room(3, 6, 2);
        let low = lowest(&room);
        let who = holder(&room, low);

        let outcome = make_move(&mut room, who, low).unwrap();

        assert!(outcome.correct);
        assert_eq!(outcome.lives_lost, 0);
        assert!(!outcome.game_over);
        assert!(!outcome.victory);
        assert_eq!(room.timeline, vec![low]);
        assert_eq!(room.lives, 3);
        assert!(!room.player(who).unwrap().numbers.contains(&low));
    }

    #[test]
    fn test_playing_full_sequence_in_order_wins() {
        let mut room = started_room(3, 3, 2);
        let total = room.total_numbers();

        for i in 0..total {
            let low = lowest(&room);
            let who = holder(&room, low);
            let outcome = make_move(&mut room, who, low).unwrap();
            assert!(outcome.correct);
            // Victory lands on the final move itself, not afterwards.
            assert_eq!(outcome.victory, i == total - 1);
        }

        assert_eq!(room.state, RoomPhase::Victory);
        assert_eq!(room.timeline.len(), total);
        assert_eq!(room.lives, 3);
    }

    #[test]
    fn test_timeline_stays_strictly_increasing() {
        let mut room = started_room(2, 4, 3);
        for _ in 0..room.total_numbers() {
            let low = lowest(&room);
            let who = holder(&room, low);
            make_move(&mut room, who, low).unwrap();
        }
        assert!(room.timeline.windows(2).all(|w| w[0] < w[1]));
    }

    // =====================================================================
    // make_move() — incorrect moves
    // =====================================================================

    #[test]
    fn test_incorrect_move_costs_life_and_consumes_number() {
        let mut room = started_room(3, 6, 2);
        // Play the highest number in play — guaranteed out of order
        // (there are at least 12 numbers, so max != min).
        let high = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .max()
            .unwrap();
        let who = holder(&room, high);

        let outcome = make_move(&mut room, who, high).unwrap();

        assert!(!outcome.correct);
        assert_eq!(outcome.lives_lost, 1);
        assert!(!outcome.game_over);
        assert_eq!(room.lives, 2);
        assert!(room.timeline.is_empty());
        // Consumed even though it was wrong — it cannot be replayed.
        assert!(!room.player(who).unwrap().numbers.contains(&high));
        let replay = make_move(&mut room, who, high);
        assert!(matches!(replay, Err(GameError::NotFound(_))));
    }

    #[test]
    fn test_incorrect_move_leaves_other_hands_untouched() {
        let mut room = started_room(3, 6, 2);
        let high = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .max()
            .unwrap();
        let who = holder(&room, high);
        let other_hands: Vec<Vec<u8>> = room
            .players
            .iter()
            .filter(|p| p.id != who)
            .map(|p| p.numbers.clone())
            .collect();

        make_move(&mut room, who, high).unwrap();

        let after: Vec<Vec<u8>> = room
            .players
            .iter()
            .filter(|p| p.id != who)
            .map(|p| p.numbers.clone())
            .collect();
        assert_eq!(other_hands, after);
    }

    #[test]
    fn test_last_life_lost_ends_game_in_defeat() {
        let mut room = started_room(1, 6, 2);
        let high = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .max()
            .unwrap();
        let who = holder(&room, high);

        let outcome = make_move(&mut room, who, high).unwrap();

        assert!(outcome.game_over);
        assert!(!outcome.victory);
        assert_eq!(room.lives, 0);
        assert_eq!(room.state, RoomPhase::GameOver);
    }

    #[test]
    fn test_move_after_game_over_is_state_conflict() {
        let mut room = started_room(1, 6, 2);
        let high = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .max()
            .unwrap();
        let who = holder(&room, high);
        make_move(&mut room, who, high).unwrap();

        let low = lowest(&room);
        let who = holder(&room, low);
        let result = make_move(&mut room, who, low);
        assert!(matches!(result, Err(GameError::StateConflict(_))));
    }

    #[test]
    fn test_move_in_lobby_is_state_conflict() {
        let mut room = room_with_players(3, 6, 2);
        let result = make_move(&mut room, pid(1), 1);
        assert!(matches!(result, Err(GameError::StateConflict(_))));
    }

    #[test]
    fn test_move_by_unknown_player_is_not_found() {
        let mut room = started_room(3, 6, 2);
        let result = make_move(&mut room, pid(99), 1);
        assert!(matches!(result, Err(GameError::NotFound(_))));
    }

    #[test]
    fn test_move_with_unheld_number_is_not_found() {
        let mut room = started_room(3, 6, 2);
        let who = room.players[0].id;
        // Find a number player 0 does NOT hold.
        let unheld = (1..=100)
            .find(|n| !room.player(who).unwrap().numbers.contains(n))
            .unwrap();
        let result = make_move(&mut room, who, unheld);
        assert!(matches!(result, Err(GameError::NotFound(_))));
        // An engine error must not mutate the room.
        assert_eq!(room.lives, 3);
        assert!(room.timeline.is_empty());
    }

    // =====================================================================
    // Conservation invariant
    // =====================================================================

    #[test]
    fn test_no_number_created_or_lost_during_play() {
        let mut room = started_room(5, 5, 2);
        let dealt: HashSet<u8> = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .collect();

        // Alternate correct and incorrect moves for a while.
        for turn in 0..6 {
            let n = if turn % 2 == 0 {
                lowest(&room)
            } else {
                room.players
                    .iter()
                    .flat_map(|p| p.numbers.iter().copied())
                    .max()
                    .unwrap()
            };
            let who = holder(&room, n);
            make_move(&mut room, who, n).unwrap();

            let mut in_play: Vec<u8> = room
                .players
                .iter()
                .flat_map(|p| p.numbers.iter().copied())
                .chain(room.timeline.iter().copied())
                .collect();
            in_play.sort_unstable();
            let mut expected: Vec<u8> = dealt.iter().copied().collect();
            expected.sort_unstable();
            // Consumed-but-wrong numbers leave the hands without joining
            // the timeline, so in_play shrinks only by those.
            assert!(in_play.iter().all(|n| expected.contains(n)));
            assert!(in_play.len() >= expected.len() - (turn / 2 + 1));
        }
    }

    // =====================================================================
    // reset_game()
    // =====================================================================

    #[test]
    fn test_reset_returns_room_to_initial_lobby() {
        let mut room = started_room(3, 6, 2);
        let low = lowest(&room);
        let who = holder(&room, low);
        make_move(&mut room, who, low).unwrap();
        add_game_event(
            &mut room,
            event(GameEventPayload::GameStarted {
                message: "go".into(),
            }),
        );

        reset_game(&mut room);

        assert_eq!(room.state, RoomPhase::Lobby);
        assert_eq!(room.lives, room.max_lives);
        assert!(room.timeline.is_empty());
        assert!(room.game_events.is_empty());
        assert!(room.players.iter().all(|p| p.numbers.is_empty()));
        // Participants survive a reset.
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn test_reset_from_game_over_allows_new_session() {
        let mut room = started_room(1, 6, 2);
        let high = room
            .players
            .iter()
            .flat_map(|p| p.numbers.iter().copied())
            .max()
            .unwrap();
        let who = holder(&room, high);
        make_move(&mut room, who, high).unwrap();
        assert_eq!(room.state, RoomPhase::GameOver);

        reset_game(&mut room);
        initialize_game(&mut room, &mut rng()).unwrap();
        assert_eq!(room.state, RoomPhase::Playing);
        assert_eq!(room.lives, 1);
    }

    // =====================================================================
    // add_game_event()
    // =====================================================================

    #[test]
    fn test_event_log_trims_oldest_beyond_retention() {
        let mut room = room_with_players(3, 6, 2);
        for i in 0..(EVENT_RETENTION + 10) {
            add_game_event(
                &mut room,
                event(GameEventPayload::GameStarted {
                    message: format!("event {i}"),
                }),
            );
        }

        assert_eq!(room.game_events.len(), EVENT_RETENTION);
        // The oldest ten were dropped from the front.
        match &room.game_events[0].payload {
            GameEventPayload::GameStarted { message } => {
                assert_eq!(message, "event 10");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    // =====================================================================
    // game_state()
    // =====================================================================

    #[test]
    fn test_game_state_projection_tracks_progress() {
        let mut room = started_room(3, 3, 2);
        let view = game_state(&room);
        assert_eq!(view.total_numbers, 6);
        assert_eq!(view.progress, 0.0);
        assert_eq!(view.remaining_numbers.len(), 6);

        let low = lowest(&room);
        let who = holder(&room, low);
        make_move(&mut room, who, low).unwrap();

        let view = game_state(&room);
        assert_eq!(view.timeline, vec![low]);
        assert!((view.progress - 1.0 / 6.0).abs() < 1e-9);
        assert_eq!(view.remaining_numbers.len(), 5);
        assert!(!view.remaining_numbers.contains(&low));
    }

    #[test]
    fn test_game_state_remaining_numbers_sorted() {
        let room = started_room(3, 6, 3);
        let view = game_state(&room);
        assert!(view
            .remaining_numbers
            .windows(2)
            .all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_game_state_on_empty_lobby_has_zero_progress() {
        let room = Room::new(RoomCode::new("EMPTY0"), 3, 6, 0);
        let view = game_state(&room);
        assert_eq!(view.progress, 0.0);
        assert_eq!(view.total_numbers, 0);
        assert!(view.remaining_numbers.is_empty());
    }
}

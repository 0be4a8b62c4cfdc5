//! Authoritative state of paired games.

use crate::games::tictactoe::{Board, Mark, Outcome, Position, Square, evaluate};
use crate::presence::{ConnectionId, PlayerKey};
use derive_getters::Getters;
use derive_more::{Display, Error};
use rand::Rng;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Opaque, random 128-bit match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(u128);

impl MatchId {
    /// Wraps a raw token.
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = MoveRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(MoveRejection::UnknownMatch);
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| MoveRejection::UnknownMatch)
    }
}

/// One seat of a match.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MatchPlayer {
    /// Stable player key.
    key: PlayerKey,
    /// Connection the player is seated through.
    connection: ConnectionId,
    /// Mark this player places.
    mark: Mark,
}

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum MatchPhase {
    /// Created, not yet accepting moves.
    Open,
    /// Accepting moves from the on-turn player.
    InProgress,
    /// A line was completed by the given mark.
    Won(Mark),
    /// Board filled without a line.
    Drawn,
    /// Ended by a timeout.
    Abandoned,
}

impl MatchPhase {
    /// Returns true once no further moves can be made.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won(_) | Self::Drawn | Self::Abandoned)
    }
}

/// Why a submitted move was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum MoveRejection {
    /// No live match has that id.
    #[display("Unknown match")]
    UnknownMatch,
    /// The match does not accept moves in its current phase.
    #[display("Match is not in progress")]
    NotInProgress,
    /// The caller is not the player on turn.
    #[display("Not your turn")]
    NotYourTurn,
    /// The cell index is outside 0-8.
    #[display("Cell index out of range")]
    OutOfRange,
    /// The cell already holds a mark.
    #[display("Cell already occupied")]
    Occupied,
}

/// A single paired game.
#[derive(Debug, Clone)]
pub struct Match {
    id: MatchId,
    players: [MatchPlayer; 2],
    board: Board,
    turn: usize,
    phase: MatchPhase,
    generation: u64,
}

impl Match {
    /// Seats two players; `first` (0 or 1) selects who moves first and
    /// therefore holds `X`.
    #[instrument(skip(seats), fields(match_id = %id))]
    pub fn new(id: MatchId, seats: [(PlayerKey, ConnectionId); 2], first: usize) -> Self {
        let first = first % 2;
        let [(key_a, conn_a), (key_b, conn_b)] = seats;
        let mark_for = |seat: usize| if seat == first { Mark::X } else { Mark::O };
        let players = [
            MatchPlayer {
                key: key_a,
                connection: conn_a,
                mark: mark_for(0),
            },
            MatchPlayer {
                key: key_b,
                connection: conn_b,
                mark: mark_for(1),
            },
        ];
        debug!(
            x = %players[first].key,
            o = %players[1 - first].key,
            "Match seated"
        );
        Self {
            id,
            players,
            board: Board::new(),
            turn: first,
            phase: MatchPhase::Open,
            generation: 0,
        }
    }

    /// Opens the match for moves.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn start(&mut self) {
        if self.phase == MatchPhase::Open {
            self.phase = MatchPhase::InProgress;
            info!("Match started");
        }
    }

    /// Returns the match id.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Returns both seats in creation order.
    pub fn players(&self) -> &[MatchPlayer; 2] {
        &self.players
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Index (0 or 1) of the seat whose move is next.
    pub fn turn(&self) -> usize {
        self.turn
    }

    /// Returns the lifecycle phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Liveness token for the currently armed turn timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Player whose move is next.
    pub fn on_turn(&self) -> &MatchPlayer {
        &self.players[self.turn]
    }

    /// Player waiting for the opponent.
    pub fn off_turn(&self) -> &MatchPlayer {
        &self.players[1 - self.turn]
    }

    /// Seat holding the given mark.
    pub fn player_with_mark(&self, mark: Mark) -> &MatchPlayer {
        if self.players[0].mark == mark {
            &self.players[0]
        } else {
            &self.players[1]
        }
    }

    /// Seat of the given connection, if it plays in this match.
    pub fn seat_of(&self, connection: ConnectionId) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| p.connection == connection)
    }

    /// The other seat relative to `connection`.
    pub fn opponent_of(&self, connection: ConnectionId) -> Option<&MatchPlayer> {
        let seat = self.seat_of(connection)?;
        self.players.iter().find(|p| p.connection != seat.connection)
    }

    /// Validates and applies a move by `connection` at wire cell `square`.
    ///
    /// A rejected move leaves the match untouched. An accepted move writes
    /// the on-turn mark, flips the turn, invalidates the armed timer and
    /// moves the phase to `Won` or `Drawn` when the board decides the game.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn play(&mut self, connection: ConnectionId, square: i64) -> Result<Outcome, MoveRejection> {
        if self.phase != MatchPhase::InProgress {
            return Err(MoveRejection::NotInProgress);
        }
        if self.on_turn().connection != connection {
            return Err(MoveRejection::NotYourTurn);
        }
        let pos = Position::try_from(square).map_err(|_| MoveRejection::OutOfRange)?;
        if !self.board.is_empty(pos) {
            return Err(MoveRejection::Occupied);
        }

        let mark = self.on_turn().mark;
        self.board.set(pos, Square::Occupied(mark));
        self.turn = 1 - self.turn;
        self.generation += 1;

        let outcome = evaluate(&self.board);
        match outcome {
            Outcome::Win(mark) => self.phase = MatchPhase::Won(mark),
            Outcome::Draw => self.phase = MatchPhase::Drawn,
            Outcome::None => {}
        }
        debug!(%pos, %mark, ?outcome, "Move applied");
        Ok(outcome)
    }

    /// Ends the match without a result.
    pub fn abandon(&mut self) {
        self.phase = MatchPhase::Abandoned;
        self.generation += 1;
    }
}

/// Registry of live matches.
#[derive(Debug, Default)]
pub struct MatchStore {
    matches: HashMap<MatchId, Match>,
}

impl MatchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a random id that no live match uses.
    #[instrument(skip(self, rng))]
    pub fn allocate_id<R: Rng + ?Sized>(&self, rng: &mut R) -> MatchId {
        loop {
            let id = MatchId(rng.r#gen());
            if !self.matches.contains_key(&id) {
                return id;
            }
            debug!(match_id = %id, "Match id collision, drawing again");
        }
    }

    /// Registers a match.
    pub fn insert(&mut self, game: Match) {
        self.matches.insert(game.id, game);
    }

    /// Looks up a live match.
    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    /// Looks up a live match for mutation.
    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(&id)
    }

    /// Removes a match from the live set.
    pub fn remove(&mut self, id: MatchId) -> Option<Match> {
        self.matches.remove(&id)
    }

    /// Returns true if the id belongs to a live match.
    pub fn contains(&self, id: MatchId) -> bool {
        self.matches.contains_key(&id)
    }

    /// Ids of all live matches.
    pub fn ids(&self) -> Vec<MatchId> {
        self.matches.keys().copied().collect()
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns true when no match is live.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn started(first: usize) -> Match {
        let mut game = Match::new(
            MatchId::from_raw(7),
            [("alice".to_string(), 1), ("bob".to_string(), 2)],
            first,
        );
        game.start();
        game
    }

    #[test]
    fn test_first_mover_holds_x() {
        let game = started(1);
        assert_eq!(game.turn(), 1);
        assert_eq!(*game.on_turn().key(), "bob");
        assert_eq!(*game.on_turn().mark(), Mark::X);
        assert_eq!(*game.off_turn().mark(), Mark::O);
        assert_eq!(game.player_with_mark(Mark::O).key(), "alice");
    }

    #[test]
    fn test_open_match_rejects_moves() {
        let mut game = Match::new(
            MatchId::from_raw(1),
            [("alice".to_string(), 1), ("bob".to_string(), 2)],
            0,
        );
        assert_eq!(game.play(1, 4), Err(MoveRejection::NotInProgress));
        assert_eq!(game.board(), &Board::new());
    }

    #[test]
    fn test_accepted_move_flips_turn_and_bumps_generation() {
        let mut game = started(0);
        assert_eq!(game.play(1, 4), Ok(Outcome::None));
        assert_eq!(game.board().get(Position::Center), Square::Occupied(Mark::X));
        assert_eq!(game.turn(), 1);
        assert_eq!(game.generation(), 1);
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        let mut game = started(0);
        game.play(1, 4).expect("first move");
        let before = game.board().clone();

        assert_eq!(game.play(1, 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(game.play(2, 4), Err(MoveRejection::Occupied));
        assert_eq!(game.play(2, 9), Err(MoveRejection::OutOfRange));
        assert_eq!(game.play(2, -3), Err(MoveRejection::OutOfRange));
        assert_eq!(game.play(99, 0), Err(MoveRejection::NotYourTurn));

        assert_eq!(game.board(), &before);
        assert_eq!(game.turn(), 1);
        assert_eq!(game.generation(), 1);
    }

    #[test]
    fn test_winning_move_ends_match() {
        let mut game = started(0);
        for (conn, cell) in [(1, 0), (2, 3), (1, 1), (2, 4)] {
            assert_eq!(game.play(conn, cell), Ok(Outcome::None));
        }
        assert_eq!(game.play(1, 2), Ok(Outcome::Win(Mark::X)));
        assert_eq!(game.phase(), MatchPhase::Won(Mark::X));
        assert_eq!(game.play(2, 5), Err(MoveRejection::NotInProgress));
    }

    #[test]
    fn test_opponent_lookup() {
        let game = started(0);
        assert_eq!(game.opponent_of(1).map(|p| p.key().as_str()), Some("bob"));
        assert_eq!(game.opponent_of(2).map(|p| p.key().as_str()), Some("alice"));
        assert!(game.opponent_of(3).is_none());
    }

    #[test]
    fn test_abandon_is_terminal() {
        let mut game = started(0);
        assert!(!game.phase().is_terminal());
        let armed = game.generation();
        game.abandon();
        assert!(game.phase().is_terminal());
        assert_ne!(game.generation(), armed);
        assert_eq!(game.play(1, 4), Err(MoveRejection::NotInProgress));
    }

    #[test]
    fn test_match_id_text_round_trip() {
        let id = MatchId::from_raw(0xdead_beef);
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<MatchId>(), Ok(id));
        assert!("not-a-match".parse::<MatchId>().is_err());
    }

    #[test]
    fn test_allocated_ids_are_unique_among_live_matches() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut store = MatchStore::new();
        for _ in 0..64 {
            let id = store.allocate_id(&mut rng);
            assert!(!store.contains(id));
            store.insert(Match::new(id, [("a".into(), 1), ("b".into(), 2)], 0));
        }
        assert_eq!(store.len(), 64);
    }
}

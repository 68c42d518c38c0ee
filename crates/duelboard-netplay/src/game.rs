//! Board state, local move validation and remote state adoption.

use duelboard_netproto::{Board, Cell, GameResult, GameState, PeerId, RuleVariant, Symbol};
use tracing::{debug, warn};

use crate::error::{MoveRejection, NetplayError};
use crate::negotiator::RoleAssignment;
use crate::rules;

/// How an inbound state was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Replaced the local state.
    Applied,
    /// Identical to what we already hold.
    Duplicate,
    /// Reset marker; board cleared.
    Reset,
}

#[derive(Debug, Clone)]
pub struct GameSynchronizer {
    rule: RuleVariant,
    state: GameState,
}

impl GameSynchronizer {
    pub fn new(rule: RuleVariant) -> Self {
        Self {
            rule,
            state: GameState::default(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Turn 0, 2, 4 belong to player 1; odd turns to player 2.
    pub fn is_local_turn(&self, roles: Option<&RoleAssignment>, local: &PeerId) -> bool {
        let Some(roles) = roles else {
            return false;
        };
        !self.state.result.is_terminal() && roles.is_player1(local) == (self.state.turn % 2 == 0)
    }

    /// Apply a move by the local player. On success the returned state is
    /// ready to send.
    pub fn apply_local_move(
        &mut self,
        row: usize,
        col: usize,
        roles: Option<&RoleAssignment>,
        local: &PeerId,
    ) -> Result<GameState, MoveRejection> {
        let roles = roles.ok_or(MoveRejection::RolesUnassigned)?;
        if self.state.result.is_terminal() {
            return Err(MoveRejection::GameFinished);
        }
        let cell = self
            .state
            .board
            .get(row, col)
            .map_err(|_| MoveRejection::OutOfBounds)?;
        if !self.is_local_turn(Some(roles), local) {
            return Err(MoveRejection::NotYourTurn);
        }
        if !cell.is_empty() {
            return Err(MoveRejection::CellOccupied);
        }
        let symbol = roles
            .symbol_of(local)
            .ok_or(MoveRejection::RolesUnassigned)?;

        self.state
            .board
            .set(row, col, Cell::Mark(symbol))
            .map_err(|_| MoveRejection::OutOfBounds)?;
        self.state.turn += 1;
        self.state.result = rules::evaluate(&self.state.board, self.rule);
        self.state.reset = false;
        debug!(row, col, %symbol, turn = self.state.turn, "Local move applied");
        Ok(self.state)
    }

    /// Adopt a state received from the peer.
    ///
    /// Reset markers always apply. Any other state must be internally
    /// consistent, must not step the turn counter back and must not rewrite
    /// a filled cell. A single-step advance must add one mark of
    /// `remote_symbol`, which is `None` until roles are agreed.
    pub fn apply_remote_state(
        &mut self,
        incoming: &GameState,
        remote_symbol: Option<Symbol>,
    ) -> Result<RemoteOutcome, NetplayError> {
        if incoming.reset {
            self.reset();
            return Ok(RemoteOutcome::Reset);
        }
        let Some(remote_symbol) = remote_symbol else {
            return Err(NetplayError::RejectedState(
                "state arrived before roles were agreed".to_string(),
            ));
        };
        check_consistent(incoming)?;

        if incoming.board == self.state.board && incoming.turn == self.state.turn {
            return Ok(RemoteOutcome::Duplicate);
        }
        if self.state.result.is_terminal() {
            return Err(NetplayError::RejectedState(
                "round already finished".to_string(),
            ));
        }
        if incoming.turn <= self.state.turn {
            return Err(NetplayError::RejectedState(format!(
                "turn {} does not advance local turn {}",
                incoming.turn, self.state.turn
            )));
        }
        let overwritten = self
            .state
            .board
            .cells()
            .iter()
            .zip(incoming.board.cells())
            .any(|(old, new)| !old.is_empty() && old != new);
        if overwritten {
            return Err(NetplayError::RejectedState(
                "state overwrites a filled cell".to_string(),
            ));
        }
        if incoming.turn == self.state.turn + 1 {
            let placed = self
                .state
                .board
                .cells()
                .iter()
                .zip(incoming.board.cells())
                .find_map(|(old, new)| if old.is_empty() { new.symbol() } else { None });
            if placed != Some(remote_symbol) {
                return Err(NetplayError::RejectedState(format!(
                    "peer playing {remote_symbol} placed {placed:?}"
                )));
            }
        }

        let result = rules::evaluate(&incoming.board, self.rule);
        if result != incoming.result {
            warn!(
                claimed = ?incoming.result,
                computed = ?result,
                "Peer result disagrees with local evaluation, using local"
            );
        }
        self.state = GameState {
            board: incoming.board,
            turn: incoming.turn,
            result,
            reset: false,
        };
        Ok(RemoteOutcome::Applied)
    }

    pub fn reset(&mut self) {
        self.state = GameState::default();
    }

    pub fn result(&self) -> GameResult {
        self.state.result
    }
}

/// Filled cells match the turn and X leads O by at most one.
fn check_consistent(state: &GameState) -> Result<(), NetplayError> {
    let board: &Board = &state.board;
    let filled = board.filled();
    if filled != state.turn as usize {
        return Err(NetplayError::RejectedState(format!(
            "{filled} filled cells at turn {}",
            state.turn
        )));
    }
    let x = board.count(Symbol::X);
    let o = board.count(Symbol::O);
    if x != o && x != o + 1 {
        return Err(NetplayError::RejectedState(format!(
            "{x} X marks against {o} O marks"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn id(s: &str) -> PeerId {
        PeerId::new(s).unwrap()
    }

    fn roles() -> RoleAssignment {
        RoleAssignment {
            player1: id("a"),
            player2: id("b"),
        }
    }

    #[test]
    fn local_moves_alternate() {
        let r = roles();
        let mut game = GameSynchronizer::new(RuleVariant::Standard);
        assert!(game.is_local_turn(Some(&r), &id("a")));
        assert!(!game.is_local_turn(Some(&r), &id("b")));

        let state = game.apply_local_move(1, 1, Some(&r), &id("a")).unwrap();
        assert_eq!(state.turn, 1);
        assert_eq!(state.board.get(1, 1).unwrap(), Cell::Mark(Symbol::X));
        assert_eq!(
            game.apply_local_move(0, 0, Some(&r), &id("a")),
            Err(MoveRejection::NotYourTurn)
        );
        assert_eq!(
            game.apply_local_move(1, 1, Some(&r), &id("b")),
            Err(MoveRejection::CellOccupied)
        );
        assert_eq!(
            game.apply_local_move(3, 0, Some(&r), &id("b")),
            Err(MoveRejection::OutOfBounds)
        );
        assert_eq!(
            game.apply_local_move(0, 0, None, &id("b")),
            Err(MoveRejection::RolesUnassigned)
        );
        assert_eq!(game.state().turn, 1);
    }

    #[test]
    fn misere_line_ends_round() {
        let r = roles();
        let mut game = GameSynchronizer::new(RuleVariant::Misere);
        for (row, col, who) in [(0, 0, "a"), (1, 0, "b"), (0, 1, "a"), (1, 1, "b"), (0, 2, "a")] {
            game.apply_local_move(row, col, Some(&r), &id(who)).unwrap();
        }
        assert_eq!(game.result(), GameResult::Won(Symbol::O));
        assert!(!game.is_local_turn(Some(&r), &id("b")));
        assert_eq!(
            game.apply_local_move(2, 2, Some(&r), &id("b")),
            Err(MoveRejection::GameFinished)
        );
    }

    #[test]
    fn remote_state_applies_and_dedups() {
        let r = roles();
        let mut mine = GameSynchronizer::new(RuleVariant::Misere);
        let mut theirs = GameSynchronizer::new(RuleVariant::Misere);
        let sent = theirs.apply_local_move(2, 2, Some(&r), &id("a")).unwrap();

        assert_eq!(
            mine.apply_remote_state(&sent, Some(Symbol::X)).unwrap(),
            RemoteOutcome::Applied
        );
        assert_eq!(mine.state().board, sent.board);
        assert_eq!(
            mine.apply_remote_state(&sent, Some(Symbol::X)).unwrap(),
            RemoteOutcome::Duplicate
        );
        assert!(mine.is_local_turn(Some(&r), &id("b")));
    }

    #[test]
    fn remote_state_needs_roles() {
        let mut game = GameSynchronizer::new(RuleVariant::Misere);
        let mut state = GameState::default();
        state.board.set(0, 0, Cell::Mark(Symbol::X)).unwrap();
        state.turn = 1;
        assert!(game.apply_remote_state(&state, None).is_err());
    }

    #[test]
    fn remote_state_rejects_inconsistent_and_stale() {
        let mut game = GameSynchronizer::new(RuleVariant::Misere);

        let mut lying_turn = GameState::default();
        lying_turn.board.set(0, 0, Cell::Mark(Symbol::X)).unwrap();
        lying_turn.turn = 3;
        assert!(game.apply_remote_state(&lying_turn, Some(Symbol::O)).is_err());

        let mut two_x = GameState::default();
        two_x.board.set(0, 0, Cell::Mark(Symbol::X)).unwrap();
        two_x.board.set(0, 1, Cell::Mark(Symbol::X)).unwrap();
        two_x.turn = 2;
        assert!(game.apply_remote_state(&two_x, Some(Symbol::O)).is_err());

        let mut first = GameState::default();
        first.board.set(0, 0, Cell::Mark(Symbol::X)).unwrap();
        first.turn = 1;
        let mut second = first;
        second.board.set(1, 1, Cell::Mark(Symbol::O)).unwrap();
        second.turn = 2;
        game.apply_remote_state(&second, Some(Symbol::O)).unwrap();
        assert!(game.apply_remote_state(&first, Some(Symbol::O)).is_err());
        assert_eq!(game.state().turn, 2);

        let mut rewrite = second;
        rewrite.board.set(0, 0, Cell::Mark(Symbol::O)).unwrap();
        rewrite.board.set(1, 1, Cell::Mark(Symbol::X)).unwrap();
        rewrite.board.set(2, 2, Cell::Mark(Symbol::X)).unwrap();
        rewrite.turn = 3;
        assert!(game.apply_remote_state(&rewrite, Some(Symbol::O)).is_err());
    }

    #[test]
    fn peer_cannot_place_our_symbol() {
        let r = roles();
        let mut mine = GameSynchronizer::new(RuleVariant::Standard);
        let mut forged = GameState::default();
        forged.board.set(1, 1, Cell::Mark(Symbol::X)).unwrap();
        forged.turn = 1;

        // We are player 1 (X); the peer plays O and tries to move for us.
        assert!(matches!(
            mine.apply_remote_state(&forged, Some(Symbol::O)),
            Err(NetplayError::RejectedState(_))
        ));
        assert_eq!(mine.state(), &GameState::default());
        assert!(mine.is_local_turn(Some(&r), &id("a")));
    }

    #[test]
    fn remote_result_is_recomputed() {
        let mut game = GameSynchronizer::new(RuleVariant::Standard);
        let mut state = GameState::default();
        for (i, s) in [Symbol::X, Symbol::O, Symbol::X, Symbol::O, Symbol::X]
            .into_iter()
            .enumerate()
        {
            let (row, col) = [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)][i];
            state.board.set(row, col, Cell::Mark(s)).unwrap();
        }
        state.turn = 5;
        state.result = GameResult::InProgress;
        game.apply_remote_state(&state, Some(Symbol::O)).unwrap();
        assert_eq!(game.result(), GameResult::Won(Symbol::X));
    }

    #[test]
    fn reset_marker_clears() {
        let r = roles();
        let mut game = GameSynchronizer::new(RuleVariant::Misere);
        game.apply_local_move(0, 0, Some(&r), &id("a")).unwrap();
        assert_eq!(
            game.apply_remote_state(&GameState::reset_marker(), None)
                .unwrap(),
            RemoteOutcome::Reset
        );
        assert_eq!(game.state(), &GameState::default());
    }

    proptest! {
        /// Two synchronizers exchanging every state stay identical, keep
        /// filled == turn, and never rewrite a filled cell.
        #[test]
        fn exchanged_moves_keep_boards_in_step(
            picks in proptest::collection::vec((0usize..3, 0usize..3), 1..40),
            rule in prop_oneof![Just(RuleVariant::Standard), Just(RuleVariant::Misere)],
        ) {
            let r = roles();
            let mut a = GameSynchronizer::new(rule);
            let mut b = GameSynchronizer::new(rule);
            for (row, col) in picks {
                let (mover, other, who) = if a.is_local_turn(Some(&r), &id("a")) {
                    (&mut a, &mut b, "a")
                } else {
                    (&mut b, &mut a, "b")
                };
                let mover_symbol = r.symbol_of(&id(who)).unwrap();
                let before = *mover.state();
                match mover.apply_local_move(row, col, Some(&r), &id(who)) {
                    Ok(state) => {
                        prop_assert_eq!(other.apply_remote_state(&state, Some(mover_symbol)).unwrap(), RemoteOutcome::Applied);
                        for (old, new) in before.board.cells().iter().zip(state.board.cells()) {
                            prop_assert!(old.is_empty() || old == new);
                        }
                    }
                    Err(_) => prop_assert_eq!(mover.state(), &before),
                }
                prop_assert_eq!(a.state(), b.state());
                prop_assert_eq!(a.state().board.filled(), a.state().turn as usize);
            }
        }
    }
}

//! Win and draw evaluation.

use duelboard_netproto::{Board, Cell, GameResult, RuleVariant, Symbol};

/// All eight lines as cell indices: three rows, three columns, two diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Symbol owning a completed line, if any.
pub fn completed_line(board: &Board) -> Option<Symbol> {
    let cells = board.cells();
    LINES.iter().find_map(|&[a, b, c]| match cells[a] {
        Cell::Mark(s) if cells[b] == cells[a] && cells[c] == cells[a] => Some(s),
        _ => None,
    })
}

/// Evaluate the board under `rule`.
///
/// Under misère, the symbol that completes a line loses.
pub fn evaluate(board: &Board, rule: RuleVariant) -> GameResult {
    match completed_line(board) {
        Some(s) => match rule {
            RuleVariant::Standard => GameResult::Won(s),
            RuleVariant::Misere => GameResult::Won(s.other()),
        },
        None if board.is_full() => GameResult::Draw,
        None => GameResult::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const E: Cell = Cell::Empty;
    const X: Cell = Cell::Mark(Symbol::X);
    const O: Cell = Cell::Mark(Symbol::O);

    #[test]
    fn top_row_standard_and_misere() {
        let board = Board::from_cells([X, X, X, E, E, E, E, E, E]);
        assert_eq!(
            evaluate(&board, RuleVariant::Standard),
            GameResult::Won(Symbol::X)
        );
        assert_eq!(
            evaluate(&board, RuleVariant::Misere),
            GameResult::Won(Symbol::O)
        );
    }

    #[test]
    fn columns_and_diagonals() {
        let col = Board::from_cells([E, O, E, X, O, E, X, O, E]);
        assert_eq!(completed_line(&col), Some(Symbol::O));

        let anti = Board::from_cells([O, O, X, E, X, E, X, E, E]);
        assert_eq!(completed_line(&anti), Some(Symbol::X));
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let board = Board::from_cells([X, O, X, X, O, O, O, X, X]);
        assert_eq!(evaluate(&board, RuleVariant::Standard), GameResult::Draw);
        assert_eq!(evaluate(&board, RuleVariant::Misere), GameResult::Draw);
    }

    #[test]
    fn full_board_with_line_is_not_draw() {
        let board = Board::from_cells([X, X, X, O, O, X, X, O, O]);
        assert_eq!(
            evaluate(&board, RuleVariant::Standard),
            GameResult::Won(Symbol::X)
        );
    }

    #[test]
    fn open_board_in_progress() {
        let board = Board::from_cells([X, O, E, E, E, E, E, E, E]);
        assert_eq!(
            evaluate(&board, RuleVariant::Misere),
            GameResult::InProgress
        );
    }
}

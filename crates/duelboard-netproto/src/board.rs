//! Board, cell and result types shared by both peers.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::constants::{BOARD_CELLS, BOARD_SIDE};
use crate::error::ProtoError;

/// A player's mark. X always belongs to player 1 and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn other(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

/// One board cell. Encoded as `" "`, `"X"` or `"O"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Cell {
    #[default]
    Empty,
    Mark(Symbol),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }

    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Self::Empty => None,
            Self::Mark(s) => Some(s),
        }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => " ".to_string(),
            Cell::Mark(s) => s.to_string(),
        }
    }
}

impl TryFrom<String> for Cell {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            " " | "" => Ok(Self::Empty),
            "X" => Ok(Self::Mark(Symbol::X)),
            "O" => Ok(Self::Mark(Symbol::O)),
            _ => Err(ProtoError::UnknownCell(value)),
        }
    }
}

/// Outcome of a round. Terminal once it leaves `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GameResult {
    #[default]
    InProgress,
    Won(Symbol),
    Draw,
}

impl GameResult {
    pub fn is_terminal(self) -> bool {
        self != Self::InProgress
    }
}

impl From<GameResult> for String {
    fn from(result: GameResult) -> Self {
        match result {
            GameResult::InProgress => String::new(),
            GameResult::Won(s) => s.to_string(),
            GameResult::Draw => "draw".to_string(),
        }
    }
}

impl TryFrom<String> for GameResult {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(Self::InProgress),
            "X" => Ok(Self::Won(Symbol::X)),
            "O" => Ok(Self::Won(Symbol::O)),
            "draw" => Ok(Self::Draw),
            _ => Err(ProtoError::UnknownResult(value)),
        }
    }
}

/// Row-major 3x3 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Cell; BOARD_CELLS]);

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Cell; BOARD_CELLS]) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.0
    }

    /// Map a (row, col) pair to a cell index.
    pub fn index(row: usize, col: usize) -> Result<usize, ProtoError> {
        if row >= BOARD_SIDE || col >= BOARD_SIDE {
            return Err(ProtoError::IndexOutOfRange { row, col });
        }
        Ok(row * BOARD_SIDE + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Result<Cell, ProtoError> {
        Ok(self.0[Self::index(row, col)?])
    }

    pub fn set(&mut self, row: usize, col: usize, cell: Cell) -> Result<(), ProtoError> {
        self.0[Self::index(row, col)?] = cell;
        Ok(())
    }

    pub fn filled(&self) -> usize {
        self.0.iter().filter(|c| !c.is_empty()).count()
    }

    pub fn count(&self, symbol: Symbol) -> usize {
        self.0
            .iter()
            .filter(|c| c.symbol() == Some(symbol))
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.filled() == BOARD_CELLS
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.0.chunks(BOARD_SIDE)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows().enumerate() {
            if i > 0 {
                writeln!(f, "---+---+---")?;
            }
            let marks: Vec<String> = row.iter().map(|c| String::from(*c)).collect();
            writeln!(f, " {} | {} | {} ", marks[0], marks[1], marks[2])?;
        }
        Ok(())
    }
}

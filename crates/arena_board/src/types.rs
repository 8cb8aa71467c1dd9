//! Core domain types for the board.

use crate::{Move, MoveError, Position};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// A player's mark.
///
/// Serialized as its wire value: `0` for [`Mark::Undefined`], `1` for
/// [`Mark::X`] and `2` for [`Mark::O`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mark {
    /// No mark assigned (before the first round starts).
    #[default]
    #[display("-")]
    Undefined,
    /// Player X (goes first).
    X,
    /// Player O (goes second).
    O,
}

impl Mark {
    /// Returns the opposing mark. `Undefined` has no opponent.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
            Mark::Undefined => Mark::Undefined,
        }
    }

    /// Returns true for `X` and `O`.
    pub fn is_defined(self) -> bool {
        self != Mark::Undefined
    }
}

impl From<Mark> for u8 {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::Undefined => 0,
            Mark::X => 1,
            Mark::O => 2,
        }
    }
}

/// Wire value that does not name a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("Invalid mark value: {}", value)]
pub struct InvalidMark {
    /// The rejected value.
    pub value: u8,
}

impl TryFrom<u8> for Mark {
    type Error = InvalidMark;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mark::Undefined),
            1 => Ok(Mark::X),
            2 => Ok(Mark::O),
            _ => Err(InvalidMark { value }),
        }
    }
}

/// A square on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Square {
    /// Empty square.
    #[default]
    Empty,
    /// Square occupied by a mark.
    Occupied(Mark),
}

impl Square {
    /// Returns the occupying mark, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Square::Empty => None,
            Square::Occupied(mark) => Some(mark),
        }
    }
}

/// 3x3 board.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; 9],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; 9],
        }
    }

    /// Gets the square at the given position.
    pub fn get(&self, pos: Position) -> Square {
        self.squares[pos.to_index()]
    }

    /// Sets the square at the given position.
    pub fn set(&mut self, pos: Position, square: Square) {
        self.squares[pos.to_index()] = square;
    }

    /// Checks if a square is empty.
    pub fn is_empty(&self, pos: Position) -> bool {
        self.get(pos) == Square::Empty
    }

    /// Places a move, refusing occupied squares and undefined marks.
    pub fn place(&mut self, mv: Move) -> Result<(), MoveError> {
        if !mv.mark.is_defined() {
            return Err(MoveError::UndefinedMark);
        }
        if !self.is_empty(mv.position) {
            return Err(MoveError::SquareOccupied(mv.position));
        }
        self.set(mv.position, Square::Occupied(mv.mark));
        Ok(())
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Returns the board as wire cells: `None` for empty, the mark otherwise.
    pub fn cells(&self) -> [Option<Mark>; 9] {
        self.squares.map(Square::mark)
    }

    /// Number of occupied squares.
    pub fn occupied(&self) -> usize {
        self.squares.iter().filter(|s| **s != Square::Empty).count()
    }
}

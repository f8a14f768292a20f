//! Evaluating positions with an external engine
//!
//! The [`Evaluator`] trait is what the rest of the workspace talks to, so tests can stand in for
//! a real engine. [`UciEngine`] implements it on top of a long-lived engine process.

use core::fmt;
use std::{io, time::Duration};

mod uci;

pub use crate::uci::{EngineCommand, UciEngine};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The magnitude every forced mate is collapsed to by [`Score::normalize`]
pub const MATE_SCORE: i32 = 10_000;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to start engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("error communicating with engine: {0}")]
    Io(#[from] io::Error),
    #[error("engine closed its output while we waited for `{0}`")]
    Closed(&'static str),
    #[error("engine protocol violation: {0}")]
    Protocol(String),
}

/// An evaluation, from the perspective of the side to move
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Score {
    /// A material-and-position estimate in hundredths of a pawn
    Centipawns(i32),
    /// A forced mate in the given number of moves
    ///
    /// Positive if the side to move mates, zero or negative if it gets mated.
    Mate(i32),
}

impl Score {
    /// Collapse into a single centipawn-like number
    ///
    /// Mates become [`MATE_SCORE`] with the sign of the side they favor, no matter how far away
    /// they are. Centipawn scores are clamped into the same range so a mate always compares at
    /// least as large.
    pub const fn normalize(self) -> i32 {
        match self {
            Self::Centipawns(cp) => {
                if cp > MATE_SCORE {
                    MATE_SCORE
                } else if cp < -MATE_SCORE {
                    -MATE_SCORE
                } else {
                    cp
                }
            }
            Self::Mate(moves) if moves > 0 => MATE_SCORE,
            Self::Mate(_) => -MATE_SCORE,
        }
    }
}

/// Formatted the way UCI reports it
impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "cp {cp}"),
            Self::Mate(moves) => write!(f, "mate {moves}"),
        }
    }
}

/// Something which can score a position
///
/// Calls block until the score is available. `budget` limits how long the evaluator should
/// think, but it's up to the implementation to honor it.
pub trait Evaluator {
    /// Score the position given in FEN
    fn evaluate(&mut self, fen: &str, budget: Duration) -> Result<Score>;
}

impl<E: Evaluator + ?Sized> Evaluator for &mut E {
    fn evaluate(&mut self, fen: &str, budget: Duration) -> Result<Score> {
        (**self).evaluate(fen, budget)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&mut self, fen: &str, budget: Duration) -> Result<Score> {
        (**self).evaluate(fen, budget)
    }
}

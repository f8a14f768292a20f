//! Replaying the opening moves of recorded games

use games_database::GameRecord;
use shakmaty::{fen::Fen, Chess, EnPassantMode};

use crate::key::PositionKey;

/// The position reached after the opening of a game
#[derive(Clone, Debug)]
pub struct Opening {
    position: Chess,
}

impl Opening {
    /// The fingerprint used to recognize this position again
    pub fn key(&self) -> PositionKey {
        PositionKey::of(&self.position)
    }

    /// The position in FEN, listing an en passant square only if the capture is legal
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }
}

/// Play the first `half_moves` moves of the game from the standard starting position
///
/// Returns `None` if the game doesn't have that many moves, which is an ordinary reason to skip a
/// game rather than an error. Games which started from a custom position, or which contain an
/// illegal move within the opening, are skipped the same way.
pub fn replay_opening(record: &GameRecord, half_moves: usize) -> Option<Opening> {
    if record.custom_start || record.moves.len() < half_moves {
        return None;
    }
    match record.position_after(half_moves) {
        Ok(position) => Some(Opening { position }),
        Err(e) => {
            log::warn!("Skipping game {}: {e}", record.identifier);
            None
        }
    }
}

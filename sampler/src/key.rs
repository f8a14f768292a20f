//! Keys identifying positions for deduplication

use core::fmt;

use shakmaty::{
    zobrist::{Zobrist64, ZobristHash},
    Chess, EnPassantMode,
};

/// A 64-bit fingerprint of a position
///
/// This is the Polyglot Zobrist hash: piece placement, side to move, castling rights, and the
/// en passant square (only when a capture there is legal) each contribute an independent random
/// value. Transpositions get the same key. Different positions can collide, but rarely.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey(pub u64);

impl PositionKey {
    pub fn of(position: &Chess) -> Self {
        let Zobrist64(hash) = position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        Self(hash)
    }
}

impl fmt::Debug for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionKey({:#018x})", self.0)
    }
}

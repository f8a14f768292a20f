//! Deciding which positions are balanced enough to keep

use engine::Score;

/// Whether the score is within `threshold_centipawns` of equal, exclusive
///
/// Mates count as [`engine::MATE_SCORE`] centipawns, so they are only accepted under an absurd
/// threshold.
pub fn is_roughly_equal(score: Score, threshold_centipawns: u32) -> bool {
    score.normalize().unsigned_abs() < threshold_centipawns
}

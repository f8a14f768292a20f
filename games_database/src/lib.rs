//! Reading chess games out of PGN databases
//!
//! Databases can be very large (the Lichess monthly dumps run to many gigabytes), so games are
//! read one at a time instead of all at once.

use std::{
    fs::File,
    io::{self, Read},
    mem,
    path::Path,
};

use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use shakmaty::{Chess, Position};

/// The identifier given to games without a `Site` header
const UNKNOWN_IDENTIFIER: &str = "XXXXXXXX";

/// The entry representing a game in a PGN file
#[non_exhaustive]
#[derive(Clone, Debug, Default)]
pub struct GameRecord {
    /// The moves that were made, in order, skipping any variations
    pub moves: Vec<SanPlus>,
    /// A unique (for Lichess databases) identifier for the game
    ///
    /// This is the last path segment of the `Site` header, or "XXXXXXXX" if there was none.
    pub identifier: String,
    /// Whether the game started from a position given in a `FEN` header
    ///
    /// If so, [`Self::moves`] don't apply to the standard starting position.
    pub custom_start: bool,
}

/// A recorded move which can't be made in the position it was recorded for
#[derive(Debug, thiserror::Error)]
#[error("move {san} (ply {ply}) is illegal")]
pub struct IllegalMove {
    /// How many moves had been made before this one
    pub ply: usize,
    pub san: SanPlus,
}

impl GameRecord {
    /// Make the board after the first `plies` moves, starting from the standard position
    ///
    /// If the game is shorter than that, this is the final position of the game.
    pub fn position_after(&self, plies: usize) -> Result<Chess, IllegalMove> {
        let mut position = Chess::default();
        for (ply, san_plus) in self.moves.iter().take(plies).enumerate() {
            let mv = san_plus.san.to_move(&position).map_err(|_| IllegalMove {
                ply,
                san: san_plus.clone(),
            })?;
            position.play_unchecked(&mv);
        }
        Ok(position)
    }
}

/// Collects a [`GameRecord`] out of the events from the PGN reader
#[derive(Default)]
struct RecordVisitor {
    record: GameRecord,
    identifier: Option<String>,
}

impl Visitor for RecordVisitor {
    type Result = GameRecord;

    fn begin_game(&mut self) {
        self.record = GameRecord::default();
        self.identifier = None;
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        match key {
            b"Site" => {
                let value = String::from_utf8_lossy(value.as_bytes());
                self.identifier = Some(value.rfind('/').map_or_else(
                    || value.to_string(),
                    |idx| value[idx + 1..].to_string(),
                ));
            }
            b"FEN" => self.record.custom_start = true,
            // We don't care about this key
            _ => {}
        }
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.record.moves.push(san_plus);
    }

    fn begin_variation(&mut self) -> Skip {
        // Stay in the mainline
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {
        let mut record = mem::take(&mut self.record);
        record.identifier = self
            .identifier
            .take()
            .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string());
        record
    }
}

/// Only counts games, skipping over their moves
struct CountingVisitor;

impl Visitor for CountingVisitor {
    type Result = ();

    fn end_headers(&mut self) -> Skip {
        Skip(true)
    }

    fn end_game(&mut self) -> Self::Result {}
}

/// Reads games one at a time out of PGN text
pub struct GameReader<R> {
    inner: BufferedReader<R>,
    visitor: RecordVisitor,
}

impl<R: Read> GameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufferedReader::new(reader),
            visitor: RecordVisitor::default(),
        }
    }

    /// Read the next game, or `None` if there are no games left
    pub fn read_game(&mut self) -> io::Result<Option<GameRecord>> {
        self.inner.read_game(&mut self.visitor)
    }
}

impl<R: Read> Iterator for GameReader<R> {
    type Item = io::Result<GameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_game().transpose()
    }
}

/// Open the PGN database at the given path
///
/// Files ending in `.zst` are decompressed as they are read.
pub fn open_database(path: impl AsRef<Path>) -> io::Result<Box<dyn Read>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "zst") {
        Ok(Box::new(zstd::Decoder::new(file)?))
    } else {
        Ok(Box::new(file))
    }
}

/// Count the games in PGN text without looking at their moves
pub fn count_games(reader: impl Read) -> io::Result<u64> {
    let mut reader = BufferedReader::new(reader);
    let mut count = 0;
    while reader.read_game(&mut CountingVisitor)?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use shakmaty::{fen::Fen, EnPassantMode};

    const SAMPLE_PGN: &str = r#"[Event "Rated Blitz game"]
[Site "https://lichess.org/j1dkb5dw"]
[White "BFG9k"]
[Black "mamalak"]
[Result "1-0"]
[Opening "French Defense: Normal Variation"]

1. e4 e6 2. d4 b6 3. a3 Bb7 4. Nc3 Nh6 5. Bxh6 gxh6 6. Be2 Qg5 7. Bg4 h5 8. Nf3 Qg6 9. Nh4 Qg5 10. Bxh5 Qxh4 11. Qf3 Kd8 12. Qxf7 Nc6 13. Qe8# 1-0

[Event "Casual game"]
[Result "*"]

1. d4 { a comment } d5 2. c4 (2. Nf3 Nf6) 2... e6 3. Nc3!? Nf6?! *

[Event "Endgame study"]
[SetUp "1"]
[FEN "8/8/8/8/8/8/4K3/4k3 w - - 0 1"]
[Result "1/2-1/2"]

1. Kd3 Kd1 1/2-1/2
"#;

    fn sample_games() -> Vec<GameRecord> {
        GameReader::new(SAMPLE_PGN.as_bytes())
            .collect::<io::Result<Vec<_>>>()
            .expect("Failed to read sample games")
    }

    fn fen_of(position: &Chess) -> String {
        Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
    }

    #[test]
    fn test_reads_games_in_order() {
        let games = sample_games();
        assert_eq!(games.len(), 3);

        assert_eq!(games[0].identifier, "j1dkb5dw");
        assert_eq!(games[0].moves.len(), 25);
        assert!(!games[0].custom_start);
        assert_eq!(games[0].moves[0].to_string(), "e4");
        assert_eq!(games[0].moves[24].to_string(), "Qe8#");

        assert_eq!(games[1].identifier, UNKNOWN_IDENTIFIER);
        let moves = games[1]
            .moves
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(moves, ["d4", "d5", "c4", "e6", "Nc3", "Nf6"]);

        assert!(games[2].custom_start);
    }

    #[test]
    fn test_position_after_prefix() {
        let games = sample_games();
        let position = games[1].position_after(4).expect("Moves should be legal");
        assert_eq!(
            fen_of(&position),
            "rnbqkbnr/ppp2ppp/4p3/3p4/2PP4/8/PP2PPPP/RNBQKBNR w KQkq - 0 3"
        );
        // Asking for more moves than were played stops at the end of the game
        let position = games[1].position_after(100).expect("Moves should be legal");
        assert_eq!(
            fen_of(&position),
            "rnbqkb1r/ppp2ppp/4pn2/3p4/2PP4/2N5/PP2PPPP/R1BQKBNR w KQkq - 2 4"
        );
    }

    #[test]
    fn test_illegal_move_reported() {
        let pgn = "1. e4 e5 2. Ke3 Nc6 *\n";
        let game = GameReader::new(pgn.as_bytes())
            .read_game()
            .expect("Failed to read game")
            .expect("Expected a game");
        assert!(game.position_after(2).is_ok());
        let error = game.position_after(4).expect_err("Ke3 is not legal");
        assert_eq!(error.ply, 2);
        assert_eq!(error.san.to_string(), "Ke3");
    }

    #[test]
    fn test_count_games() {
        assert_eq!(count_games(SAMPLE_PGN.as_bytes()).expect("Failed to count"), 3);
        assert_eq!(count_games(&b""[..]).expect("Failed to count"), 0);
    }

    #[test]
    fn test_open_compressed_database() {
        let compressed =
            zstd::encode_all(SAMPLE_PGN.as_bytes(), 0).expect("Failed to compress sample");
        let mut file = tempfile::Builder::new()
            .suffix(".pgn.zst")
            .tempfile()
            .expect("Failed to create temporary file");
        file.write_all(&compressed).expect("Failed to write sample");
        file.flush().expect("Failed to flush sample");

        let games = GameReader::new(open_database(file.path()).expect("Failed to open"))
            .collect::<io::Result<Vec<_>>>()
            .expect("Failed to read games");
        assert_eq!(games.len(), 3);
        assert_eq!(games[0].identifier, "j1dkb5dw");
    }

    #[test]
    fn test_open_plain_database() {
        let mut file = tempfile::Builder::new()
            .suffix(".pgn")
            .tempfile()
            .expect("Failed to create temporary file");
        file.write_all(SAMPLE_PGN.as_bytes())
            .expect("Failed to write sample");
        file.flush().expect("Failed to flush sample");

        let reader = open_database(file.path()).expect("Failed to open");
        assert_eq!(count_games(reader).expect("Failed to count"), 3);
    }
}

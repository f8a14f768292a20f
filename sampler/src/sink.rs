//! Collecting accepted positions and writing them out

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

/// The accepted positions, in FEN, in the order they were accepted
#[derive(Clone, Debug, Default)]
pub struct SampleSet {
    fens: Vec<String>,
    /// How many positions we want, or `None` for as many as possible
    quota: Option<NonZeroUsize>,
}

impl SampleSet {
    pub fn new(quota: Option<NonZeroUsize>) -> Self {
        Self {
            fens: Vec::with_capacity(quota.map_or(0, NonZeroUsize::get)),
            quota,
        }
    }

    /// Add an accepted position
    pub fn push(&mut self, fen: String) {
        debug_assert!(!self.is_full(), "sample set grew past its quota");
        self.fens.push(fen);
    }

    pub fn len(&self) -> usize {
        self.fens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fens.is_empty()
    }

    /// Whether the quota has been reached
    ///
    /// Never true without a quota.
    pub fn is_full(&self) -> bool {
        self.quota.is_some_and(|quota| self.fens.len() >= quota.get())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fens.iter().map(String::as_str)
    }
}

/// Writes the samples to a file, one FEN per line
#[derive(Clone, Debug)]
pub struct FenSink {
    path: PathBuf,
}

impl FenSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file's contents with the given samples
    pub fn write(&self, samples: &SampleSet) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        for fen in samples.iter() {
            writeln!(writer, "{fen}")?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const E4_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    #[test]
    fn test_quota_fills() {
        let mut samples = SampleSet::new(NonZeroUsize::new(2));
        assert!(!samples.is_full());
        samples.push(START_FEN.to_string());
        assert!(!samples.is_full());
        samples.push(E4_FEN.to_string());
        assert!(samples.is_full());
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_no_quota_never_full() {
        let mut samples = SampleSet::new(None);
        for _ in 0..1000 {
            samples.push(START_FEN.to_string());
        }
        assert!(!samples.is_full());
    }

    #[test]
    fn test_write_overwrites() {
        let dir = tempfile::tempdir().expect("Failed to make temporary directory");
        let sink = FenSink::new(dir.path().join("openings.txt"));
        fs::write(sink.path(), "stale contents\nfrom an earlier run\nand more\n")
            .expect("Failed to write stale file");

        let mut samples = SampleSet::new(None);
        samples.push(START_FEN.to_string());
        samples.push(E4_FEN.to_string());
        sink.write(&samples).expect("Failed to write samples");

        let written = fs::read_to_string(sink.path()).expect("Failed to read samples");
        assert_eq!(written, format!("{START_FEN}\n{E4_FEN}\n"));
    }

    #[test]
    fn test_write_empty() {
        let dir = tempfile::tempdir().expect("Failed to make temporary directory");
        let sink = FenSink::new(dir.path().join("openings.txt"));
        sink.write(&SampleSet::default()).expect("Failed to write samples");
        assert_eq!(fs::read_to_string(sink.path()).expect("Failed to read"), "");
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().expect("Failed to make temporary directory");
        let sink = FenSink::new(dir.path().join("missing").join("openings.txt"));
        assert!(sink.write(&SampleSet::default()).is_err());
    }
}

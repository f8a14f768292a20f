//! Sampling balanced opening positions out of game databases
//!
//! Each game is replayed for a fixed number of half-moves. Positions that haven't been seen yet
//! are scored by an [`engine::Evaluator`], and the ones close enough to equal are kept until a
//! quota is filled or the games run out. The kept positions are written once at the end, one FEN
//! per line.

use std::{io, path::PathBuf};

pub mod accept;
pub mod cli;
pub mod collector;
pub mod key;
pub mod progress_log;
pub mod replay;
pub mod sink;

pub use crate::{
    collector::{RunStats, RunSummary, Sampler, SamplerConfig, Termination},
    key::PositionKey,
    sink::{FenSink, SampleSet},
};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The errors which end a run early
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("engine failed")]
    Oracle(#[from] engine::Error),
    #[error("failed to open database {}", path.display())]
    OpenDatabase {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write positions to {}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install signal handler")]
    Signal(#[source] io::Error),
}

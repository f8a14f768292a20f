//! Command-line arguments for `extract-openings`

use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use bloom::ProbeScheme;
use clap::{Parser, ValueEnum};
use engine::EngineCommand;

use crate::collector::SamplerConfig;

/// The most games the duplicate filter can be sized for
///
/// Keeps the filter's bit count far from overflowing at any false positive rate.
pub const MAX_EXPECTED_GAMES: usize = 1_000_000_000;

/// Extract roughly balanced opening positions from a database of games
#[derive(Debug, Parser)]
#[command(name = "extract-openings", version)]
pub struct Cli {
    /// The PGN database to read (`.pgn`, or `.pgn.zst` for compressed)
    #[arg(value_name = "DATABASE")]
    pub database: PathBuf,

    /// Where to write the accepted positions, one FEN per line
    #[arg(short, long, default_value = "../openings.txt")]
    pub output: PathBuf,

    /// How many half-moves into each game to sample
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(u32).range(1..))]
    pub half_moves: u32,

    /// Reject positions evaluated at this many centipawns or more for either side
    #[arg(long, value_name = "CP", default_value_t = 75, value_parser = clap::value_parser!(u32).range(1..))]
    pub threshold: u32,

    /// How long the engine thinks about each position, in seconds
    #[arg(long, value_name = "SECONDS", default_value = "0.01", value_parser = parse_time_budget)]
    pub time_budget: Duration,

    /// Stop after accepting this many positions (0 reads the whole database)
    #[arg(short = 'n', long, default_value_t = 4096)]
    pub quota: usize,

    /// How many games the database holds, used to size the duplicate filter
    ///
    /// Counted with an extra pass over the database if not given.
    #[arg(long, value_name = "N", value_parser = parse_expected_games)]
    pub expected_games: Option<usize>,

    /// Target rate at which new positions are mistaken for duplicates
    #[arg(long, value_name = "P", default_value_t = 0.1, value_parser = parse_probability)]
    pub false_positive_rate: f64,

    /// How the duplicate filter derives its probes from a position key
    #[arg(long, value_enum, default_value_t = ProbeSchemeArg::Rehash)]
    pub probe_scheme: ProbeSchemeArg,

    /// The UCI engine to evaluate positions with
    #[arg(long, value_name = "PATH", default_value = "stockfish")]
    pub engine: PathBuf,

    /// An extra argument to launch the engine with (repeatable)
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// A UCI option to set on the engine before use (repeatable)
    #[arg(long = "engine-option", value_name = "NAME=VALUE", value_parser = parse_engine_option)]
    pub engine_options: Vec<(String, String)>,

    /// Don't draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProbeSchemeArg {
    /// Mix the key with a different seed for each probe
    Rehash,
    /// Use successive remainders of the key (needs wide keys)
    Quotient,
}

impl From<ProbeSchemeArg> for ProbeScheme {
    fn from(arg: ProbeSchemeArg) -> Self {
        match arg {
            ProbeSchemeArg::Rehash => Self::Rehash,
            ProbeSchemeArg::Quotient => Self::Quotient,
        }
    }
}

impl Cli {
    /// The sampler settings, with the filter sized for `expected_games`
    pub fn sampler_config(&self, expected_games: usize) -> SamplerConfig {
        SamplerConfig {
            half_moves: self.half_moves as usize,
            threshold: self.threshold,
            time_budget: self.time_budget,
            quota: NonZeroUsize::new(self.quota),
            expected_games,
            false_positive_rate: self.false_positive_rate,
            probe_scheme: self.probe_scheme.into(),
        }
    }

    pub fn engine_command(&self) -> EngineCommand {
        self.engine_options.iter().fold(
            EngineCommand::new(&self.engine).args(&self.engine_args),
            |command, (name, value)| command.option(name, value),
        )
    }
}

fn parse_time_budget(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if seconds.is_nan() || seconds <= 0. {
        return Err(format!("time budget must be positive, got {s}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

fn parse_expected_games(s: &str) -> Result<usize, String> {
    let games: usize = s.parse().map_err(|e| format!("{e}"))?;
    if games <= MAX_EXPECTED_GAMES {
        Ok(games)
    } else {
        Err(format!("at most {MAX_EXPECTED_GAMES} games are supported, got {s}"))
    }
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if p > 0. && p < 1. {
        Ok(p)
    } else {
        Err(format!("must be strictly between 0 and 1, got {s}"))
    }
}

fn parse_engine_option(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got `{s}`")),
    }
}

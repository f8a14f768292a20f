//! The loop pulling games through replay, deduplication, and evaluation

use core::fmt;
use std::{
    io,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bloom::{BloomFilter, ProbeScheme};
use engine::Evaluator;
use games_database::GameRecord;
use indicatif::ProgressBar;

use crate::{
    accept::is_roughly_equal,
    replay::replay_opening,
    sink::{FenSink, SampleSet},
    Error, Result,
};

/// Everything that controls which positions a run keeps
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// How many half-moves into each game to sample
    pub half_moves: usize,
    /// Positions scoring this many centipawns or more for either side are rejected
    pub threshold: u32,
    /// How long the engine gets to think about each position
    pub time_budget: Duration,
    /// Stop after accepting this many positions, or never if `None`
    pub quota: Option<NonZeroUsize>,
    /// How many games the duplicate filter is sized for
    pub expected_games: usize,
    pub false_positive_rate: f64,
    pub probe_scheme: ProbeScheme,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            half_moves: 12,
            threshold: 75,
            time_budget: Duration::from_millis(10),
            quota: NonZeroUsize::new(4096),
            expected_games: 179_550,
            false_positive_rate: 0.1,
            probe_scheme: ProbeScheme::Rehash,
        }
    }
}

/// Why a run stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The quota of accepted positions was filled
    QuotaReached,
    /// There were no more games to read
    InputExhausted,
    /// We were asked to stop early
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QuotaReached => "quota reached",
            Self::InputExhausted => "input exhausted",
            Self::Interrupted => "interrupted",
        })
    }
}

/// Counts of what happened to the games read during a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub records_read: u64,
    /// Games without enough usable moves to reach the sampled depth
    pub too_short: u64,
    /// Games whose opening position had (probably) been seen already
    pub duplicates: u64,
    pub evaluations: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// The outcome of a finished run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub termination: Termination,
    pub stats: RunStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let RunStats {
            records_read,
            too_short,
            duplicates,
            evaluations,
            accepted,
            rejected,
        } = self.stats;
        write!(
            f,
            "{}: read {records_read} games ({too_short} too short, {duplicates} duplicates), \
             evaluated {evaluations}, accepted {accepted}, rejected {rejected}",
            self.termination
        )
    }
}

/// What became of a single game
#[derive(Clone, Copy, Debug)]
enum Outcome {
    TooShort,
    Duplicate,
    Accepted,
    Rejected,
}

/// The state one run owns and mutates
struct RunContext {
    filter: BloomFilter,
    samples: SampleSet,
    stats: RunStats,
}

/// Pulls balanced opening positions out of a stream of games
///
/// The evaluator is owned for the whole run and dropped once the run ends, whether it finished
/// normally or failed.
pub struct Sampler<E> {
    config: SamplerConfig,
    evaluator: E,
    sink: FenSink,
    progress: ProgressBar,
    stop: Arc<AtomicBool>,
}

impl<E: Evaluator> Sampler<E> {
    pub fn new(config: SamplerConfig, evaluator: E, sink: FenSink) -> Self {
        Self {
            config,
            evaluator,
            sink,
            progress: ProgressBar::hidden(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report progress on this bar, one tick per game read
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Stop reading games once this flag is set
    ///
    /// The samples accepted so far are still written out.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Run until the quota is filled, the games run out, or the stop flag is set, then write the
    /// accepted positions to the sink
    ///
    /// A failure to read a game is treated the same as running out of games. Evaluator failures
    /// and failing to write the output abort the run.
    ///
    /// # Panics
    ///
    /// If the configured false positive rate isn't strictly between 0 and 1.
    pub fn run<I>(mut self, games: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = io::Result<GameRecord>>,
    {
        let filter = BloomFilter::with_scheme(
            self.config.expected_games,
            self.config.false_positive_rate,
            self.config.probe_scheme,
        );
        log::info!(
            "Duplicate filter: {} bits, {} probes ({:?}) for {} games at {} false positive rate",
            filter.num_bits(),
            filter.num_probes(),
            filter.scheme(),
            self.config.expected_games,
            self.config.false_positive_rate,
        );
        if filter.scheme() == ProbeScheme::Quotient && filter.required_entropy_bits() > 64. {
            log::warn!(
                "Quotient probes need {:.1} bits of key entropy but keys only have 64, so \
                 duplicate detection will be less accurate than configured",
                filter.required_entropy_bits(),
            );
        }
        let mut ctx = RunContext {
            filter,
            samples: SampleSet::new(self.config.quota),
            stats: RunStats::default(),
        };

        let mut games = games.into_iter();
        let termination = loop {
            if self.stop.load(Ordering::Relaxed) {
                break Termination::Interrupted;
            }
            let record = match games.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    log::warn!("Failed to read game, treating as end of input: {e}");
                    break Termination::InputExhausted;
                }
                None => break Termination::InputExhausted,
            };
            ctx.stats.records_read += 1;
            let outcome = match self.process(&mut ctx, &record) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.progress.finish_and_clear();
                    return Err(e);
                }
            };
            log::debug!("Game {}: {outcome:?}", record.identifier);
            self.progress.inc(1);
            self.progress
                .set_message(format!("{} accepted", ctx.stats.accepted));
            if ctx.samples.is_full() {
                break Termination::QuotaReached;
            }
        };
        self.progress.finish_and_clear();
        log::info!(
            "Duplicate filter saw {} positions, estimated false positive rate now {:.4}",
            ctx.filter.len(),
            ctx.filter.estimated_false_positive_rate(),
        );

        self.sink
            .write(&ctx.samples)
            .map_err(|source| Error::WriteOutput {
                path: self.sink.path().to_path_buf(),
                source,
            })?;
        log::info!(
            "Wrote {} positions to {}",
            ctx.samples.len(),
            self.sink.path().display()
        );
        Ok(RunSummary {
            termination,
            stats: ctx.stats,
        })
    }

    fn process(&mut self, ctx: &mut RunContext, record: &GameRecord) -> Result<Outcome> {
        let Some(opening) = replay_opening(record, self.config.half_moves) else {
            ctx.stats.too_short += 1;
            return Ok(Outcome::TooShort);
        };
        let key = opening.key();
        if ctx.filter.contains(key.0) {
            ctx.stats.duplicates += 1;
            return Ok(Outcome::Duplicate);
        }
        ctx.filter.add(key.0);

        let fen = opening.fen();
        let score = self.evaluator.evaluate(&fen, self.config.time_budget)?;
        ctx.stats.evaluations += 1;
        if is_roughly_equal(score, self.config.threshold) {
            log::debug!("Accepted {fen} ({score})");
            ctx.samples.push(fen);
            ctx.stats.accepted += 1;
            Ok(Outcome::Accepted)
        } else {
            log::debug!("Rejected {fen} ({score})");
            ctx.stats.rejected += 1;
            Ok(Outcome::Rejected)
        }
    }
}

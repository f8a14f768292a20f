//! Extract roughly balanced opening positions from a PGN database

use std::{
    error::Error as _,
    process::ExitCode,
    sync::{atomic::AtomicBool, Arc},
};

use clap::Parser;
use games_database::{count_games, open_database, GameReader};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sampler::{
    cli::{Cli, MAX_EXPECTED_GAMES},
    progress_log::ProgressLogger,
    Error, FenSink, RunSummary, Sampler,
};
use signal_hook::consts::{SIGINT, SIGTERM};

fn main() -> ExitCode {
    // Stays hidden until the run starts
    let progress = ProgressBar::hidden();
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    if let Err(e) = ProgressLogger::new(logger, progress.clone()).init() {
        eprintln!("Failed to set up logging: {e}");
    }
    let cli = Cli::parse();
    match run(&cli, progress) {
        Ok(summary) => {
            log::info!("Done, {summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            let mut source = e.source();
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, progress: ProgressBar) -> sampler::Result<RunSummary> {
    // The first signal stops after the current game, a second one exits immediately
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&stop))
            .map_err(Error::Signal)?;
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(Error::Signal)?;
    }

    let open = || {
        open_database(&cli.database).map_err(|source| Error::OpenDatabase {
            path: cli.database.clone(),
            source,
        })
    };
    let expected_games = match cli.expected_games {
        Some(expected_games) => expected_games,
        None => {
            log::info!("Counting games in {}", cli.database.display());
            let count = count_games(open()?).map_err(|source| Error::OpenDatabase {
                path: cli.database.clone(),
                source,
            })?;
            log::info!("Found {count} games");
            usize::try_from(count)
                .map_or(MAX_EXPECTED_GAMES, |count| count.min(MAX_EXPECTED_GAMES))
        }
    };
    let config = cli.sampler_config(expected_games);
    log::info!(
        "Sampling after {} half-moves, keeping scores under {}cp with {:?} per position, quota {}",
        config.half_moves,
        config.threshold,
        config.time_budget,
        config.quota.map_or_else(|| "unlimited".to_string(), |q| q.to_string()),
    );

    let engine = cli.engine_command().spawn()?;
    log::info!(
        "Evaluating with {}",
        engine.name().unwrap_or("an unnamed engine")
    );

    progress.set_length(expected_games as u64);
    if !cli.no_progress {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}",
        )
        .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("=> "));
        progress.set_style(style);
        progress.set_draw_target(ProgressDrawTarget::stderr());
    }

    Sampler::new(config, engine, FenSink::new(&cli.output))
        .with_progress(progress)
        .with_stop_flag(stop)
        .run(GameReader::new(open()?))
}

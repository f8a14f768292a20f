//! A client for engines speaking the Universal Chess Interface

use std::{
    ffi::OsString,
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::{Error, Evaluator, Result, Score};

/// How long a dropped engine gets to exit on its own after `quit` before it's killed
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// How to launch an engine, and which options to set on it
#[derive(Clone, Debug)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
    /// Sent as `setoption` commands, in order, before the engine is used
    options: Vec<(String, String)>,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    /// Launch the engine and wait until it's ready
    pub fn spawn(&self) -> Result<UciEngine> {
        UciEngine::spawn(self)
    }
}

/// A running engine process
///
/// The process lives as long as this value does: dropping it asks the engine to quit and kills
/// it if it doesn't.
#[derive(Debug)]
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// The name the engine reported during the handshake
    name: Option<String>,
}

impl UciEngine {
    /// Launch the engine, set its options, and wait until it's ready
    pub fn spawn(command: &EngineCommand) -> Result<Self> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Keep terminal signals meant for us away from the engine
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut process, 0);
        let mut child = process.spawn().map_err(|source| Error::Spawn {
            program: command.program.display().to_string(),
            source,
        })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Closed("pipes"));
        };
        let mut engine = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            name: None,
        };
        engine.handshake(&command.options)?;
        log::debug!(
            "Engine `{}` ready (pid {})",
            engine.name().unwrap_or("unnamed"),
            engine.child.id(),
        );
        Ok(engine)
    }

    /// The name the engine gave for itself, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn handshake(&mut self, options: &[(String, String)]) -> Result<()> {
        self.send("uci")?;
        loop {
            let line = self.read_line("uciok")?;
            if let Some(name) = line.strip_prefix("id name ") {
                self.name = Some(name.trim().to_string());
            } else if line.trim() == "uciok" {
                break;
            }
        }
        for (name, value) in options {
            self.send(&format!("setoption name {name} value {value}"))?;
        }
        self.sync()?;
        self.send("ucinewgame")?;
        self.sync()
    }

    /// Wait until the engine has processed everything sent so far
    fn sync(&mut self) -> Result<()> {
        self.send("isready")?;
        while self.read_line("readyok")?.trim() != "readyok" {}
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        log::trace!("> {command}");
        writeln!(self.stdin, "{command}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Read one line of output, failing if the engine has gone away
    fn read_line(&mut self, waiting_for: &'static str) -> Result<String> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(Error::Closed(waiting_for));
        }
        let line = line.trim_end();
        log::trace!("< {line}");
        Ok(line.to_string())
    }
}

impl Evaluator for UciEngine {
    /// Search the position for `budget` and report the final principal-variation score
    ///
    /// The budget is passed as `go movetime`, so an engine that overruns it will make this call
    /// take longer; nothing here cuts it off.
    fn evaluate(&mut self, fen: &str, budget: Duration) -> Result<Score> {
        let millis = budget.as_micros().div_ceil(1000).max(1);
        self.send(&format!("position fen {fen}"))?;
        self.send(&format!("go movetime {millis}"))?;
        let mut score = None;
        loop {
            let line = self.read_line("bestmove")?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("info") => {
                    if let Some(reported) = parse_info_score(tokens) {
                        score = Some(reported);
                    }
                }
                Some("bestmove") => break,
                _ => {}
            }
        }
        score.ok_or_else(|| Error::Protocol(format!("no score reported for `{fen}`")))
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.send("quit");
        let deadline = Instant::now() + QUIT_GRACE;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(_) => break,
            }
        }
        log::debug!("Engine did not quit in time, killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Pull the score out of the tokens following `info`
///
/// Only scores for the first principal variation count. `info string` lines carry free text and
/// never have a score.
fn parse_info_score<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<Score> {
    let mut score = None;
    let mut multipv = 1;
    while let Some(token) = tokens.next() {
        match token {
            "string" | "pv" => break,
            "multipv" => multipv = tokens.next()?.parse().ok()?,
            "score" => {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                score = match kind {
                    "cp" => Some(Score::Centipawns(value)),
                    "mate" => Some(Score::Mate(value)),
                    _ => return None,
                };
            }
            _ => {}
        }
    }
    score.filter(|_| multipv == 1)
}

//! Logging that doesn't tear through the progress bar

use indicatif::ProgressBar;
use log::{Log, Metadata, Record, SetLoggerError};

/// Hides the progress bar while each line is written, then redraws it
pub struct ProgressLogger {
    inner: env_logger::Logger,
    progress: ProgressBar,
}

impl ProgressLogger {
    pub fn new(inner: env_logger::Logger, progress: ProgressBar) -> Self {
        Self { inner, progress }
    }

    /// Install as the global logger, keeping the inner logger's level filter
    pub fn init(self) -> Result<(), SetLoggerError> {
        let filter = self.inner.filter();
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(filter);
        Ok(())
    }
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if self.inner.matches(record) {
            self.progress.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

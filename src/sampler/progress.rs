//! Progress reporting for sampling runs.
//!
//! The sampler emits events; frontends decide how to surface them.

use crate::models::Identifier;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Receives sampling progress events.
pub trait Progress {
    /// Called once with the number of rounds about to run.
    fn begin(&mut self, _total: u64) {}

    /// Called after each round, with its 1-based index and identifiers.
    fn round_done(&mut self, _index: u64, _ids: &[Identifier]) {}

    /// Called at the end of a completed run.
    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;

impl Progress for NullProgress {}

/// Terminal progress bar.
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Progress for BarProgress {
    fn begin(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rounds ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        self.bar = Some(bar);
    }

    fn round_done(&mut self, index: u64, _ids: &[Identifier]) {
        if let Some(ref bar) = self.bar {
            bar.set_position(index);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Logs a line every `every` rounds.
pub struct LogProgress {
    every: u64,
    total: u64,
}

impl LogProgress {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            total: 0,
        }
    }
}

impl Progress for LogProgress {
    fn begin(&mut self, total: u64) {
        self.total = total;
    }

    fn round_done(&mut self, index: u64, _ids: &[Identifier]) {
        if index % self.every == 0 {
            info!("Completed round {}/{}", index, self.total);
        }
    }

    fn finish(&mut self) {
        info!("Finished {} rounds", self.total);
    }
}

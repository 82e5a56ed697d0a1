//! A pausable stopwatch for reporting how long the build and lookups take.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopwatchState {
    Running,
    Paused,
}

/// Wall-clock timer that can be paused and resumed.
///
/// Time spent paused does not count towards [`total_runtime`](Self::total_runtime).
#[derive(Debug, Clone)]
pub struct Stopwatch {
    /// Runtime banked by earlier running segments
    banked: Duration,

    /// Start of the current running segment; `None` while paused
    segment_start: Option<Instant>,
}

impl Stopwatch {
    /// Create a stopwatch that is already running.
    pub fn new() -> Self {
        Self {
            banked: Duration::ZERO,
            segment_start: Some(Instant::now()),
        }
    }

    pub fn state(&self) -> StopwatchState {
        match self.segment_start {
            Some(_) => StopwatchState::Running,
            None => StopwatchState::Paused,
        }
    }

    /// Stop counting. Pausing a paused stopwatch does nothing.
    pub fn pause(&mut self) {
        if let Some(start) = self.segment_start.take() {
            self.banked += start.elapsed();
        }
    }

    /// Continue counting. Resuming a running stopwatch does nothing.
    pub fn resume(&mut self) {
        if self.segment_start.is_none() {
            self.segment_start = Some(Instant::now());
        }
    }

    /// Zero the stopwatch and start it running.
    pub fn restart(&mut self) {
        *self = Self::new();
    }

    /// Total running time so far.
    pub fn total_runtime(&self) -> Duration {
        match self.segment_start {
            Some(start) => self.banked + start.elapsed(),
            None => self.banked,
        }
    }

    /// Total running time as `[H:]MM:SS.mmm`.
    pub fn formatted_runtime(&self) -> String {
        format_duration(self.total_runtime())
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Format `duration` as `MM:SS.mmm`, prefixed with `H:` once it reaches an hour.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

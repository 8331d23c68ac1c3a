//! Rate-limited progress counter.
//!
//! Redraws a single `\r`-terminated line at most once per interval, so a walk
//! that discovers thousands of objects per second pays for a handful of writes.
//! Write failures are ignored; progress output never aborts a run.

use crate::api::WalkObserver;
use crate::graph::WalkEvent;
use crate::types::ObjectKind;
use std::io::{Stderr, Write};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct ProgressMeter<W: Write = Stderr> {
    label: String,
    count: u64,
    enabled: bool,
    interval: Duration,
    last_draw: Option<Instant>,
    writer: W,
}

impl ProgressMeter<Stderr> {
    /// Meter drawing on stderr.
    pub fn stderr(label: impl Into<String>, enabled: bool, interval: Duration) -> Self {
        Self::with_writer(label, enabled, interval, std::io::stderr())
    }
}

impl<W: Write> ProgressMeter<W> {
    pub fn with_writer(label: impl Into<String>, enabled: bool, interval: Duration, writer: W) -> Self {
        Self {
            label: label.into(),
            count: 0,
            enabled,
            interval,
            last_draw: None,
            writer,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Count one unit of work and redraw if the interval has elapsed.
    pub fn tick(&mut self) {
        self.count += 1;
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let due = self
            .last_draw
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last_draw = Some(now);
            let _ = write!(self.writer, "{}: {}\r", self.label, self.count);
            let _ = self.writer.flush();
        }
    }

    /// Draw the final count on its own line.
    pub fn finish(&mut self) {
        if self.enabled {
            let _ = writeln!(self.writer, "{}: {}, done.", self.label, self.count);
            let _ = self.writer.flush();
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Counts discovered objects; trees and commits are also logged at debug level.
impl<W: Write> WalkObserver for ProgressMeter<W> {
    fn on_event(&mut self, event: &WalkEvent) {
        if let WalkEvent::Discovered(discovery) = event {
            if discovery.kind != ObjectKind::Blob {
                debug!(
                    kind = %discovery.kind,
                    hash = %discovery.hash,
                    size = discovery.size,
                    "Discovered {} {}",
                    discovery.kind,
                    discovery.hash
                );
            }
            self.tick();
        }
    }

    fn on_finish(&mut self) {
        self.finish();
    }
}

//! Line sinks for scenario output.
//!
//! Scenario transcripts are not logs: they are the human-readable output the
//! report is built from. A [`TeeSink`] forwards every line live to the console
//! and captures it, in order, into a [`TranscriptSink`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Destination for transcript lines.
pub trait Sink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes lines to stdout. Tracing output goes to stderr, so the two never
/// interleave on the same stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{line}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn write_line(&self, _line: &str) {}
}

/// Captures lines in emission order.
#[derive(Debug, Default)]
pub struct TranscriptSink {
    lines: Mutex<Vec<String>>,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the captured lines, leaving the sink empty.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Sink for TranscriptSink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Forwards to both a live sink and a transcript.
#[derive(Clone)]
pub struct TeeSink {
    live: Arc<dyn Sink>,
    transcript: Arc<TranscriptSink>,
}

impl TeeSink {
    pub fn new(live: Arc<dyn Sink>, transcript: Arc<TranscriptSink>) -> Self {
        Self { live, transcript }
    }

    pub fn transcript(&self) -> &Arc<TranscriptSink> {
        &self.transcript
    }
}

impl Sink for TeeSink {
    fn write_line(&self, line: &str) {
        self.live.write_line(line);
        self.transcript.write_line(line);
    }
}

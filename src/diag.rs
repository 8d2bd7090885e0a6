//! Injectable diagnostic sink.
//!
//! The arena writes exactly one diagnostic line — on `Arena::init` being
//! misused with a non-positive size — and does so through this trait
//! rather than hardcoding `eprintln!`, so the core stays independent of
//! the standard error stream (useful for embedding the allocator in a
//! context that captures diagnostics elsewhere, e.g. a test harness).

use std::io::Write as _;
use std::sync::Mutex;

/// Receives the allocator's diagnostic lines.
///
/// Implementations must not panic; a sink that can fail (e.g. a closed
/// pipe) should swallow the error rather than unwind through allocator
/// code.
pub trait DiagnosticSink: Send + Sync {
    /// Writes a single diagnostic line. `line` does not include a
    /// trailing newline; the sink is responsible for terminating it.
    fn write_line(&self, line: &str);
}

/// The default sink: writes to the process's standard error stream.
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&self, line: &str) {
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{line}");
    }
}

static SINK: Mutex<Option<Box<dyn DiagnosticSink>>> = Mutex::new(None);

/// Installs a custom diagnostic sink, replacing any previously installed
/// one. Pass `None` to restore the default [`StderrSink`].
pub fn set_sink(sink: Option<Box<dyn DiagnosticSink>>) {
    *SINK.lock().unwrap() = sink;
}

/// Writes `line` to the installed sink, or [`StderrSink`] if none has
/// been installed.
pub(crate) fn emit(line: &str) {
    let guard = SINK.lock().unwrap();
    match guard.as_deref() {
        Some(sink) => sink.write_line(line),
        None => StderrSink.write_line(line),
    }
}

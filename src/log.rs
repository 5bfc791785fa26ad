//! Level-gated event sink.
//!
//! # Design
//!
//! The pipeline reports progress, warnings, and timing spans through a
//! process-wide sink instead of writing to stderr directly. The default
//! sink writes to stderr; tests install a capturing sink.
//!
//! Levels form a bitmask so the CLI can enable them independently
//! (`--verbose` turns on `Info`, `--profile` turns on `Profile`, and so
//! on). `Critical`, `Error`, and `Warning` are on by default.
//!
//! Formatting cost is the caller's concern: check [`enabled`] before
//! building an expensive message.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Event severity. Values are bitmask positions, not an ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Critical,
    Error,
    Warning,
    Info,
    Profile,
    Debug,
}

impl Level {
    fn bit(self) -> u32 {
        match self {
            Level::Critical => 1 << 0,
            Level::Error => 1 << 1,
            Level::Warning => 1 << 2,
            Level::Info => 1 << 3,
            Level::Profile => 1 << 4,
            Level::Debug => 1 << 5,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Profile => "profile",
            Level::Debug => "debug",
        }
    }
}

const DEFAULT_MASK: u32 = 1 << 0 | 1 << 1 | 1 << 2;

static MASK: AtomicU32 = AtomicU32::new(DEFAULT_MASK);

/// Destination for emitted events.
///
/// Implementations must be callable from any pipeline thread.
pub trait LogSink: Send + Sync {
    fn write(&self, level: Level, message: &str);
}

/// Default sink: one line per event on stderr.
struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, level: Level, message: &str) {
        eprintln!("[{}] {}", level.tag(), message);
    }
}

static SINK: RwLock<Option<Arc<dyn LogSink>>> = RwLock::new(None);

/// Enables a level in the process-wide mask.
pub fn enable(level: Level) {
    MASK.fetch_or(level.bit(), Ordering::Relaxed);
}

/// Disables a level in the process-wide mask.
pub fn disable(level: Level) {
    MASK.fetch_and(!level.bit(), Ordering::Relaxed);
}

/// True when events at `level` are currently delivered.
pub fn enabled(level: Level) -> bool {
    MASK.load(Ordering::Relaxed) & level.bit() != 0
}

/// Replaces the process-wide sink. Pass a capturing sink from tests.
pub fn set_sink(sink: Arc<dyn LogSink>) {
    *SINK.write().expect("log sink lock poisoned") = Some(sink);
}

/// Delivers `message` at `level`, if enabled.
pub fn emit(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }
    let guard = SINK.read().expect("log sink lock poisoned");
    match guard.as_ref() {
        Some(sink) => sink.write(level, message),
        None => StderrSink.write(level, message),
    }
}

/// Runs `f`, reporting its wall time as a `Profile` event.
///
/// The closure always runs; timing and reporting happen only when the
/// `Profile` level is enabled.
pub fn profile<R>(name: &str, f: impl FnOnce() -> R) -> R {
    if !enabled(Level::Profile) {
        return f();
    }
    let start = Instant::now();
    let result = f();
    emit(
        Level::Profile,
        &format!("{} done in {}", name, human_duration(start.elapsed())),
    );
    result
}

/// Renders a duration in the smallest unit that keeps the number readable.
fn human_duration(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        return format!("{} us", us);
    }
    if us < 1_000_000 {
        return format!("{}.{} ms", us / 1_000, us % 1_000);
    }
    let ms = d.as_millis();
    if ms < 60_000 {
        return format!("{}.{} sec", ms / 1_000, ms % 1_000);
    }
    let sec = d.as_secs();
    format!("{} min, {} sec", sec / 60, sec % 60)
}

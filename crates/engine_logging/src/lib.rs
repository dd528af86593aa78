#![deny(missing_docs)]
//! Shared logging utilities for the voicegen workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! a per-thread generation context that tags records emitted while a
//! generation is running, and a minimal test initializer for the global logger.

use std::cell::Cell;
use std::fmt;

#[doc(hidden)]
pub use log::Level;

thread_local! {
    /// Generation id attached to records logged from the current thread.
    static GENERATION: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Returns the generation id logged from the current thread, if any.
pub fn current_generation() -> Option<u64> {
    GENERATION.with(|v| v.get())
}

/// Tags every `engine_*` record on the current thread with a generation id
/// until dropped. Nested scopes restore the outer id on drop.
#[must_use = "the generation tag is removed when the scope is dropped"]
pub struct GenerationLogScope {
    previous: Option<u64>,
}

impl GenerationLogScope {
    /// Enters the scope for `generation` on the current thread.
    pub fn enter(generation: u64) -> Self {
        let previous = GENERATION.with(|v| v.replace(Some(generation)));
        Self { previous }
    }
}

impl Drop for GenerationLogScope {
    fn drop(&mut self) {
        GENERATION.with(|v| v.set(self.previous));
    }
}

/// Formats a record with the current generation tag and forwards it to `log`.
#[doc(hidden)]
pub fn emit(level: Level, target: &str, args: fmt::Arguments<'_>) {
    match current_generation() {
        Some(id) => log::log!(target: target, level, "[gen {id}] {args}"),
        None => log::log!(target: target, level, "{args}"),
    }
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        $crate::emit($crate::Level::Trace, module_path!(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        $crate::emit($crate::Level::Info, module_path!(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        $crate::emit($crate::Level::Debug, module_path!(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        $crate::emit($crate::Level::Warn, module_path!(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        $crate::emit($crate::Level::Error, module_path!(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

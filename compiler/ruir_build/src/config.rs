//! Build options.

use ruir_ast::{ident, Ident};

/// Options fixed for one compilation unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Reported in scope headers, traces and diagnostics.
    pub file_name: Ident,
    /// Emit a `LineNumber` at each new statement line.
    pub emit_line_numbers: bool,
    /// Emit `ThreadPoll` at loop heads and back-edges.
    pub thread_poll: bool,
    /// Deepest permitted nesting of scopes below the root.
    pub max_scope_depth: u32,
    /// Emit `Trace` events for lines, calls, returns and class bodies.
    pub full_trace: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            file_name: ident("-"),
            emit_line_numbers: true,
            thread_poll: true,
            max_scope_depth: 512,
            full_trace: false,
        }
    }
}

impl BuildConfig {
    pub fn new(file_name: &str) -> Self {
        BuildConfig {
            file_name: ident(file_name),
            ..BuildConfig::default()
        }
    }

    #[must_use]
    pub fn with_line_numbers(mut self, emit: bool) -> Self {
        self.emit_line_numbers = emit;
        self
    }

    #[must_use]
    pub fn with_thread_poll(mut self, emit: bool) -> Self {
        self.thread_poll = emit;
        self
    }

    #[must_use]
    pub fn with_max_scope_depth(mut self, depth: u32) -> Self {
        self.max_scope_depth = depth;
        self
    }

    #[must_use]
    pub fn with_full_trace(mut self, enabled: bool) -> Self {
        self.full_trace = enabled;
        self
    }
}

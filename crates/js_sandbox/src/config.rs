//! Sandbox configuration.

use std::time::Duration;

/// Default formatter depth limit.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Source length above which a function preview gets truncated.
pub const DEFAULT_PREVIEW_LEN: usize = 50;

/// Loop iterations allowed per millisecond of timeout when no explicit
/// loop limit is configured.
pub const LOOP_ITERATIONS_PER_MS: u64 = 10_000;

/// Sandbox configuration.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Depth beyond which nested values collapse to a placeholder.
    pub max_depth: usize,
    /// Function preview threshold in characters.
    pub preview_len: usize,
    /// Engine loop iteration limit.
    pub loop_iteration_limit: Option<u64>,
    /// Engine recursion limit.
    pub recursion_limit: Option<usize>,
    /// Caller-side wall-clock limit for a whole run.
    pub timeout: Option<Duration>,
    /// Stack size of the isolation thread.
    pub thread_stack_size: Option<usize>,
    /// Name prefix of isolation threads.
    pub thread_name_prefix: String,
}

impl SandboxConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration suited to untrusted snippets on a shared host.
    pub fn strict() -> Self {
        Self {
            loop_iteration_limit: Some(10_000_000),
            recursion_limit: Some(512),
            timeout: Some(Duration::from_secs(5)),
            ..Self::default()
        }
    }

    /// Set the formatter depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the function preview threshold.
    pub fn with_preview_len(mut self, preview_len: usize) -> Self {
        self.preview_len = preview_len;
        self
    }

    /// Set the engine loop iteration limit.
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = Some(limit);
        self
    }

    /// Set the engine recursion limit.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Set the caller-side timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Loop limit installed in the engine.
    ///
    /// A timed-out unit cannot be interrupted from outside, so a timeout with
    /// no explicit loop limit derives one from its length.
    pub fn effective_loop_iteration_limit(&self) -> Option<u64> {
        self.loop_iteration_limit.or_else(|| {
            self.timeout.map(|timeout| {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                millis.saturating_mul(LOOP_ITERATIONS_PER_MS).max(1)
            })
        })
    }

    /// Set the isolation thread stack size.
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            preview_len: DEFAULT_PREVIEW_LEN,
            loop_iteration_limit: None,
            recursion_limit: None,
            timeout: None,
            thread_stack_size: Some(8 * 1024 * 1024), // 8MB
            thread_name_prefix: "js-sandbox".to_string(),
        }
    }
}

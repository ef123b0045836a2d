#![forbid(unsafe_code)]

//! Construction-time settings shared by the state types.
//!
//! Validation tracing can be switched on for every state created with the
//! default config by setting `FORMSTATE_TRACE=1` before launching:
//!
//! ```bash
//! FORMSTATE_TRACE=1 cargo test
//! ```
//!
//! The variable is read once; afterwards the check is a single bool load.

use std::sync::LazyLock;
use std::time::Duration;

/// Default quiet period before debounced input commits.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

static TRACE_ENABLED: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("FORMSTATE_TRACE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

/// Whether `FORMSTATE_TRACE` asks for validation traces.
#[inline]
pub fn trace_from_env() -> bool {
    *TRACE_ENABLED
}

/// Settings for a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Quiet period after the last `on_change` before a field commits.
    /// Zero commits synchronously. Composites ignore it.
    pub delay: Duration,

    /// Record validation lifecycle events, readable through `trace()`.
    pub enable_trace: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            enable_trace: trace_from_env(),
        }
    }
}

impl StateConfig {
    /// Set the input debounce delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Enable or disable trace recording.
    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.enable_trace = enabled;
        self
    }
}

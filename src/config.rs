//! Centralized configuration for the bridge.
//!
//! Goals:
//! - One place for tunables instead of scattered env lookups.
//! - BridgeConfig::from_env() reads UCB_* variables; fluent with_* setters override them.
//!
//! Native close failure policy (UCB_CLOSE_FAILURE):
//! - "error" (default): close() returns BridgeError::CloseFailed; the engine is still
//!   marked closed and unregistered, native close is never retried.
//! - "abort": the failure is logged and the process aborts.
//! Other native-status failures are always ordinary errors.

use std::fmt;

/// What to do when the engine's native close reports a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseFailurePolicy {
    Error,
    Abort,
}

impl CloseFailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "err" | "return" => Some(CloseFailurePolicy::Error),
            "abort" | "crash" | "fatal" => Some(CloseFailurePolicy::Abort),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseFailurePolicy::Error => "error",
            CloseFailurePolicy::Abort => "abort",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Env: UCB_CLOSE_FAILURE = error|abort (default error)
    pub close_failure: CloseFailurePolicy,

    /// Log every native call at trace level.
    /// Env: UCB_TRACE_NATIVE (default false; "1|true|on|yes" => true)
    pub trace_native_calls: bool,

    /// Log hook deletions that fail during close at warn (otherwise debug).
    /// Env: UCB_HOOK_TEARDOWN_WARN (default true)
    pub hook_teardown_warn: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            close_failure: CloseFailurePolicy::Error,
            trace_native_calls: false,
            hook_teardown_warn: true,
        }
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("UCB_CLOSE_FAILURE") {
            if let Some(p) = CloseFailurePolicy::parse(&v) {
                cfg.close_failure = p;
            }
        }

        if let Ok(v) = std::env::var("UCB_TRACE_NATIVE") {
            cfg.trace_native_calls = env_flag(&v);
        }

        if let Ok(v) = std::env::var("UCB_HOOK_TEARDOWN_WARN") {
            cfg.hook_teardown_warn = env_flag(&v);
        }

        cfg
    }

    pub fn with_close_failure(mut self, policy: CloseFailurePolicy) -> Self {
        self.close_failure = policy;
        self
    }

    pub fn with_trace_native_calls(mut self, on: bool) -> Self {
        self.trace_native_calls = on;
        self
    }

    pub fn with_hook_teardown_warn(mut self, on: bool) -> Self {
        self.hook_teardown_warn = on;
        self
    }
}

impl fmt::Display for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BridgeConfig {{ close_failure: {}, trace_native_calls: {}, hook_teardown_warn: {} }}",
            self.close_failure.as_str(),
            self.trace_native_calls,
            self.hook_teardown_warn,
        )
    }
}

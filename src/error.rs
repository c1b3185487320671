//! Typed errors of the bridge.
//!
//! Public functions return `anyhow::Result`; the underlying error is always a
//! `BridgeError` so callers can classify it with `downcast_ref`.

use thiserror::Error;

use crate::native::{NativeHandle, NativeHookId};

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Operation on an engine whose native handle was already closed.
    #[error("attempted to use closed engine")]
    EngineClosed,

    /// Reverse lookup of a handle nobody registered (or already unregistered).
    #[error("no engine object is registered for handle {handle}")]
    NotRegistered { handle: NativeHandle },

    /// hook_del with an id that is not in the engine's hook table.
    #[error("hook {id} is not registered on this engine")]
    UnknownHook { id: NativeHookId },

    /// Any non-success status from the native engine.
    #[error("{op} failed: {message} (code {code})")]
    Native {
        op: &'static str,
        code: i32,
        message: &'static str,
    },

    /// Native close failed: the engine's native resources are in an indeterminate state.
    #[error("closing engine {handle} failed, native state is indeterminate: {message} (code {code})")]
    CloseFailed {
        handle: NativeHandle,
        code: i32,
        message: &'static str,
    },
}

impl BridgeError {
    /// Usage errors are caller mistakes; everything else came from the engine.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            BridgeError::EngineClosed
                | BridgeError::NotRegistered { .. }
                | BridgeError::UnknownHook { .. }
        )
    }

    /// Native status code, when the error originates from the engine.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            BridgeError::Native { code, .. } | BridgeError::CloseFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Classify an `anyhow::Error` produced by this crate.
pub fn bridge_error(e: &anyhow::Error) -> Option<&BridgeError> {
    e.downcast_ref::<BridgeError>()
}

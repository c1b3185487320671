//! Native status codes and the single translation path into bridge errors.
//!
//! Every NativeApi call reports a `UcErr`; `UcErr::OK` is the only success
//! value. `check()` and `close_failed()` are the one place where a status becomes a `BridgeError`.

use std::fmt;

use anyhow::Result;
use log::trace;

use crate::consts::*;
use crate::error::BridgeError;
use crate::metrics::record_native_error;
use crate::native::{NativeHandle, NativeResult};

/// Status code returned by the native engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UcErr(pub i32);

impl UcErr {
    pub const OK: UcErr = UcErr(ERR_OK);
    pub const NOMEM: UcErr = UcErr(ERR_NOMEM);
    pub const ARCH: UcErr = UcErr(ERR_ARCH);
    pub const HANDLE: UcErr = UcErr(ERR_HANDLE);
    pub const MODE: UcErr = UcErr(ERR_MODE);
    pub const READ_UNMAPPED: UcErr = UcErr(ERR_READ_UNMAPPED);
    pub const WRITE_UNMAPPED: UcErr = UcErr(ERR_WRITE_UNMAPPED);
    pub const FETCH_UNMAPPED: UcErr = UcErr(ERR_FETCH_UNMAPPED);
    pub const HOOK: UcErr = UcErr(ERR_HOOK);
    pub const MAP: UcErr = UcErr(ERR_MAP);
    pub const WRITE_PROT: UcErr = UcErr(ERR_WRITE_PROT);
    pub const READ_PROT: UcErr = UcErr(ERR_READ_PROT);
    pub const FETCH_PROT: UcErr = UcErr(ERR_FETCH_PROT);
    pub const ARG: UcErr = UcErr(ERR_ARG);
    pub const RESOURCE: UcErr = UcErr(ERR_RESOURCE);

    #[inline]
    pub fn is_ok(self) -> bool {
        self.0 == ERR_OK
    }

    #[inline]
    pub fn code(self) -> i32 {
        self.0
    }

    /// Human-readable message for this status (uc_strerror).
    pub fn message(self) -> &'static str {
        strerror(self.0)
    }
}

impl fmt::Display for UcErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (UC_ERR {})", self.message(), self.0)
    }
}

impl std::error::Error for UcErr {}

/// Message table, same wording the native library uses.
pub fn strerror(code: i32) -> &'static str {
    match code {
        ERR_OK => "OK (UC_ERR_OK)",
        ERR_NOMEM => "No memory available or memory not present (UC_ERR_NOMEM)",
        ERR_ARCH => "Invalid/unsupported architecture (UC_ERR_ARCH)",
        ERR_HANDLE => "Invalid handle (UC_ERR_HANDLE)",
        ERR_MODE => "Invalid mode (UC_ERR_MODE)",
        ERR_VERSION => "Different API version between core & binding (UC_ERR_VERSION)",
        ERR_READ_UNMAPPED => "Invalid memory read (UC_ERR_READ_UNMAPPED)",
        ERR_WRITE_UNMAPPED => "Invalid memory write (UC_ERR_WRITE_UNMAPPED)",
        ERR_FETCH_UNMAPPED => "Invalid memory fetch (UC_ERR_FETCH_UNMAPPED)",
        ERR_HOOK => "Invalid hook type (UC_ERR_HOOK)",
        ERR_INSN_INVALID => "Invalid instruction (UC_ERR_INSN_INVALID)",
        ERR_MAP => "Invalid memory mapping (UC_ERR_MAP)",
        ERR_WRITE_PROT => "Write to write-protected memory (UC_ERR_WRITE_PROT)",
        ERR_READ_PROT => "Read from non-readable memory (UC_ERR_READ_PROT)",
        ERR_FETCH_PROT => "Fetch from non-executable memory (UC_ERR_FETCH_PROT)",
        ERR_ARG => "Invalid argument (UC_ERR_ARG)",
        ERR_READ_UNALIGNED => "Read from unaligned memory (UC_ERR_READ_UNALIGNED)",
        ERR_WRITE_UNALIGNED => "Write to unaligned memory (UC_ERR_WRITE_UNALIGNED)",
        ERR_FETCH_UNALIGNED => "Fetch from unaligned memory (UC_ERR_FETCH_UNALIGNED)",
        ERR_HOOK_EXIST => "Hook for this type event already exists (UC_ERR_HOOK_EXIST)",
        ERR_RESOURCE => "Insufficient resource (UC_ERR_RESOURCE)",
        ERR_EXCEPTION => "Unhandled CPU exception (UC_ERR_EXCEPTION)",
        _ => "Unknown error code",
    }
}

fn native_error(op: &'static str, status: UcErr, message: &'static str) -> anyhow::Error {
    record_native_error();
    trace!("native {} failed: {}", op, status);
    BridgeError::Native {
        op,
        code: status.0,
        message,
    }
    .into()
}

/// Failed native close of `handle`. Same bookkeeping as `check`, but the error
/// says the instance is left in an indeterminate state.
pub fn close_failed(handle: NativeHandle, status: UcErr) -> anyhow::Error {
    record_native_error();
    trace!("native close failed on engine {}: {}", handle, status);
    BridgeError::CloseFailed {
        handle,
        code: status.0,
        message: status.message(),
    }
    .into()
}

/// Translate the outcome of a native call. An `Err(UcErr::OK)` from the engine is
/// a broken contract on its side and is reported as a failure all the same.
pub fn check<T>(op: &'static str, r: NativeResult<T>) -> Result<T> {
    match r {
        Ok(v) => Ok(v),
        Err(status) if status.is_ok() => Err(native_error(
            op,
            status,
            "engine reported failure with UC_ERR_OK",
        )),
        Err(status) => Err(native_error(op, status, status.message())),
    }
}

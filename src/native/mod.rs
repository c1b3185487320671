//! native - interface of the emulation engine the bridge drives.
//!
//! The engine is a black box: every call reports a `UcErr` status, handles are
//! opaque identities that the bridge compares but never dereferences.
//! `crate::sim::SimBackend` is the in-process implementation; a real native
//! library plugs in by implementing `NativeApi` over its C entry points.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::status::UcErr;

pub type NativeResult<T> = std::result::Result<T, UcErr>;

/// Opaque identity of one emulator instance (uc_engine*).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Native hook handle (uc_hook). Also the key of an engine's hook table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHookId(pub u64);

impl fmt::Display for NativeHookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native saved-context handle (uc_context*).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeContext(pub u64);

impl fmt::Display for NativeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One mapped region as reported by mem_regions. `end` is inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MemRegion {
    pub begin: u64,
    pub end: u64,
    pub perms: u32,
}

impl MemRegion {
    #[inline]
    pub fn size(&self) -> u64 {
        self.end - self.begin + 1
    }
}

/// Callback the engine invokes for a code hook: (engine handle, address, instruction size).
/// Only the bare handle is delivered; the bridge maps it back to its wrapper.
pub type NativeHookFn = Arc<dyn Fn(NativeHandle, u64, u32) + Send + Sync>;

/// Entry points consumed from the emulation engine.
///
/// Handles passed in are whatever `open` / `context_alloc` / `hook_add` returned;
/// the engine reports `UcErr::HANDLE` for anything it does not know.
pub trait NativeApi: Send + Sync {
    /// Engine version as (major, minor).
    fn version(&self) -> (u32, u32);

    fn open(&self, arch: i32, mode: i32) -> NativeResult<NativeHandle>;
    fn close(&self, h: NativeHandle) -> NativeResult<()>;

    /// Last error recorded on the instance (uc_errno). Not itself fallible.
    fn errno(&self, h: NativeHandle) -> UcErr;
    fn query(&self, h: NativeHandle, kind: i32) -> NativeResult<usize>;

    fn emu_start(
        &self,
        h: NativeHandle,
        begin: u64,
        until: u64,
        timeout_us: u64,
        count: usize,
    ) -> NativeResult<()>;
    fn emu_stop(&self, h: NativeHandle) -> NativeResult<()>;

    fn mem_map(&self, h: NativeHandle, address: u64, size: usize, perms: u32) -> NativeResult<()>;
    fn mem_unmap(&self, h: NativeHandle, address: u64, size: usize) -> NativeResult<()>;
    fn mem_protect(&self, h: NativeHandle, address: u64, size: usize, perms: u32)
        -> NativeResult<()>;
    fn mem_read(&self, h: NativeHandle, address: u64, buf: &mut [u8]) -> NativeResult<()>;
    fn mem_write(&self, h: NativeHandle, address: u64, data: &[u8]) -> NativeResult<()>;
    fn mem_regions(&self, h: NativeHandle) -> NativeResult<Vec<MemRegion>>;

    fn reg_read(&self, h: NativeHandle, regid: i32) -> NativeResult<u64>;
    fn reg_write(&self, h: NativeHandle, regid: i32, value: u64) -> NativeResult<()>;

    fn reg_read_batch(&self, h: NativeHandle, regids: &[i32]) -> NativeResult<Vec<u64>> {
        let mut out = Vec::with_capacity(regids.len());
        for &id in regids {
            out.push(self.reg_read(h, id)?);
        }
        Ok(out)
    }

    fn reg_write_batch(&self, h: NativeHandle, regs: &[(i32, u64)]) -> NativeResult<()> {
        for &(id, v) in regs {
            self.reg_write(h, id, v)?;
        }
        Ok(())
    }

    /// Register a hook for `[begin, end]` (begin > end means "everywhere").
    fn hook_add(
        &self,
        h: NativeHandle,
        kind: u32,
        begin: u64,
        end: u64,
        callback: NativeHookFn,
    ) -> NativeResult<NativeHookId>;
    fn hook_del(&self, h: NativeHandle, hook: NativeHookId) -> NativeResult<()>;

    fn context_alloc(&self, h: NativeHandle) -> NativeResult<NativeContext>;
    fn context_save(&self, h: NativeHandle, ctx: NativeContext) -> NativeResult<()>;
    fn context_restore(&self, h: NativeHandle, ctx: NativeContext) -> NativeResult<()>;
    fn context_free(&self, ctx: NativeContext) -> NativeResult<()>;
}

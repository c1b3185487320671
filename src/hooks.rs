//! hooks - per-engine hook table and the hook manager.
//!
//! - HookTable: insertion-ordered map NativeHookId -> HookEntry, owned by one engine.
//!   Teardown order on close is the insertion order.
//! - add(): registers a native hook whose trampoline recovers the Engine through the
//!   handle registry and calls the user callback.
//! - delete(): releases the native side of one hook (used by hook_del and by close).

use anyhow::Result;
use log::{debug, warn};
use std::sync::{Arc, Mutex, TryLockError};

use crate::consts::HOOK_CODE;
use crate::engine::{Engine, EngineInner};
use crate::error::BridgeError;
use crate::metrics::{
    record_hook_added, record_hook_deleted, record_hook_dispatch, record_hook_dispatch_miss,
};
use crate::native::{NativeHandle, NativeHookFn, NativeHookId};
use crate::registry;
use crate::status::check;

/// User callback for a code hook: (engine, address, instruction size).
pub type HookCallback = Box<dyn FnMut(&Engine, u64, u32) + Send>;

/// What to hook and where. `begin > end` covers the whole address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookSpec {
    pub kind: u32,
    pub begin: u64,
    pub end: u64,
}

impl HookSpec {
    /// Code hook over the whole address space.
    pub fn code() -> Self {
        Self {
            kind: HOOK_CODE,
            begin: 1,
            end: 0,
        }
    }

    pub fn with_range(mut self, begin: u64, end: u64) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }
}

/// Descriptor kept in the engine's hook table.
pub struct HookEntry {
    pub spec: HookSpec,
    callback: Arc<Mutex<HookCallback>>,
}

impl std::fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEntry").field("spec", &self.spec).finish()
    }
}

/// Insertion-ordered hook table.
#[derive(Debug, Default)]
pub struct HookTable {
    entries: Vec<(NativeHookId, HookEntry)>,
}

impl HookTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NativeHookId) -> bool {
        self.entries.iter().any(|(k, _)| *k == id)
    }

    /// Insert at the tail. An existing entry with the same id is replaced in place.
    pub fn insert(&mut self, id: NativeHookId, entry: HookEntry) {
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((id, entry)),
        }
    }

    pub fn remove(&mut self, id: NativeHookId) -> Option<HookEntry> {
        let pos = self.entries.iter().position(|(k, _)| *k == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, id: NativeHookId) -> Option<&HookEntry> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, e)| e)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<NativeHookId> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    /// Remove every entry, yielding them in insertion order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, (NativeHookId, HookEntry)> {
        self.entries.drain(..)
    }
}

/// Native-side trampoline: bare handle -> registry -> Engine -> user callback.
fn trampoline(callback: Arc<Mutex<HookCallback>>) -> NativeHookFn {
    Arc::new(move |handle: NativeHandle, address: u64, size: u32| {
        let engine = match registry::lookup(handle) {
            Ok(e) => e,
            Err(e) => {
                record_hook_dispatch_miss();
                warn!("hook dispatch at {:#x}: {:#}", address, e);
                return;
            }
        };
        // Повторный вход в тот же колбэк (вложенный emu_start) пропускаем.
        let mut guard = match callback.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                record_hook_dispatch_miss();
                debug!("hook dispatch at {:#x}: callback already running, skipped", address);
                return;
            }
        };
        record_hook_dispatch();
        let f = &mut *guard;
        f(&engine, address, size);
    })
}

/// Register a hook on `engine` and record it in the engine's hook table.
pub(crate) fn add(engine: &Engine, spec: HookSpec, callback: HookCallback) -> Result<NativeHookId> {
    let handle = engine.resolve_handle()?;
    let inner = engine.inner();
    inner.trace("hook_add", handle);

    let callback = Arc::new(Mutex::new(callback));
    let id = check(
        "hook_add",
        inner
            .api
            .hook_add(handle, spec.kind, spec.begin, spec.end, trampoline(callback.clone())),
    )?;

    // The table is gone only if the engine was closed while hook_add ran;
    // native close already released the hook in that case.
    inner
        .with_hooks(|table| table.insert(id, HookEntry { spec, callback }))
        .ok_or(BridgeError::EngineClosed)?;
    record_hook_added();
    debug!("engine {}: hook {} added (kind {:#x})", handle, id, spec.kind);
    Ok(id)
}

/// Release the native side of hook `id`. The caller owns the table entry.
pub(crate) fn delete(inner: &EngineInner, handle: NativeHandle, id: NativeHookId) -> Result<()> {
    inner.trace("hook_del", handle);
    check("hook_del", inner.api.hook_del(handle, id))?;
    record_hook_deleted();
    Ok(())
}

//! registry - процесс-глобальный реестр NativeHandle -> Engine (weak values).
//!
//! Назначение:
//! - Нативные хуки получают только голый handle; реестр позволяет по нему найти
//!   объект-обёртку Engine.
//! - Значения слабые (Weak): запись в реестре не держит обёртку живой. Время жизни
//!   Engine определяется ссылками хоста.
//! - unregister() обязателен при close(): Weak "умирает" только после Drop, а после
//!   явного close handle не должен резолвиться в старую обёртку.
//!
//! Реестр создаётся один раз (OnceLock) и живёт до конца процесса.

use anyhow::Result;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::engine::{Engine, EngineInner};
use crate::error::BridgeError;
use crate::native::NativeHandle;
use crate::util::lock;

struct HandleRegistry {
    map: HashMap<NativeHandle, Weak<EngineInner>>,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

static REGISTRY: OnceLock<Mutex<HandleRegistry>> = OnceLock::new();

fn registry_lock() -> &'static Mutex<HandleRegistry> {
    REGISTRY.get_or_init(|| Mutex::new(HandleRegistry::new()))
}

/// Map `handle` to `inner`. A stale mapping for the same handle is overwritten.
pub(crate) fn register(handle: NativeHandle, inner: &Arc<EngineInner>) {
    let mut reg = lock(registry_lock());
    if let Some(old) = reg.map.insert(handle, Arc::downgrade(inner)) {
        if old.strong_count() > 0 {
            // Не должно случаться: два живых Engine на один handle.
            log::warn!("registry: handle {} re-registered while previous engine is alive", handle);
        }
    }
    trace!("registry: register {}", handle);
}

/// Recover the engine registered for `handle`.
///
/// Fails with `BridgeError::NotRegistered` when there is no entry or the engine
/// behind it is already gone. The registry is not modified either way.
pub fn lookup(handle: NativeHandle) -> Result<Engine> {
    let reg = lock(registry_lock());
    match reg.map.get(&handle).and_then(Weak::upgrade) {
        Some(inner) => Ok(Engine::from_inner(inner)),
        None => Err(BridgeError::NotRegistered { handle }.into()),
    }
}

/// Remove the entry for `handle` (no-op when absent).
pub(crate) fn unregister(handle: NativeHandle) {
    let mut reg = lock(registry_lock());
    reg.map.remove(&handle);
    trace!("registry: unregister {}", handle);
}

/// Whether an entry (live or not yet collected) exists for `handle`.
pub fn contains(handle: NativeHandle) -> bool {
    lock(registry_lock()).map.contains_key(&handle)
}

/// Number of entries, including ones whose engine is already dead.
pub fn len() -> usize {
    lock(registry_lock()).map.len()
}

/// Drop entries whose engine has been dropped. Returns the number removed.
pub fn purge_dead() -> usize {
    let mut reg = lock(registry_lock());
    let before = reg.map.len();
    reg.map.retain(|_, w| w.strong_count() > 0);
    before - reg.map.len()
}

//! engine/core - обёртка Engine, её состояние и машина OPEN -> CLOSED.
//!
//! - create(): обёртка в OPEN, запись в реестре, пустая таблица хуков.
//! - resolve_handle(): единственная точка проверки "движок ещё открыт".
//! - close(): хуки (в порядке вставки) -> native close -> unregister -> CLOSED.
//!   Повторный close - no-op.
//! - impl Drop for EngineInner: последняя ссылка хоста исчезла -> тот же close().

use anyhow::Result;
use log::{debug, error, trace, warn};
use std::sync::{Arc, Mutex};

use crate::config::{BridgeConfig, CloseFailurePolicy};
use crate::error::BridgeError;
use crate::hooks::{self, HookTable};
use crate::metrics::{
    record_engine_close_failure, record_engine_closed, record_engine_opened, record_hook_drained,
    record_hook_teardown_failure,
};
use crate::native::{NativeApi, NativeHandle, NativeHookId};
use crate::registry;
use crate::status::{check, close_failed};
use crate::util::lock;

/// State shared by every clone of one `Engine`.
pub struct EngineInner {
    pub(crate) api: Arc<dyn NativeApi>,
    pub(crate) cfg: BridgeConfig,
    // Some = OPEN, None = CLOSED
    handle: Mutex<Option<NativeHandle>>,
    // None once close() released it
    hooks: Mutex<Option<HookTable>>,
}

impl EngineInner {
    #[inline]
    pub(crate) fn trace(&self, op: &str, handle: NativeHandle) {
        if self.cfg.trace_native_calls {
            trace!("native {} on engine {}", op, handle);
        }
    }

    /// Run `f` on the hook table; None when the engine is closed.
    pub(crate) fn with_hooks<R>(&self, f: impl FnOnce(&mut HookTable) -> R) -> Option<R> {
        let mut guard = lock(&self.hooks);
        guard.as_mut().map(f)
    }

    /// Full close sequence. `finalizing` = called from Drop.
    fn close(&self, finalizing: bool) -> Result<()> {
        let mut slot = lock(&self.handle);
        let handle = match *slot {
            Some(h) => h,
            None => return Ok(()),
        };

        // 1) Хуки ссылаются на движок: снимаем их до native close.
        let table = lock(&self.hooks).take();
        if let Some(mut table) = table {
            for (id, _entry) in table.drain() {
                match hooks::delete(self, handle, id) {
                    Ok(()) => record_hook_drained(),
                    Err(e) => {
                        record_hook_teardown_failure();
                        if self.cfg.hook_teardown_warn {
                            warn!("engine {}: releasing hook {} on close: {:#}", handle, id, e);
                        } else {
                            debug!("engine {}: releasing hook {} on close: {:#}", handle, id, e);
                        }
                    }
                }
            }
        }

        // 2) native close
        self.trace("close", handle);
        let closed = self.api.close(handle);
        if let Err(status) = closed {
            record_engine_close_failure();
            if self.cfg.close_failure == CloseFailurePolicy::Abort {
                error!(
                    "engine {}: native close failed ({}), aborting per UCB_CLOSE_FAILURE=abort",
                    handle, status
                );
                std::process::abort();
            }
        }

        // 3) GC-подобная очистка реестра не мгновенна: убираем запись явно.
        registry::unregister(handle);

        // 4) CLOSED
        *slot = None;
        drop(slot);
        record_engine_closed(finalizing);

        match closed {
            Ok(()) => {
                debug!(
                    "engine {} closed{}",
                    handle,
                    if finalizing { " by finalizer" } else { "" }
                );
                Ok(())
            }
            Err(status) => Err(close_failed(handle, status)),
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Err(e) = self.close(true) {
            error!("finalizer: {:#}", e);
        }
    }
}

/// Host-facing wrapper around one native engine handle.
///
/// Clones share the same state; the native engine is closed by `close()` or,
/// at the latest, when the last clone is dropped. A hook callback that captures
/// a clone of its own engine keeps it alive until `close()` is called explicitly
/// (the callback already receives `&Engine`, capturing is rarely needed).
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("handle", &*lock(&self.inner.handle))
            .finish()
    }
}

impl Engine {
    /// Open a new native engine and wrap it. Configuration comes from UCB_* env vars.
    pub fn open(api: Arc<dyn NativeApi>, arch: i32, mode: i32) -> Result<Engine> {
        Self::open_with_config(api, arch, mode, BridgeConfig::from_env())
    }

    pub fn open_with_config(
        api: Arc<dyn NativeApi>,
        arch: i32,
        mode: i32,
        cfg: BridgeConfig,
    ) -> Result<Engine> {
        let handle = check("open", api.open(arch, mode))?;
        Ok(Self::create(api, handle, cfg))
    }

    /// Wrap an already opened native handle: OPEN state, registered, empty hook table.
    /// The wrapper takes over responsibility for closing `handle`.
    pub fn create(api: Arc<dyn NativeApi>, handle: NativeHandle, cfg: BridgeConfig) -> Engine {
        let inner = Arc::new(EngineInner {
            api,
            cfg,
            handle: Mutex::new(Some(handle)),
            hooks: Mutex::new(Some(HookTable::new())),
        });
        registry::register(handle, &inner);
        record_engine_opened();
        debug!("engine {} created", handle);
        Engine { inner }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Engine {
        Engine { inner }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &EngineInner {
        &self.inner
    }

    /// The native handle, or `BridgeError::EngineClosed`.
    pub fn resolve_handle(&self) -> Result<NativeHandle> {
        lock(&self.inner.handle).ok_or_else(|| BridgeError::EngineClosed.into())
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.handle).is_none()
    }

    /// Release hooks, close the native engine and unregister it. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close(false)
    }

    /// Same underlying engine object (not merely the same handle value).
    pub fn same_as(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.inner.api
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.cfg
    }

    /// Number of hooks currently registered (0 once closed).
    pub fn hook_count(&self) -> usize {
        self.inner.with_hooks(|t| t.len()).unwrap_or(0)
    }

    /// Registered hook ids in insertion order (empty once closed).
    pub fn hook_ids(&self) -> Vec<NativeHookId> {
        self.inner.with_hooks(|t| t.ids()).unwrap_or_default()
    }
}

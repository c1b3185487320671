//! hook_add / hook_del on the Engine. Table bookkeeping lives in crate::hooks.

use anyhow::Result;
use log::debug;

use super::core::Engine;
use crate::error::BridgeError;
use crate::hooks::{self, HookCallback, HookSpec};
use crate::native::NativeHookId;

impl Engine {
    /// Register `callback` for `spec`. The returned id is the key for `hook_del`.
    pub fn hook_add<F>(&self, spec: HookSpec, callback: F) -> Result<NativeHookId>
    where
        F: FnMut(&Engine, u64, u32) + Send + 'static,
    {
        let cb: HookCallback = Box::new(callback);
        hooks::add(self, spec, cb)
    }

    /// Remove a hook registered with `hook_add`.
    ///
    /// Unknown ids fail with `BridgeError::UnknownHook`. When the native delete
    /// fails the entry stays in the table and is retried by `close()`.
    pub fn hook_del(&self, id: NativeHookId) -> Result<()> {
        let h = self.resolve_handle()?;
        let known = self
            .inner()
            .with_hooks(|t| t.contains(id))
            .ok_or(BridgeError::EngineClosed)?;
        if !known {
            return Err(BridgeError::UnknownHook { id }.into());
        }

        hooks::delete(self.inner(), h, id)?;
        self.inner().with_hooks(|t| t.remove(id));
        debug!("engine {}: hook {} deleted", h, id);
        Ok(())
    }
}

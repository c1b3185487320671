//! Saved engine contexts (uc_context).
//!
//! A `Context` is created through an engine but is not owned by it: it can
//! outlive that engine and be restored into another engine of a compatible
//! architecture (the native library decides what "compatible" means).
//! Clones share one native context, freed exactly once when the last clone drops.

use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;

use crate::engine::Engine;
use crate::metrics::{record_context_allocated, record_context_freed};
use crate::native::{NativeApi, NativeContext};
use crate::status::check;

struct ContextInner {
    api: Arc<dyn NativeApi>,
    raw: NativeContext,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        match self.api.context_free(self.raw) {
            Ok(()) => {
                record_context_freed();
                debug!("context {} freed", self.raw);
            }
            Err(status) => warn!("context {}: context_free failed: {}", self.raw, status),
        }
    }
}

/// Snapshot of an engine's CPU (and, depending on the engine, memory) state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("raw", &self.inner.raw).finish()
    }
}

impl Context {
    /// Allocate an empty native context sized for `engine`'s architecture.
    pub fn alloc(engine: &Engine) -> Result<Context> {
        let h = engine.resolve_handle()?;
        engine.inner().trace("context_alloc", h);
        let api = engine.api().clone();
        let raw = check("context_alloc", api.context_alloc(h))?;
        record_context_allocated();
        debug!("engine {}: context {} allocated", h, raw);
        Ok(Context {
            inner: Arc::new(ContextInner { api, raw }),
        })
    }

    /// Native context handle.
    pub fn raw(&self) -> NativeContext {
        self.inner.raw
    }

    /// Same snapshot object (identity, not contents).
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Engine {
    /// Save the live state into `ctx`, or into a freshly allocated context when
    /// `ctx` is None. Returns the context that now holds the state; when one was
    /// passed in, the returned value is that same object.
    pub fn context_save(&self, ctx: Option<Context>) -> Result<Context> {
        let h = self.resolve_handle()?;
        let ctx = match ctx {
            Some(c) => c,
            None => Context::alloc(self)?,
        };
        self.inner().trace("context_save", h);
        check("context_save", self.api().context_save(h, ctx.raw()))?;
        Ok(ctx)
    }

    /// Load the state held by `ctx` into this engine.
    pub fn context_restore(&self, ctx: &Context) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("context_restore", h);
        check("context_restore", self.api().context_restore(h, ctx.raw()))
    }
}

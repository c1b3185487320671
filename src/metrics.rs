//! Lightweight global metrics for the bridge.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Engine lifecycle (open/close/finalize)
//! - Hooks (add/del, teardown on close, dispatch misses)
//! - Contexts (alloc/free)
//! - Native status failures

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Engines -----
static ENGINES_OPENED: AtomicU64 = AtomicU64::new(0);
static ENGINES_CLOSED: AtomicU64 = AtomicU64::new(0);
static ENGINES_FINALIZED: AtomicU64 = AtomicU64::new(0);
static ENGINE_CLOSE_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Hooks -----
static HOOKS_ADDED: AtomicU64 = AtomicU64::new(0);
static HOOKS_DELETED: AtomicU64 = AtomicU64::new(0);
static HOOKS_DRAINED_ON_CLOSE: AtomicU64 = AtomicU64::new(0);
static HOOK_TEARDOWN_FAILURES: AtomicU64 = AtomicU64::new(0);
static HOOK_DISPATCHES: AtomicU64 = AtomicU64::new(0);
static HOOK_DISPATCH_MISSES: AtomicU64 = AtomicU64::new(0);

// ----- Contexts -----
static CONTEXTS_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static CONTEXTS_FREED: AtomicU64 = AtomicU64::new(0);

// ----- Native -----
static NATIVE_ERRORS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Engines
    pub engines_opened: u64,
    pub engines_closed: u64,
    pub engines_finalized: u64,
    pub engine_close_failures: u64,

    // Hooks
    pub hooks_added: u64,
    pub hooks_deleted: u64,
    pub hooks_drained_on_close: u64,
    pub hook_teardown_failures: u64,
    pub hook_dispatches: u64,
    pub hook_dispatch_misses: u64,

    // Contexts
    pub contexts_allocated: u64,
    pub contexts_freed: u64,

    // Native
    pub native_errors: u64,
}

impl MetricsSnapshot {
    /// Engines that were opened and not yet closed (explicitly or by finalization).
    pub fn engines_live(&self) -> u64 {
        self.engines_opened.saturating_sub(self.engines_closed)
    }

    pub fn contexts_live(&self) -> u64 {
        self.contexts_allocated.saturating_sub(self.contexts_freed)
    }
}

// ----- Recorders (Engines) -----
pub fn record_engine_opened() {
    ENGINES_OPENED.fetch_add(1, Ordering::Relaxed);
}

/// `finalized` = close came from Drop rather than an explicit call.
pub fn record_engine_closed(finalized: bool) {
    ENGINES_CLOSED.fetch_add(1, Ordering::Relaxed);
    if finalized {
        ENGINES_FINALIZED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_engine_close_failure() {
    ENGINE_CLOSE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Hooks) -----
pub fn record_hook_added() {
    HOOKS_ADDED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_hook_deleted() {
    HOOKS_DELETED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_hook_drained() {
    HOOKS_DRAINED_ON_CLOSE.fetch_add(1, Ordering::Relaxed);
}
pub fn record_hook_teardown_failure() {
    HOOK_TEARDOWN_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_hook_dispatch() {
    HOOK_DISPATCHES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_hook_dispatch_miss() {
    HOOK_DISPATCH_MISSES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Contexts) -----
pub fn record_context_allocated() {
    CONTEXTS_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_context_freed() {
    CONTEXTS_FREED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Native) -----
pub fn record_native_error() {
    NATIVE_ERRORS.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        engines_opened: ENGINES_OPENED.load(Ordering::Relaxed),
        engines_closed: ENGINES_CLOSED.load(Ordering::Relaxed),
        engines_finalized: ENGINES_FINALIZED.load(Ordering::Relaxed),
        engine_close_failures: ENGINE_CLOSE_FAILURES.load(Ordering::Relaxed),

        hooks_added: HOOKS_ADDED.load(Ordering::Relaxed),
        hooks_deleted: HOOKS_DELETED.load(Ordering::Relaxed),
        hooks_drained_on_close: HOOKS_DRAINED_ON_CLOSE.load(Ordering::Relaxed),
        hook_teardown_failures: HOOK_TEARDOWN_FAILURES.load(Ordering::Relaxed),
        hook_dispatches: HOOK_DISPATCHES.load(Ordering::Relaxed),
        hook_dispatch_misses: HOOK_DISPATCH_MISSES.load(Ordering::Relaxed),

        contexts_allocated: CONTEXTS_ALLOCATED.load(Ordering::Relaxed),
        contexts_freed: CONTEXTS_FREED.load(Ordering::Relaxed),

        native_errors: NATIVE_ERRORS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    ENGINES_OPENED.store(0, Ordering::Relaxed);
    ENGINES_CLOSED.store(0, Ordering::Relaxed);
    ENGINES_FINALIZED.store(0, Ordering::Relaxed);
    ENGINE_CLOSE_FAILURES.store(0, Ordering::Relaxed);

    HOOKS_ADDED.store(0, Ordering::Relaxed);
    HOOKS_DELETED.store(0, Ordering::Relaxed);
    HOOKS_DRAINED_ON_CLOSE.store(0, Ordering::Relaxed);
    HOOK_TEARDOWN_FAILURES.store(0, Ordering::Relaxed);
    HOOK_DISPATCHES.store(0, Ordering::Relaxed);
    HOOK_DISPATCH_MISSES.store(0, Ordering::Relaxed);

    CONTEXTS_ALLOCATED.store(0, Ordering::Relaxed);
    CONTEXTS_FREED.store(0, Ordering::Relaxed);

    NATIVE_ERRORS.store(0, Ordering::Relaxed);
}

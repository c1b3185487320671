//! Execution control and status queries.

use anyhow::Result;

use super::core::Engine;
use crate::status::{check, UcErr};

impl Engine {
    /// Native library version (major, minor). Works on a closed engine too.
    pub fn version(&self) -> (u32, u32) {
        self.inner().api.version()
    }

    /// Last error recorded by the native engine for this instance.
    pub fn errno(&self) -> Result<UcErr> {
        let h = self.resolve_handle()?;
        self.inner().trace("errno", h);
        Ok(self.inner().api.errno(h))
    }

    /// uc_query: QUERY_MODE / QUERY_PAGE_SIZE / QUERY_ARCH / QUERY_TIMEOUT.
    pub fn query(&self, kind: i32) -> Result<usize> {
        let h = self.resolve_handle()?;
        self.inner().trace("query", h);
        check("query", self.inner().api.query(h, kind))
    }

    /// Emulate from `begin` until `until` is reached. `timeout_us` and `count`
    /// (0 = unlimited) are budgets enforced by the engine.
    pub fn emu_start(&self, begin: u64, until: u64, timeout_us: u64, count: usize) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("emu_start", h);
        check(
            "emu_start",
            self.inner().api.emu_start(h, begin, until, timeout_us, count),
        )
    }

    /// Request a halt; usually called from inside a hook.
    pub fn emu_stop(&self) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("emu_stop", h);
        check("emu_stop", self.inner().api.emu_stop(h))
    }
}

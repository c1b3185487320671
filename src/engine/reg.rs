//! Register pass-through.

use anyhow::Result;

use super::core::Engine;
use crate::status::check;

impl Engine {
    pub fn reg_read(&self, regid: i32) -> Result<u64> {
        let h = self.resolve_handle()?;
        self.inner().trace("reg_read", h);
        check("reg_read", self.inner().api.reg_read(h, regid))
    }

    pub fn reg_write(&self, regid: i32, value: u64) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("reg_write", h);
        check("reg_write", self.inner().api.reg_write(h, regid, value))
    }

    /// Values come back in the order of `regids`.
    pub fn reg_read_batch(&self, regids: &[i32]) -> Result<Vec<u64>> {
        let h = self.resolve_handle()?;
        self.inner().trace("reg_read_batch", h);
        check("reg_read_batch", self.inner().api.reg_read_batch(h, regids))
    }

    pub fn reg_write_batch(&self, regs: &[(i32, u64)]) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("reg_write_batch", h);
        check("reg_write_batch", self.inner().api.reg_write_batch(h, regs))
    }
}

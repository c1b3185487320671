//! Memory pass-through.

use anyhow::Result;

use super::core::Engine;
use crate::native::MemRegion;
use crate::status::check;

impl Engine {
    pub fn mem_map(&self, address: u64, size: usize, perms: u32) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_map", h);
        check("mem_map", self.inner().api.mem_map(h, address, size, perms))
    }

    pub fn mem_unmap(&self, address: u64, size: usize) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_unmap", h);
        check("mem_unmap", self.inner().api.mem_unmap(h, address, size))
    }

    pub fn mem_protect(&self, address: u64, size: usize, perms: u32) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_protect", h);
        check("mem_protect", self.inner().api.mem_protect(h, address, size, perms))
    }

    /// Read `size` bytes at `address`.
    pub fn mem_read(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_read", h);
        let mut buf = vec![0u8; size];
        check("mem_read", self.inner().api.mem_read(h, address, &mut buf))?;
        Ok(buf)
    }

    pub fn mem_write(&self, address: u64, data: &[u8]) -> Result<()> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_write", h);
        check("mem_write", self.inner().api.mem_write(h, address, data))
    }

    pub fn mem_regions(&self) -> Result<Vec<MemRegion>> {
        let h = self.resolve_handle()?;
        self.inner().trace("mem_regions", h);
        check("mem_regions", self.inner().api.mem_regions(h))
    }
}

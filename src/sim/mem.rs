//! Page-granular guest memory of the reference engine.
//!
//! Host access (read/write) ignores permissions, as uc_mem_read/uc_mem_write do;
//! only instruction fetch checks PROT_EXEC.

use std::collections::BTreeMap;

use crate::consts::{PROT_ALL, PROT_EXEC, SIM_PAGE_SIZE};
use crate::native::{MemRegion, NativeResult};
use crate::status::UcErr;

#[derive(Clone, Debug)]
struct Page {
    perms: u32,
    data: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct PageMap {
    // page base -> page
    pages: BTreeMap<u64, Page>,
}

#[inline]
fn page_base(address: u64) -> u64 {
    address & !(SIM_PAGE_SIZE - 1)
}

/// Validate an aligned, non-empty, non-wrapping range and return its page bases.
fn page_range(address: u64, size: usize) -> NativeResult<std::ops::Range<u64>> {
    let size = size as u64;
    if size == 0 || address % SIM_PAGE_SIZE != 0 || size % SIM_PAGE_SIZE != 0 {
        return Err(UcErr::ARG);
    }
    let end = address.checked_add(size).ok_or(UcErr::ARG)?;
    Ok(address / SIM_PAGE_SIZE..end / SIM_PAGE_SIZE)
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, address: u64, size: usize, perms: u32) -> NativeResult<()> {
        if perms & !PROT_ALL != 0 {
            return Err(UcErr::ARG);
        }
        let range = page_range(address, size)?;
        if range
            .clone()
            .any(|p| self.pages.contains_key(&(p * SIM_PAGE_SIZE)))
        {
            return Err(UcErr::MAP);
        }
        for p in range {
            self.pages.insert(
                p * SIM_PAGE_SIZE,
                Page {
                    perms,
                    data: vec![0u8; SIM_PAGE_SIZE as usize],
                },
            );
        }
        Ok(())
    }

    pub fn unmap(&mut self, address: u64, size: usize) -> NativeResult<()> {
        let range = page_range(address, size)?;
        if !self.all_mapped(range.clone()) {
            return Err(UcErr::NOMEM);
        }
        for p in range {
            self.pages.remove(&(p * SIM_PAGE_SIZE));
        }
        Ok(())
    }

    pub fn protect(&mut self, address: u64, size: usize, perms: u32) -> NativeResult<()> {
        if perms & !PROT_ALL != 0 {
            return Err(UcErr::ARG);
        }
        let range = page_range(address, size)?;
        if !self.all_mapped(range.clone()) {
            return Err(UcErr::NOMEM);
        }
        for p in range {
            if let Some(page) = self.pages.get_mut(&(p * SIM_PAGE_SIZE)) {
                page.perms = perms;
            }
        }
        Ok(())
    }

    fn all_mapped(&self, mut range: std::ops::Range<u64>) -> bool {
        range.all(|p| self.pages.contains_key(&(p * SIM_PAGE_SIZE)))
    }

    /// Every byte of [address, address+len) must be mapped.
    fn check_span(&self, address: u64, len: usize, err: UcErr) -> NativeResult<()> {
        if len == 0 {
            return Ok(());
        }
        let last = address.checked_add(len as u64 - 1).ok_or(err)?;
        let mut base = page_base(address);
        loop {
            if !self.pages.contains_key(&base) {
                return Err(err);
            }
            if base >= page_base(last) {
                return Ok(());
            }
            base += SIM_PAGE_SIZE;
        }
    }

    pub fn read(&self, address: u64, buf: &mut [u8]) -> NativeResult<()> {
        self.check_span(address, buf.len(), UcErr::READ_UNMAPPED)?;
        for (i, b) in buf.iter_mut().enumerate() {
            let a = address + i as u64;
            let page = &self.pages[&page_base(a)];
            *b = page.data[(a - page_base(a)) as usize];
        }
        Ok(())
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> NativeResult<()> {
        self.check_span(address, data.len(), UcErr::WRITE_UNMAPPED)?;
        for (i, b) in data.iter().enumerate() {
            let a = address + i as u64;
            if let Some(page) = self.pages.get_mut(&page_base(a)) {
                page.data[(a - page_base(a)) as usize] = *b;
            }
        }
        Ok(())
    }

    /// Instruction fetch: mapped and executable.
    pub fn fetch(&self, address: u64) -> NativeResult<u8> {
        let base = page_base(address);
        let page = self.pages.get(&base).ok_or(UcErr::FETCH_UNMAPPED)?;
        if page.perms & PROT_EXEC == 0 {
            return Err(UcErr::FETCH_PROT);
        }
        Ok(page.data[(address - base) as usize])
    }

    /// Mapped regions, adjacent pages with equal permissions merged.
    pub fn regions(&self) -> Vec<MemRegion> {
        let mut out: Vec<MemRegion> = Vec::new();
        for (&base, page) in &self.pages {
            let end = base + (SIM_PAGE_SIZE - 1);
            match out.last_mut() {
                Some(r) if r.perms == page.perms && r.end.wrapping_add(1) == base => r.end = end,
                _ => out.push(MemRegion {
                    begin: base,
                    end,
                    perms: page.perms,
                }),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{PROT_READ, PROT_WRITE};

    #[test]
    fn map_rejects_unaligned_and_overlap() {
        let mut m = PageMap::new();
        assert_eq!(m.map(0x1001, 0x1000, PROT_ALL), Err(UcErr::ARG));
        assert_eq!(m.map(0x1000, 0x10, PROT_ALL), Err(UcErr::ARG));
        assert_eq!(m.map(0x1000, 0, PROT_ALL), Err(UcErr::ARG));
        m.map(0x1000, 0x2000, PROT_ALL).unwrap();
        assert_eq!(m.map(0x2000, 0x1000, PROT_ALL), Err(UcErr::MAP));
    }

    #[test]
    fn read_write_across_pages() {
        let mut m = PageMap::new();
        m.map(0x1000, 0x2000, PROT_READ | PROT_WRITE).unwrap();
        m.write(0x1ffe, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        m.read(0x1ffe, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(m.write(0x2ffe, &[0; 4]), Err(UcErr::WRITE_UNMAPPED));
        assert_eq!(m.read(0x0fff, &mut buf), Err(UcErr::READ_UNMAPPED));
    }

    #[test]
    fn regions_merge_and_split_on_protect() {
        let mut m = PageMap::new();
        m.map(0x1000, 0x3000, PROT_ALL).unwrap();
        assert_eq!(
            m.regions(),
            vec![MemRegion { begin: 0x1000, end: 0x3fff, perms: PROT_ALL }]
        );

        m.protect(0x2000, 0x1000, PROT_READ).unwrap();
        assert_eq!(
            m.regions(),
            vec![
                MemRegion { begin: 0x1000, end: 0x1fff, perms: PROT_ALL },
                MemRegion { begin: 0x2000, end: 0x2fff, perms: PROT_READ },
                MemRegion { begin: 0x3000, end: 0x3fff, perms: PROT_ALL },
            ]
        );

        m.unmap(0x1000, 0x1000).unwrap();
        assert_eq!(m.regions().len(), 2);
        assert_eq!(m.unmap(0x1000, 0x1000), Err(UcErr::NOMEM));
    }

    #[test]
    fn fetch_needs_exec() {
        let mut m = PageMap::new();
        m.map(0x1000, 0x1000, PROT_READ).unwrap();
        assert_eq!(m.fetch(0x1000), Err(UcErr::FETCH_PROT));
        assert_eq!(m.fetch(0x5000), Err(UcErr::FETCH_UNMAPPED));
        m.protect(0x1000, 0x1000, PROT_EXEC).unwrap();
        assert_eq!(m.fetch(0x1000), Ok(0));
    }
}

//! One instance of the reference CPU: registers, memory, hooks, run flags.

use std::collections::HashMap;

use crate::consts::*;
use crate::native::{NativeHookFn, NativeHookId, NativeResult};
use crate::status::UcErr;

use super::mem::PageMap;

pub(crate) struct SimHook {
    pub id: NativeHookId,
    pub kind: u32,
    pub begin: u64,
    pub end: u64,
    pub callback: NativeHookFn,
}

impl SimHook {
    /// begin > end: whole address space.
    #[inline]
    pub fn covers(&self, address: u64) -> bool {
        self.begin > self.end || (self.begin <= address && address <= self.end)
    }
}

pub(crate) struct Machine {
    pub arch: i32,
    pub mode: i32,
    pub regs: HashMap<i32, u64>,
    pub mem: PageMap,
    pub hooks: Vec<SimHook>,
    pub errno: UcErr,
    pub running: bool,
    pub stop_requested: bool,
    pub timed_out: bool,
}

/// Check an (arch, mode) pair the same way the native library does.
pub(crate) fn validate(arch: i32, mode: i32) -> NativeResult<()> {
    let endian = mode & MODE_BIG_ENDIAN;
    let core = mode & !MODE_BIG_ENDIAN;
    let ok = match arch {
        ARCH_X86 => endian == 0 && (core == MODE_16 || core == MODE_32 || core == MODE_64),
        ARCH_ARM => core == MODE_ARM || core == MODE_THUMB,
        ARCH_ARM64 => core == MODE_ARM,
        ARCH_MIPS => core == MODE_32 || core == MODE_64,
        ARCH_RISCV => endian == 0 && (core == MODE_32 || core == MODE_64),
        _ => return Err(UcErr::ARCH),
    };
    if ok {
        Ok(())
    } else {
        Err(UcErr::MODE)
    }
}

impl Machine {
    pub fn new(arch: i32, mode: i32) -> Self {
        Self {
            arch,
            mode,
            regs: HashMap::new(),
            mem: PageMap::new(),
            hooks: Vec::new(),
            errno: UcErr::OK,
            running: false,
            stop_requested: false,
            timed_out: false,
        }
    }

    #[inline]
    pub fn pc_reg(&self) -> i32 {
        pc_reg(self.arch, self.mode)
    }

    #[inline]
    pub fn reg(&self, id: i32) -> u64 {
        self.regs.get(&id).copied().unwrap_or(0)
    }

    pub fn reg_read(&self, id: i32) -> NativeResult<u64> {
        if id <= 0 {
            return Err(UcErr::ARG);
        }
        Ok(self.reg(id))
    }

    pub fn reg_write(&mut self, id: i32, value: u64) -> NativeResult<()> {
        if id <= 0 {
            return Err(UcErr::ARG);
        }
        // 16/32-битные режимы x86 обрезают PC.
        let value = match (self.arch, id) {
            (ARCH_X86, X86_REG_IP) => value & 0xffff,
            (ARCH_X86, X86_REG_EIP) => value & 0xffff_ffff,
            _ => value,
        };
        self.regs.insert(id, value);
        Ok(())
    }
}

/// Saved state held by a native context.
#[derive(Clone)]
pub(crate) struct SavedContext {
    pub arch: i32,
    pub mode: i32,
    pub state: Option<(HashMap<i32, u64>, PageMap)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_arch_mode() {
        assert!(validate(ARCH_X86, MODE_64).is_ok());
        assert!(validate(ARCH_X86, MODE_16).is_ok());
        assert_eq!(validate(ARCH_X86, MODE_THUMB), Err(UcErr::MODE));
        assert_eq!(validate(ARCH_X86, MODE_32 | MODE_BIG_ENDIAN), Err(UcErr::MODE));
        assert!(validate(ARCH_ARM, MODE_THUMB | MODE_BIG_ENDIAN).is_ok());
        assert!(validate(ARCH_MIPS, MODE_32 | MODE_BIG_ENDIAN).is_ok());
        assert_eq!(validate(ARCH_PPC, MODE_32), Err(UcErr::ARCH));
        assert_eq!(validate(99, MODE_32), Err(UcErr::ARCH));
    }

    #[test]
    fn pc_register_by_mode() {
        assert_eq!(Machine::new(ARCH_X86, MODE_64).pc_reg(), X86_REG_RIP);
        assert_eq!(Machine::new(ARCH_X86, MODE_32).pc_reg(), X86_REG_EIP);
        assert_eq!(Machine::new(ARCH_X86, MODE_16).pc_reg(), X86_REG_IP);
        assert_eq!(Machine::new(ARCH_ARM64, MODE_ARM).pc_reg(), ARM64_REG_PC);
    }

    #[test]
    fn eip_truncates() {
        let mut m = Machine::new(ARCH_X86, MODE_32);
        m.reg_write(X86_REG_EIP, 0x1_2345_6789).unwrap();
        assert_eq!(m.reg(X86_REG_EIP), 0x2345_6789);
        assert_eq!(m.reg_read(X86_REG_INVALID), Err(UcErr::ARG));
    }
}

//! Общие константы движка (совместимы по значениям с unicorn 2.x).
//!
//! Значения передаются в NativeApi как есть: мост их не интерпретирует,
//! кроме HOOK_CODE (диспетчеризация) и регистров PC в эталонном движке (sim).

// -------- Architectures --------
pub const ARCH_ARM: i32 = 1;
pub const ARCH_ARM64: i32 = 2;
pub const ARCH_MIPS: i32 = 3;
pub const ARCH_X86: i32 = 4;
pub const ARCH_PPC: i32 = 5;
pub const ARCH_SPARC: i32 = 6;
pub const ARCH_M68K: i32 = 7;
pub const ARCH_RISCV: i32 = 8;
pub const ARCH_MAX: i32 = 12;

// -------- Modes --------
pub const MODE_LITTLE_ENDIAN: i32 = 0;
pub const MODE_BIG_ENDIAN: i32 = 1 << 30;
pub const MODE_ARM: i32 = 0;
pub const MODE_THUMB: i32 = 1 << 4;
pub const MODE_16: i32 = 1 << 1;
pub const MODE_32: i32 = 1 << 2;
pub const MODE_64: i32 = 1 << 3;

// -------- Status codes (uc_err) --------
pub const ERR_OK: i32 = 0;
pub const ERR_NOMEM: i32 = 1;
pub const ERR_ARCH: i32 = 2;
pub const ERR_HANDLE: i32 = 3;
pub const ERR_MODE: i32 = 4;
pub const ERR_VERSION: i32 = 5;
pub const ERR_READ_UNMAPPED: i32 = 6;
pub const ERR_WRITE_UNMAPPED: i32 = 7;
pub const ERR_FETCH_UNMAPPED: i32 = 8;
pub const ERR_HOOK: i32 = 9;
pub const ERR_INSN_INVALID: i32 = 10;
pub const ERR_MAP: i32 = 11;
pub const ERR_WRITE_PROT: i32 = 12;
pub const ERR_READ_PROT: i32 = 13;
pub const ERR_FETCH_PROT: i32 = 14;
pub const ERR_ARG: i32 = 15;
pub const ERR_READ_UNALIGNED: i32 = 16;
pub const ERR_WRITE_UNALIGNED: i32 = 17;
pub const ERR_FETCH_UNALIGNED: i32 = 18;
pub const ERR_HOOK_EXIST: i32 = 19;
pub const ERR_RESOURCE: i32 = 20;
pub const ERR_EXCEPTION: i32 = 21;

// -------- Memory permissions --------
pub const PROT_NONE: u32 = 0;
pub const PROT_READ: u32 = 1;
pub const PROT_WRITE: u32 = 2;
pub const PROT_EXEC: u32 = 4;
pub const PROT_ALL: u32 = PROT_READ | PROT_WRITE | PROT_EXEC;

// -------- Hook types --------
pub const HOOK_INTR: u32 = 1 << 0;
pub const HOOK_INSN: u32 = 1 << 1;
pub const HOOK_CODE: u32 = 1 << 2;
pub const HOOK_BLOCK: u32 = 1 << 3;
pub const HOOK_MEM_READ_UNMAPPED: u32 = 1 << 4;
pub const HOOK_MEM_WRITE_UNMAPPED: u32 = 1 << 5;
pub const HOOK_MEM_FETCH_UNMAPPED: u32 = 1 << 6;
pub const HOOK_MEM_READ: u32 = 1 << 10;
pub const HOOK_MEM_WRITE: u32 = 1 << 11;

// -------- Query types --------
pub const QUERY_MODE: i32 = 1;
pub const QUERY_PAGE_SIZE: i32 = 2;
pub const QUERY_ARCH: i32 = 3;
pub const QUERY_TIMEOUT: i32 = 4;

// -------- Engine version reported by the reference engine --------
pub const API_MAJOR: u32 = 2;
pub const API_MINOR: u32 = 0;

// -------- x86 registers (subset) --------
pub const X86_REG_INVALID: i32 = 0;
pub const X86_REG_AX: i32 = 3;
pub const X86_REG_EAX: i32 = 19;
pub const X86_REG_EBP: i32 = 20;
pub const X86_REG_EBX: i32 = 21;
pub const X86_REG_ECX: i32 = 22;
pub const X86_REG_EDI: i32 = 23;
pub const X86_REG_EDX: i32 = 24;
pub const X86_REG_EFLAGS: i32 = 25;
pub const X86_REG_EIP: i32 = 26;
pub const X86_REG_ESI: i32 = 29;
pub const X86_REG_ESP: i32 = 30;
pub const X86_REG_IP: i32 = 34;
pub const X86_REG_RAX: i32 = 35;
pub const X86_REG_RBP: i32 = 36;
pub const X86_REG_RBX: i32 = 37;
pub const X86_REG_RCX: i32 = 38;
pub const X86_REG_RDI: i32 = 39;
pub const X86_REG_RDX: i32 = 40;
pub const X86_REG_RIP: i32 = 41;
pub const X86_REG_RSI: i32 = 43;
pub const X86_REG_RSP: i32 = 44;

// -------- Program counters for the other architectures (sim) --------
pub const ARM_REG_PC: i32 = 11;
pub const ARM64_REG_PC: i32 = 260;
pub const MIPS_REG_PC: i32 = 1;
pub const RISCV_REG_PC: i32 = 33;

// Эталонный движок: однобайтовая инструкция останова.
pub const SIM_OP_HALT: u8 = 0xF4;
pub const SIM_PAGE_SIZE: u64 = 4096;

/// Program counter register id for an (arch, mode) pair.
pub fn pc_reg(arch: i32, mode: i32) -> i32 {
    match arch {
        ARCH_X86 if mode & MODE_64 != 0 => X86_REG_RIP,
        ARCH_X86 if mode & MODE_32 != 0 => X86_REG_EIP,
        ARCH_X86 => X86_REG_IP,
        ARCH_ARM => ARM_REG_PC,
        ARCH_ARM64 => ARM64_REG_PC,
        ARCH_MIPS => MIPS_REG_PC,
        _ => RISCV_REG_PC,
    }
}

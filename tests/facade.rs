use anyhow::Result;
use std::sync::Arc;

use ucbind::consts::*;
use ucbind::{bridge_error, BridgeConfig, Engine, HookSpec, MemRegion, NativeApi, SimBackend, UcErr};

fn open(sim: &Arc<SimBackend>, arch: i32, mode: i32) -> Result<Engine> {
    let api: Arc<dyn NativeApi> = sim.clone();
    Engine::open_with_config(api, arch, mode, BridgeConfig::default())
}

#[test]
fn memory_map_protect_unmap() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_64)?;

    e.mem_map(0x10000, 0x3000, PROT_ALL)?;
    e.mem_write(0x10ffe, &[0xde, 0xad, 0xbe, 0xef])?;
    assert_eq!(e.mem_read(0x10ffe, 4)?, vec![0xde, 0xad, 0xbe, 0xef]);

    e.mem_protect(0x11000, 0x1000, PROT_READ)?;
    assert_eq!(
        e.mem_regions()?,
        vec![
            MemRegion { begin: 0x10000, end: 0x10fff, perms: PROT_ALL },
            MemRegion { begin: 0x11000, end: 0x11fff, perms: PROT_READ },
            MemRegion { begin: 0x12000, end: 0x12fff, perms: PROT_ALL },
        ]
    );

    e.mem_unmap(0x12000, 0x1000)?;
    assert_eq!(e.mem_regions()?.len(), 2);
    assert_eq!(e.mem_regions()?[1].size(), 0x1000);

    let err = e.mem_map(0x10000, 0x1000, PROT_ALL).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_MAP));
    assert_eq!(e.errno()?, UcErr::MAP);

    let err = e.mem_read(0x12000, 1).unwrap_err();
    assert_eq!(
        bridge_error(&err).and_then(|b| b.native_code()),
        Some(ERR_READ_UNMAPPED)
    );
    assert!(err.to_string().starts_with("mem_read failed"));
    e.close()?;
    Ok(())
}

#[test]
fn registers_single_and_batch() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_64)?;

    e.reg_write(X86_REG_RAX, 0x1122_3344_5566_7788)?;
    assert_eq!(e.reg_read(X86_REG_RAX)?, 0x1122_3344_5566_7788);

    e.reg_write_batch(&[(X86_REG_RBX, 1), (X86_REG_RCX, 2)])?;
    assert_eq!(
        e.reg_read_batch(&[X86_REG_RAX, X86_REG_RBX, X86_REG_RCX])?,
        vec![0x1122_3344_5566_7788, 1, 2]
    );
    assert!(e.reg_read_batch(&[])?.is_empty());

    let err = e.reg_read(X86_REG_INVALID).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_ARG));
    e.close()?;
    Ok(())
}

#[test]
fn query_and_version() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_ARM, MODE_THUMB)?;
    assert_eq!(e.query(QUERY_MODE)?, MODE_THUMB as usize);
    assert_eq!(e.query(QUERY_ARCH)?, ARCH_ARM as usize);
    assert_eq!(e.query(QUERY_PAGE_SIZE)?, SIM_PAGE_SIZE as usize);
    assert_eq!(e.query(QUERY_TIMEOUT)?, 0);
    assert!(e.query(99).is_err());
    assert_eq!(e.version(), (API_MAJOR, API_MINOR));
    assert_eq!(e.errno()?, UcErr::ARG);
    e.close()?;
    // version не требует открытого движка
    assert_eq!(e.version(), (API_MAJOR, API_MINOR));
    Ok(())
}

#[test]
fn emu_count_budget() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_32)?;
    e.mem_map(0x1000, 0x1000, PROT_ALL)?;
    e.mem_write(0x1000, &[0x90; 64])?;

    e.emu_start(0x1000, 0, 0, 10)?;
    assert_eq!(e.reg_read(X86_REG_EIP)?, 0x100a);
    e.emu_start(0x1000, 0x1020, 0, 0)?;
    assert_eq!(e.reg_read(X86_REG_EIP)?, 0x1020);
    e.close()?;
    Ok(())
}

#[test]
fn emu_timeout_budget() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_64)?;
    e.mem_map(0x1000, 0x1000, PROT_ALL)?;
    e.mem_write(0x1000, &[0x90; 8])?;

    // бесконечный цикл: хук на 0x1004 возвращает PC в начало
    e.hook_add(
        HookSpec::code().with_range(0x1004, 0x1004),
        |eng: &Engine, _: u64, _: u32| {
            eng.reg_write(X86_REG_RIP, 0x1000).expect("loop back");
        },
    )?;
    e.emu_start(0x1000, 0, 20_000, 0)?;
    assert_eq!(e.query(QUERY_TIMEOUT)?, 1);
    assert!(e.reg_read(X86_REG_RIP)? < 0x1005);
    e.close()?;
    Ok(())
}

#[test]
fn fetch_without_exec_permission() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_RISCV, MODE_64)?;
    e.mem_map(0x1000, 0x1000, PROT_READ | PROT_WRITE)?;
    let err = e.emu_start(0x1000, 0, 0, 0).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_FETCH_PROT));
    assert_eq!(e.errno()?, UcErr::FETCH_PROT);
    assert_eq!(e.reg_read(RISCV_REG_PC)?, 0x1000);
    e.close()?;
    Ok(())
}

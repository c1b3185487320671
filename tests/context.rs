use anyhow::Result;
use std::sync::Arc;

use ucbind::consts::*;
use ucbind::{bridge_error, BridgeConfig, Context, Engine, NativeApi, NativeCall, SimBackend};

fn open(sim: &Arc<SimBackend>, arch: i32, mode: i32) -> Result<Engine> {
    let api: Arc<dyn NativeApi> = sim.clone();
    Engine::open_with_config(api, arch, mode, BridgeConfig::default())
}

#[test]
fn save_without_context_allocates_new_one() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_64)?;

    let a = e.context_save(None)?;
    let b = e.context_save(None)?;
    assert!(!a.same_as(&b));
    assert_ne!(a.raw(), b.raw());
    assert_eq!(sim.live_contexts(), 2);
    e.close()?;
    Ok(())
}

#[test]
fn save_into_existing_context_keeps_identity_and_refreshes() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_X86, MODE_64)?;
    e.mem_map(0x4000, 0x1000, PROT_READ | PROT_WRITE)?;

    e.reg_write(X86_REG_RAX, 1)?;
    e.mem_write(0x4000, b"one")?;
    let s = e.context_save(None)?;

    e.reg_write(X86_REG_RAX, 2)?;
    e.mem_write(0x4000, b"two")?;
    let s2 = e.context_save(Some(s.clone()))?;
    assert!(s2.same_as(&s));
    assert_eq!(s2.raw(), s.raw());

    e.reg_write(X86_REG_RAX, 3)?;
    e.mem_write(0x4000, b"333")?;
    e.context_restore(&s)?;
    assert_eq!(e.reg_read(X86_REG_RAX)?, 2);
    assert_eq!(e.mem_read(0x4000, 3)?, b"two".to_vec());

    // одна аллокация на два save
    let h = e.resolve_handle()?;
    let allocs = sim
        .journal()
        .iter()
        .filter(|c| matches!(c, NativeCall::ContextAlloc(x, _) if *x == h))
        .count();
    assert_eq!(allocs, 1);
    e.close()?;
    Ok(())
}

#[test]
fn context_outlives_engine_and_moves_between_engines() -> Result<()> {
    let sim = SimBackend::new();
    let a = open(&sim, ARCH_X86, MODE_64)?;
    a.reg_write(X86_REG_RBX, 0xfeed)?;
    let ctx = a.context_save(None)?;
    a.close()?;
    drop(a);

    let b = open(&sim, ARCH_X86, MODE_64)?;
    assert_eq!(b.reg_read(X86_REG_RBX)?, 0);
    b.context_restore(&ctx)?;
    assert_eq!(b.reg_read(X86_REG_RBX)?, 0xfeed);
    b.close()?;

    // контекст жив, пока жив хоть один клон
    let raw = ctx.raw();
    let clone = ctx.clone();
    drop(ctx);
    assert_eq!(sim.live_contexts(), 1);
    drop(clone);
    assert_eq!(sim.live_contexts(), 0);
    let frees = sim
        .journal()
        .iter()
        .filter(|c| **c == NativeCall::ContextFree(raw))
        .count();
    assert_eq!(frees, 1);
    Ok(())
}

#[test]
fn restore_into_incompatible_engine_fails() -> Result<()> {
    let sim = SimBackend::new();
    let x64 = open(&sim, ARCH_X86, MODE_64)?;
    let x32 = open(&sim, ARCH_X86, MODE_32)?;
    let arm = open(&sim, ARCH_ARM, MODE_ARM)?;
    let ctx = x64.context_save(None)?;

    let err = x32.context_restore(&ctx).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_MODE));
    let err = arm.context_restore(&ctx).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_ARCH));

    // сохранение в контекст чужой архитектуры тоже отвергается
    let err = arm.context_save(Some(ctx.clone())).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_ARCH));

    for e in [x64, x32, arm] {
        e.close()?;
    }
    Ok(())
}

#[test]
fn restoring_unsaved_context_is_an_error() -> Result<()> {
    let sim = SimBackend::new();
    let e = open(&sim, ARCH_ARM64, MODE_ARM)?;
    let ctx = Context::alloc(&e)?;
    let err = e.context_restore(&ctx).unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_ARG));
    e.close()?;
    Ok(())
}

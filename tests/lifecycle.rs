use anyhow::Result;
use std::sync::Arc;

use ucbind::consts::*;
use ucbind::registry;
use ucbind::{
    bridge_error, BridgeConfig, BridgeError, Context, Engine, HookSpec, NativeApi, NativeCall,
    NativeHandle, NativeHookId, SimBackend, UcErr,
};

fn open_x86(sim: &Arc<SimBackend>) -> Result<Engine> {
    let api: Arc<dyn NativeApi> = sim.clone();
    Engine::open_with_config(api, ARCH_X86, MODE_64, BridgeConfig::default())
}

/// Журнал, отфильтрованный по одному handle.
fn calls_for(sim: &SimBackend, h: NativeHandle) -> Vec<NativeCall> {
    sim.journal()
        .into_iter()
        .filter(|c| match c {
            NativeCall::Open(x)
            | NativeCall::Close(x)
            | NativeCall::EmuStart(x)
            | NativeCall::EmuStop(x) => *x == h,
            NativeCall::HookAdd(x, _)
            | NativeCall::HookDel(x, _)
            | NativeCall::ContextAlloc(x, _)
            | NativeCall::ContextSave(x, _)
            | NativeCall::ContextRestore(x, _) => *x == h,
            NativeCall::ContextFree(_) => false,
        })
        .collect()
}

fn assert_closed_err(r: Result<impl std::fmt::Debug>) {
    let err = r.expect_err("operation on closed engine must fail");
    assert!(
        matches!(bridge_error(&err), Some(BridgeError::EngineClosed)),
        "unexpected error: {:#}",
        err
    );
    assert_eq!(err.to_string(), "attempted to use closed engine");
}

#[test]
fn close_twice_calls_native_close_once() -> Result<()> {
    let sim = SimBackend::new();
    let e = open_x86(&sim)?;
    let h = e.resolve_handle()?;
    assert!(!e.is_closed());

    e.close()?;
    e.close()?;
    assert!(e.is_closed());
    assert_eq!(sim.close_calls(h), 1);
    assert!(!sim.is_open(h));

    // финализатор после явного close ничего не делает
    drop(e);
    assert_eq!(sim.close_calls(h), 1);
    Ok(())
}

#[test]
fn every_operation_fails_after_close() -> Result<()> {
    let sim = SimBackend::new();
    let e = open_x86(&sim)?;
    let other = open_x86(&sim)?;
    let ctx = other.context_save(None)?;
    e.close()?;

    assert_closed_err(e.resolve_handle());
    assert_closed_err(e.errno());
    assert_closed_err(e.query(QUERY_MODE));
    assert_closed_err(e.emu_start(0x1000, 0, 0, 0));
    assert_closed_err(e.emu_stop());
    assert_closed_err(e.mem_map(0x1000, 0x1000, PROT_ALL));
    assert_closed_err(e.mem_unmap(0x1000, 0x1000));
    assert_closed_err(e.mem_protect(0x1000, 0x1000, PROT_READ));
    assert_closed_err(e.mem_read(0x1000, 4));
    assert_closed_err(e.mem_write(0x1000, &[1, 2, 3]));
    assert_closed_err(e.mem_regions());
    assert_closed_err(e.reg_read(X86_REG_RAX));
    assert_closed_err(e.reg_write(X86_REG_RAX, 1));
    assert_closed_err(e.reg_read_batch(&[X86_REG_RAX, X86_REG_RIP]));
    assert_closed_err(e.reg_write_batch(&[(X86_REG_RAX, 1)]));
    assert_closed_err(e.hook_add(HookSpec::code(), |_: &Engine, _: u64, _: u32| {}));
    assert_closed_err(e.hook_del(NativeHookId(1)));
    assert_closed_err(e.context_save(None));
    assert_closed_err(e.context_save(Some(ctx.clone())));
    assert_closed_err(e.context_restore(&ctx));
    assert_closed_err(Context::alloc(&e));

    // закрытый движок не делает нативных вызовов
    assert_eq!(e.hook_count(), 0);
    assert!(e.hook_ids().is_empty());
    other.close()?;
    Ok(())
}

#[test]
fn close_then_use_end_to_end() -> Result<()> {
    let sim = SimBackend::new();
    let w1 = open_x86(&sim)?;
    let h1 = w1.resolve_handle()?;
    assert!(registry::lookup(h1)?.same_as(&w1));

    let k1 = w1.hook_add(HookSpec::code(), |_: &Engine, _: u64, _: u32| {})?;
    assert_eq!(w1.hook_ids(), vec![k1]);

    w1.close()?;

    assert_eq!(
        calls_for(&sim, h1),
        vec![
            NativeCall::Open(h1),
            NativeCall::HookAdd(h1, k1),
            NativeCall::HookDel(h1, k1),
            NativeCall::Close(h1),
        ]
    );
    assert!(matches!(
        bridge_error(&registry::lookup(h1).unwrap_err()),
        Some(BridgeError::NotRegistered { .. })
    ));
    assert!(w1.is_closed());
    assert_closed_err(w1.reg_read(X86_REG_RIP));
    Ok(())
}

#[test]
fn dropping_last_reference_runs_full_close() -> Result<()> {
    let sim = SimBackend::new();
    let e = open_x86(&sim)?;
    let h = e.resolve_handle()?;
    let k1 = e.hook_add(HookSpec::code(), |_: &Engine, _: u64, _: u32| {})?;
    let k2 = e.hook_add(HookSpec::code(), |_: &Engine, _: u64, _: u32| {})?;

    let clone = e.clone();
    drop(e);
    // клон ещё держит движок
    assert!(sim.is_open(h));
    assert_eq!(sim.close_calls(h), 0);

    drop(clone);
    assert_eq!(sim.close_calls(h), 1);
    assert!(!sim.is_open(h));
    assert!(!registry::contains(h));

    let tail: Vec<NativeCall> = calls_for(&sim, h).into_iter().skip(3).collect();
    assert_eq!(
        tail,
        vec![
            NativeCall::HookDel(h, k1),
            NativeCall::HookDel(h, k2),
            NativeCall::Close(h),
        ]
    );
    Ok(())
}

#[test]
fn native_close_failure_is_reported_once() -> Result<()> {
    let sim = SimBackend::new();
    let e = open_x86(&sim)?;
    let h = e.resolve_handle()?;

    sim.fail_next_close(UcErr::RESOURCE);
    let err = e.close().unwrap_err();
    match bridge_error(&err) {
        Some(BridgeError::CloseFailed { handle, code, .. }) => {
            assert_eq!(*handle, h);
            assert_eq!(*code, ERR_RESOURCE);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(bridge_error(&err).map(|b| !b.is_usage()).unwrap_or(false));

    // обёртка всё равно CLOSED и снята с реестра; повторов native close нет
    assert!(e.is_closed());
    assert!(!registry::contains(h));
    e.close()?;
    drop(e);
    assert_eq!(sim.close_calls(h), 1);

    // нативный экземпляр остался в неопределённом состоянии
    assert!(sim.is_open(h));
    sim.close(h)?;
    Ok(())
}

#[test]
fn open_rejects_bad_arch_and_mode() -> Result<()> {
    let sim = SimBackend::new();
    let api: Arc<dyn NativeApi> = sim.clone();

    let err = Engine::open_with_config(api.clone(), 99, MODE_32, BridgeConfig::default())
        .unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_ARCH));

    let err = Engine::open_with_config(api, ARCH_X86, MODE_THUMB, BridgeConfig::default())
        .unwrap_err();
    assert_eq!(bridge_error(&err).and_then(|b| b.native_code()), Some(ERR_MODE));
    assert_eq!(sim.live_engines(), 0);
    Ok(())
}

#[test]
fn clones_share_state() -> Result<()> {
    let sim = SimBackend::new();
    let a = open_x86(&sim)?;
    let b = a.clone();
    assert!(a.same_as(&b));
    assert_eq!(a.config().close_failure, b.config().close_failure);

    b.close()?;
    assert!(a.is_closed());
    assert_closed_err(a.errno());
    Ok(())
}

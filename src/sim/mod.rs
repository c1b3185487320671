//! sim - in-process reference implementation of NativeApi.
//!
//! Модель CPU:
//! - каждый байт - одна инструкция длиной 1, SIM_OP_HALT (0xF4) останавливает эмуляцию;
//! - code-хуки вызываются перед исполнением инструкции; emu_stop из хука - инструкция
//!   не исполняется; запись PC из хука - переход;
//! - fetch требует PROT_EXEC, mem_read/mem_write права не проверяют.
//!
//! Дополнительно для тестов:
//! - журнал lifecycle-вызовов (open/close/hook/context/emu) - порядок и "ровно один раз";
//! - инъекция ошибок: fail_next_close(), fail_hook_del().
//!
//! Хэндлы берутся из процесс-глобального счётчика, поэтому разные SimBackend никогда
//! не выдают одинаковые NativeHandle (реестр хэндлов тоже процесс-глобальный).

mod machine;
pub mod mem;

use log::trace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::consts::*;
use crate::native::{
    MemRegion, NativeApi, NativeContext, NativeHandle, NativeHookFn, NativeHookId, NativeResult,
};
use crate::status::UcErr;
use crate::util::lock;

use machine::{validate, Machine, SavedContext, SimHook};

static NEXT_ID: AtomicU64 = AtomicU64::new(0x7f00_0000_1000);

fn next_id() -> u64 {
    // выглядит как выровненный указатель
    NEXT_ID.fetch_add(0x40, Ordering::Relaxed)
}

/// Lifecycle-relevant native calls, in the order the engine received them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeCall {
    Open(NativeHandle),
    Close(NativeHandle),
    HookAdd(NativeHandle, NativeHookId),
    HookDel(NativeHandle, NativeHookId),
    ContextAlloc(NativeHandle, NativeContext),
    ContextSave(NativeHandle, NativeContext),
    ContextRestore(NativeHandle, NativeContext),
    ContextFree(NativeContext),
    EmuStart(NativeHandle),
    EmuStop(NativeHandle),
}

#[derive(Default)]
struct Faults {
    // one-shot
    close: Option<UcErr>,
    // until cleared
    hook_del: Option<UcErr>,
}

#[derive(Default)]
struct SimState {
    machines: HashMap<NativeHandle, Machine>,
    contexts: HashMap<NativeContext, SavedContext>,
    journal: Vec<NativeCall>,
    faults: Faults,
}

/// Reference engine. Share it as `Arc<SimBackend>` / `Arc<dyn NativeApi>`.
#[derive(Default)]
pub struct SimBackend {
    state: Mutex<SimState>,
}

impl SimBackend {
    pub fn new() -> Arc<SimBackend> {
        Arc::new(SimBackend::default())
    }

    /// Copy of the call journal.
    pub fn journal(&self) -> Vec<NativeCall> {
        lock(&self.state).journal.clone()
    }

    /// How many times close was requested for `h` (failed attempts included).
    pub fn close_calls(&self, h: NativeHandle) -> usize {
        lock(&self.state)
            .journal
            .iter()
            .filter(|c| **c == NativeCall::Close(h))
            .count()
    }

    pub fn is_open(&self, h: NativeHandle) -> bool {
        lock(&self.state).machines.contains_key(&h)
    }

    pub fn live_engines(&self) -> usize {
        lock(&self.state).machines.len()
    }

    pub fn live_contexts(&self) -> usize {
        lock(&self.state).contexts.len()
    }

    /// Hooks the engine still holds for `h`.
    pub fn native_hooks(&self, h: NativeHandle) -> Vec<NativeHookId> {
        lock(&self.state)
            .machines
            .get(&h)
            .map(|m| m.hooks.iter().map(|k| k.id).collect())
            .unwrap_or_default()
    }

    /// The next close fails with `status` (the instance stays allocated).
    pub fn fail_next_close(&self, status: UcErr) {
        lock(&self.state).faults.close = Some(status);
    }

    /// Every hook_del fails with `status` until called again with None.
    pub fn fail_hook_del(&self, status: Option<UcErr>) {
        lock(&self.state).faults.hook_del = status;
    }

    /// Run `f` on machine `h` under the state lock.
    fn with_machine<R>(
        &self,
        h: NativeHandle,
        f: impl FnOnce(&mut Machine) -> NativeResult<R>,
    ) -> NativeResult<R> {
        let mut st = lock(&self.state);
        let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
        let r = f(m);
        if let Err(e) = &r {
            m.errno = *e;
        }
        r
    }
}

impl NativeApi for SimBackend {
    fn version(&self) -> (u32, u32) {
        (API_MAJOR, API_MINOR)
    }

    fn open(&self, arch: i32, mode: i32) -> NativeResult<NativeHandle> {
        validate(arch, mode)?;
        let h = NativeHandle(next_id());
        let mut st = lock(&self.state);
        st.machines.insert(h, Machine::new(arch, mode));
        st.journal.push(NativeCall::Open(h));
        trace!("sim: open {} (arch {}, mode {:#x})", h, arch, mode);
        Ok(h)
    }

    fn close(&self, h: NativeHandle) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::Close(h));
        if let Some(status) = st.faults.close.take() {
            return Err(status);
        }
        let removed = st.machines.remove(&h).ok_or(UcErr::HANDLE)?;
        drop(st);
        // колбэки хуков могут держать объекты хоста: освобождаем вне блокировки
        drop(removed);
        trace!("sim: close {}", h);
        Ok(())
    }

    fn errno(&self, h: NativeHandle) -> UcErr {
        lock(&self.state)
            .machines
            .get(&h)
            .map(|m| m.errno)
            .unwrap_or(UcErr::HANDLE)
    }

    fn query(&self, h: NativeHandle, kind: i32) -> NativeResult<usize> {
        self.with_machine(h, |m| match kind {
            QUERY_MODE => Ok(m.mode as usize),
            QUERY_PAGE_SIZE => Ok(SIM_PAGE_SIZE as usize),
            QUERY_ARCH => Ok(m.arch as usize),
            QUERY_TIMEOUT => Ok(m.timed_out as usize),
            _ => Err(UcErr::ARG),
        })
    }

    fn emu_start(
        &self,
        h: NativeHandle,
        begin: u64,
        until: u64,
        timeout_us: u64,
        count: usize,
    ) -> NativeResult<()> {
        let pc_reg = {
            let mut st = lock(&self.state);
            st.journal.push(NativeCall::EmuStart(h));
            let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
            if m.running {
                m.errno = UcErr::RESOURCE;
                return Err(UcErr::RESOURCE);
            }
            m.running = true;
            m.stop_requested = false;
            m.timed_out = false;
            m.errno = UcErr::OK;
            let pc_reg = m.pc_reg();
            m.reg_write(pc_reg, begin)?;
            pc_reg
        };

        let deadline = if timeout_us > 0 {
            Some(Instant::now() + Duration::from_micros(timeout_us))
        } else {
            None
        };
        let mut executed = 0usize;

        let result = loop {
            // 1) под блокировкой: бюджеты, fetch, снимок подходящих хуков
            let (pc, op, hooks) = {
                let mut st = lock(&self.state);
                let m = match st.machines.get_mut(&h) {
                    Some(m) => m,
                    None => break Err(UcErr::HANDLE),
                };
                if m.stop_requested {
                    break Ok(());
                }
                let pc = m.reg(pc_reg);
                if pc == until {
                    break Ok(());
                }
                if count > 0 && executed >= count {
                    break Ok(());
                }
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        m.timed_out = true;
                        break Ok(());
                    }
                }
                let op = match m.mem.fetch(pc) {
                    Ok(b) => b,
                    Err(e) => {
                        m.errno = e;
                        break Err(e);
                    }
                };
                let hooks: Vec<NativeHookFn> = m
                    .hooks
                    .iter()
                    .filter(|k| k.kind & HOOK_CODE != 0 && k.covers(pc))
                    .map(|k| k.callback.clone())
                    .collect();
                (pc, op, hooks)
            };

            // 2) колбэки без блокировки: они ходят обратно в API
            for cb in hooks {
                cb(h, pc, 1);
            }

            // 3) исполнение
            let mut st = lock(&self.state);
            let m = match st.machines.get_mut(&h) {
                Some(m) => m,
                None => break Err(UcErr::HANDLE),
            };
            if m.stop_requested {
                break Ok(());
            }
            if m.reg(pc_reg) != pc {
                continue;
            }
            executed += 1;
            let next = pc.wrapping_add(1);
            if let Err(e) = m.reg_write(pc_reg, next) {
                break Err(e);
            }
            if op == SIM_OP_HALT {
                break Ok(());
            }
        };

        if let Some(m) = lock(&self.state).machines.get_mut(&h) {
            m.running = false;
        }
        trace!("sim: emu_start {} finished after {} instructions: {:?}", h, executed, result);
        result
    }

    fn emu_stop(&self, h: NativeHandle) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::EmuStop(h));
        let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
        if m.running {
            m.stop_requested = true;
        }
        Ok(())
    }

    fn mem_map(&self, h: NativeHandle, address: u64, size: usize, perms: u32) -> NativeResult<()> {
        self.with_machine(h, |m| m.mem.map(address, size, perms))
    }

    fn mem_unmap(&self, h: NativeHandle, address: u64, size: usize) -> NativeResult<()> {
        self.with_machine(h, |m| m.mem.unmap(address, size))
    }

    fn mem_protect(
        &self,
        h: NativeHandle,
        address: u64,
        size: usize,
        perms: u32,
    ) -> NativeResult<()> {
        self.with_machine(h, |m| m.mem.protect(address, size, perms))
    }

    fn mem_read(&self, h: NativeHandle, address: u64, buf: &mut [u8]) -> NativeResult<()> {
        self.with_machine(h, |m| m.mem.read(address, buf))
    }

    fn mem_write(&self, h: NativeHandle, address: u64, data: &[u8]) -> NativeResult<()> {
        self.with_machine(h, |m| m.mem.write(address, data))
    }

    fn mem_regions(&self, h: NativeHandle) -> NativeResult<Vec<MemRegion>> {
        self.with_machine(h, |m| Ok(m.mem.regions()))
    }

    fn reg_read(&self, h: NativeHandle, regid: i32) -> NativeResult<u64> {
        self.with_machine(h, |m| m.reg_read(regid))
    }

    fn reg_write(&self, h: NativeHandle, regid: i32, value: u64) -> NativeResult<()> {
        self.with_machine(h, |m| m.reg_write(regid, value))
    }

    fn hook_add(
        &self,
        h: NativeHandle,
        kind: u32,
        begin: u64,
        end: u64,
        callback: NativeHookFn,
    ) -> NativeResult<NativeHookId> {
        // Эталонный движок умеет только code-хуки.
        if kind != HOOK_CODE {
            if let Some(m) = lock(&self.state).machines.get_mut(&h) {
                m.errno = UcErr::HOOK;
            }
            return Err(UcErr::HOOK);
        }
        let id = NativeHookId(next_id());
        let mut st = lock(&self.state);
        let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
        m.hooks.push(SimHook {
            id,
            kind,
            begin,
            end,
            callback,
        });
        st.journal.push(NativeCall::HookAdd(h, id));
        Ok(id)
    }

    fn hook_del(&self, h: NativeHandle, hook: NativeHookId) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::HookDel(h, hook));
        if let Some(status) = st.faults.hook_del {
            return Err(status);
        }
        let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
        let pos = m.hooks.iter().position(|k| k.id == hook).ok_or(UcErr::ARG)?;
        let removed = m.hooks.remove(pos);
        drop(st);
        drop(removed);
        Ok(())
    }

    fn context_alloc(&self, h: NativeHandle) -> NativeResult<NativeContext> {
        let mut st = lock(&self.state);
        let (arch, mode) = {
            let m = st.machines.get(&h).ok_or(UcErr::HANDLE)?;
            (m.arch, m.mode)
        };
        let ctx = NativeContext(next_id());
        st.contexts.insert(
            ctx,
            SavedContext {
                arch,
                mode,
                state: None,
            },
        );
        st.journal.push(NativeCall::ContextAlloc(h, ctx));
        Ok(ctx)
    }

    fn context_save(&self, h: NativeHandle, ctx: NativeContext) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::ContextSave(h, ctx));
        let snapshot = {
            let m = st.machines.get(&h).ok_or(UcErr::HANDLE)?;
            (m.arch, m.mode, m.regs.clone(), m.mem.clone())
        };
        let saved = st.contexts.get_mut(&ctx).ok_or(UcErr::HANDLE)?;
        if saved.arch != snapshot.0 {
            return Err(UcErr::ARCH);
        }
        saved.mode = snapshot.1;
        saved.state = Some((snapshot.2, snapshot.3));
        Ok(())
    }

    fn context_restore(&self, h: NativeHandle, ctx: NativeContext) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::ContextRestore(h, ctx));
        let saved = st.contexts.get(&ctx).ok_or(UcErr::HANDLE)?.clone();
        let m = st.machines.get_mut(&h).ok_or(UcErr::HANDLE)?;
        if saved.arch != m.arch {
            m.errno = UcErr::ARCH;
            return Err(UcErr::ARCH);
        }
        if saved.mode != m.mode {
            m.errno = UcErr::MODE;
            return Err(UcErr::MODE);
        }
        match saved.state {
            Some((regs, mem)) => {
                m.regs = regs;
                m.mem = mem;
                Ok(())
            }
            None => {
                m.errno = UcErr::ARG;
                Err(UcErr::ARG)
            }
        }
    }

    fn context_free(&self, ctx: NativeContext) -> NativeResult<()> {
        let mut st = lock(&self.state);
        st.journal.push(NativeCall::ContextFree(ctx));
        st.contexts.remove(&ctx).map(|_| ()).ok_or(UcErr::HANDLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn boot(sim: &SimBackend, code: &[u8]) -> NativeHandle {
        let h = sim.open(ARCH_X86, MODE_64).unwrap();
        sim.mem_map(h, 0x1000, 0x1000, PROT_ALL).unwrap();
        sim.mem_write(h, 0x1000, code).unwrap();
        h
    }

    #[test]
    fn runs_until_halt() {
        let sim = SimBackend::new();
        let h = boot(&sim, &[0x90, 0x90, SIM_OP_HALT, 0x90]);
        sim.emu_start(h, 0x1000, 0, 0, 0).unwrap();
        assert_eq!(sim.reg_read(h, X86_REG_RIP).unwrap(), 0x1003);
        sim.close(h).unwrap();
        assert!(!sim.is_open(h));
    }

    #[test]
    fn count_and_until_budgets() {
        let sim = SimBackend::new();
        let h = boot(&sim, &[0x90; 16]);
        sim.emu_start(h, 0x1000, 0, 0, 5).unwrap();
        assert_eq!(sim.reg_read(h, X86_REG_RIP).unwrap(), 0x1005);
        sim.emu_start(h, 0x1000, 0x1003, 0, 0).unwrap();
        assert_eq!(sim.reg_read(h, X86_REG_RIP).unwrap(), 0x1003);
        sim.close(h).unwrap();
    }

    #[test]
    fn fetch_from_unmapped_fails() {
        let sim = SimBackend::new();
        let h = boot(&sim, &[0x90]);
        assert_eq!(sim.emu_start(h, 0x8000, 0, 0, 0), Err(UcErr::FETCH_UNMAPPED));
        assert_eq!(sim.errno(h), UcErr::FETCH_UNMAPPED);
        sim.close(h).unwrap();
    }

    #[test]
    fn code_hook_sees_every_instruction() {
        let sim = SimBackend::new();
        let h = boot(&sim, &[0x90, 0x90, SIM_OP_HALT]);
        let seen = Arc::new(AtomicUsize::new(0));
        let s2 = seen.clone();
        let cb: NativeHookFn = Arc::new(move |_: NativeHandle, _: u64, size: u32| {
            assert_eq!(size, 1);
            s2.fetch_add(1, Ordering::SeqCst);
        });
        let id = sim.hook_add(h, HOOK_CODE, 1, 0, cb.clone()).unwrap();
        assert_eq!(sim.hook_add(h, HOOK_MEM_READ, 1, 0, cb), Err(UcErr::HOOK));
        sim.emu_start(h, 0x1000, 0, 0, 0).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        sim.hook_del(h, id).unwrap();
        assert_eq!(sim.hook_del(h, id), Err(UcErr::ARG));
        assert!(sim.native_hooks(h).is_empty());
        sim.close(h).unwrap();
    }

    #[test]
    fn injected_close_failure_is_one_shot() {
        let sim = SimBackend::new();
        let h = sim.open(ARCH_ARM, MODE_THUMB).unwrap();
        sim.fail_next_close(UcErr::RESOURCE);
        assert_eq!(sim.close(h), Err(UcErr::RESOURCE));
        assert!(sim.is_open(h));
        sim.close(h).unwrap();
        assert_eq!(sim.close_calls(h), 2);
        assert_eq!(sim.close(h), Err(UcErr::HANDLE));
    }

    #[test]
    fn context_roundtrip_and_mismatch() {
        let sim = SimBackend::new();
        let a = sim.open(ARCH_X86, MODE_32).unwrap();
        let b = sim.open(ARCH_X86, MODE_64).unwrap();
        let ctx = sim.context_alloc(a).unwrap();
        assert_eq!(sim.context_restore(a, ctx), Err(UcErr::ARG));

        sim.reg_write(a, X86_REG_EAX, 7).unwrap();
        sim.context_save(a, ctx).unwrap();
        sim.reg_write(a, X86_REG_EAX, 9).unwrap();
        sim.context_restore(a, ctx).unwrap();
        assert_eq!(sim.reg_read(a, X86_REG_EAX).unwrap(), 7);
        assert_eq!(sim.context_restore(b, ctx), Err(UcErr::MODE));

        sim.context_free(ctx).unwrap();
        assert_eq!(sim.context_free(ctx), Err(UcErr::HANDLE));
        sim.close(a).unwrap();
        sim.close(b).unwrap();
    }
}

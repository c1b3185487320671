use anyhow::{anyhow, Context as _, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ucbind::consts::*;
use ucbind::metrics::{self, MetricsSnapshot};
use ucbind::util::{hex_dump, lock, parse_u64};
use ucbind::{Engine, HookSpec, MemRegion, NativeApi, SimBackend};

use crate::cli::{Arch, Mode};

pub struct RunArgs {
    pub image: PathBuf,
    pub arch: Arch,
    pub mode: Mode,
    pub base: String,
    pub until: String,
    pub count: usize,
    pub timeout_us: u64,
    pub trace: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct RunReport {
    image: String,
    base: u64,
    pc: u64,
    timed_out: bool,
    errno: i32,
    hook_calls: u64,
    trace: Vec<u64>,
    regions: Vec<MemRegion>,
    metrics: MetricsSnapshot,
}

fn arch_mode(arch: Arch, mode: Mode) -> (i32, i32) {
    let a = match arch {
        Arch::X86 => ARCH_X86,
        Arch::Arm => ARCH_ARM,
        Arch::Arm64 => ARCH_ARM64,
        Arch::Mips => ARCH_MIPS,
        Arch::Riscv => ARCH_RISCV,
    };
    let m = match mode {
        Mode::M16 => MODE_16,
        Mode::M32 => MODE_32,
        Mode::M64 => MODE_64,
        Mode::Arm => MODE_ARM,
        Mode::Thumb => MODE_THUMB,
    };
    (a, m)
}

pub fn exec(args: RunArgs) -> Result<()> {
    let code = std::fs::read(&args.image)
        .with_context(|| format!("read image {}", args.image.display()))?;
    if code.is_empty() {
        return Err(anyhow!("image {} is empty", args.image.display()));
    }
    let base = parse_u64(&args.base)?;
    let until = parse_u64(&args.until)?;
    if base % SIM_PAGE_SIZE != 0 {
        return Err(anyhow!("--base {:#x} is not page aligned ({:#x})", base, SIM_PAGE_SIZE));
    }
    let (arch, mode) = arch_mode(args.arch, args.mode);

    let sim: Arc<dyn NativeApi> = SimBackend::new();
    let engine = Engine::open(sim, arch, mode)?;

    let size = (code.len() as u64).div_ceil(SIM_PAGE_SIZE) * SIM_PAGE_SIZE;
    engine.mem_map(base, size as usize, PROT_ALL)?;
    engine.mem_write(base, &code)?;

    // Хук нужен всегда: считает инструкции, а с --trace ещё и пишет адреса.
    let seen: Arc<Mutex<(u64, Vec<u64>)>> = Arc::new(Mutex::new((0, Vec::new())));
    let sink = seen.clone();
    let record = args.trace;
    engine.hook_add(HookSpec::code(), move |_: &Engine, address: u64, _size: u32| {
        let mut s = lock(&sink);
        s.0 += 1;
        if record {
            s.1.push(address);
        }
    })?;

    let run = engine.emu_start(base, until, args.timeout_us, args.count);
    let pc = engine.reg_read(pc_reg(arch, mode))?;
    let timed_out = engine.query(QUERY_TIMEOUT)? != 0;
    let errno = engine.errno()?;
    let regions = engine.mem_regions()?;
    let head = engine.mem_read(base, code.len().min(32))?;
    engine.close()?;
    run?;

    let (hook_calls, trace) = std::mem::take(&mut *lock(&seen));
    let metrics = metrics::snapshot();

    if args.json {
        let report = RunReport {
            image: args.image.display().to_string(),
            base,
            pc,
            timed_out,
            errno: errno.code(),
            hook_calls,
            trace,
            regions,
            metrics,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("image:      {} ({} bytes at {:#x})", args.image.display(), code.len(), base);
    println!("{}", hex_dump(&head));
    if args.trace {
        for a in &trace {
            println!("  exec {:#x}", a);
        }
    }
    println!("pc:         {:#x}", pc);
    println!("timed_out:  {}", timed_out);
    println!("errno:      {}", errno);
    println!("hook_calls: {}", hook_calls);
    println!("regions:");
    for r in &regions {
        println!("  {:#x}..={:#x} perms={:#o} ({} bytes)", r.begin, r.end, r.perms, r.size());
    }
    crate::cmd_metrics::print_text(&metrics);
    Ok(())
}

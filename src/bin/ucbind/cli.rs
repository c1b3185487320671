use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI поверх встроенного эталонного движка (sim)
#[derive(Parser, Debug)]
#[command(name = "ucbind", version, about = "ucbind: run flat images on the reference engine")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Arch {
    X86,
    Arm,
    Arm64,
    Mips,
    Riscv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Mode {
    #[value(name = "16")]
    M16,
    #[value(name = "32")]
    M32,
    #[value(name = "64")]
    M64,
    Arm,
    Thumb,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Load a flat image at --base and emulate it (0xF4 halts)
    Run {
        /// Raw image file
        #[arg(long)]
        image: PathBuf,
        #[arg(long, value_enum, default_value_t = Arch::X86)]
        arch: Arch,
        #[arg(long, value_enum, default_value_t = Mode::M64)]
        mode: Mode,
        /// Load and entry address (hex with 0x prefix accepted)
        #[arg(long, default_value = "0x1000")]
        base: String,
        /// Stop when PC reaches this address (0 = never)
        #[arg(long, default_value = "0")]
        until: String,
        /// Instruction budget (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        count: usize,
        /// Time budget in microseconds (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        timeout_us: u64,
        /// Print every executed address (code hook)
        #[arg(long)]
        trace: bool,
        /// Print one JSON object instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the bridge metrics snapshot of a fresh process
    Metrics {
        #[arg(long)]
        json: bool,
    },
}

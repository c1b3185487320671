use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod cmd_metrics;
mod cmd_run;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт - info.
    // Пример: RUST_LOG=ucbind=debug ucbind run --image code.bin
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Run {
            image,
            arch,
            mode,
            base,
            until,
            count,
            timeout_us,
            trace,
            json,
        } => cmd_run::exec(cmd_run::RunArgs {
            image,
            arch,
            mode,
            base,
            until,
            count,
            timeout_us,
            trace,
            json,
        }),

        cli::Cmd::Metrics { json } => cmd_metrics::exec(json),
    }
}

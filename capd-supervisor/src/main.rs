//! capd CLI binary.
//!
//! Entry point for the `capd` command-line tool.

use std::process::ExitCode;

use capd_clock::SystemClock;
use capd_fs::RealFilesystem;
use capd_supervisor::exit::{already_logged, codes, exit_code};
use capd_supervisor::{
    execute_emit, execute_scan, execute_supervise, init_tracing, Cli, Command, CommandError,
    EmitArgs, RealSleeper, RotateFlag, ScanArgs, ShutdownFlag, SuperviseArgs, TracingLogger,
    TsharkLauncher, Verbosity,
};
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(Verbosity::from_count(cli.verbose));

    // SIGINT/SIGTERM set the flag; the running command stops at its next check
    // and a graceful stop exits 0
    let shutdown = ShutdownFlag::new();

    let result = match cli.command {
        Command::Supervise(args) => run_supervise(args, &shutdown),
        Command::Scan(args) => run_scan(args),
        Command::Emit(args) => run_emit(args, &shutdown),
    };

    match result {
        Ok(()) => ExitCode::from(codes::SUCCESS as u8),
        Err(e) => {
            if !already_logged(&e) {
                tracing::error!("{}", e);
            }
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Run the supervise command.
fn run_supervise(args: SuperviseArgs, shutdown: &ShutdownFlag) -> Result<(), CommandError> {
    let launcher = TsharkLauncher::new(args.tshark_config());
    let rotate = RotateFlag::new();

    let summary = execute_supervise(
        &args,
        launcher,
        &SystemClock,
        &RealFilesystem,
        &RealSleeper,
        shutdown,
        &rotate,
        &TracingLogger,
    )?;

    println!(
        "Supervised {} capture sessions ({} rotations, {} restarts)",
        summary.stats.sessions_started, summary.stats.rotations, summary.stats.restarts
    );
    println!(
        "Retained {} segments ({} bytes)",
        summary.retained_files, summary.retained_bytes
    );

    Ok(())
}

/// Run the scan command.
fn run_scan(args: ScanArgs) -> Result<(), CommandError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute_scan(&args, &RealFilesystem, &mut out)?;
    Ok(())
}

/// Run the emit command.
fn run_emit(args: EmitArgs, shutdown: &ShutdownFlag) -> Result<(), CommandError> {
    execute_emit(&args, &RealSleeper, shutdown, &TracingLogger)?;
    Ok(())
}

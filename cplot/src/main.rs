//! # cplot binary
//!
//! # Usage
//!
//! ```bash
//! # Plot against the simulated controller
//! cplot --port sim plot drawing.toml
//!
//! # Inspect the plan only
//! cplot plan drawing.toml --json
//!
//! # Direct control
//! cplot device pen-up
//! cplot device jog --dx 10 --dy -5
//! cplot device status --json
//! ```

use clap::Parser;
use cplot::context::{Context, load_config};
use cplot::logging::setup_tracing;
use cplot::plot::write_summary;
use cplot::{Args, Command, plan_file, plot_blocks, run_device_action, write_plan};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

fn main() {
    if let Err(e) = run() {
        error!("cplot failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let logging = setup_tracing(args.verbose, args.json);
    let config = load_config(args.config.as_deref())?;
    logging.apply_level(config.log_level);

    info!("cplot v{} starting", env!("CARGO_PKG_VERSION"));

    let mut ctx = Context::resolve(config, args.port.as_deref(), args.model.as_deref())?;
    ctx.json = args.json;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &args.command {
        Command::Device(action) => run_device_action(&ctx, action, &mut out)?,
        Command::Plan { file } => {
            let blocks = plan_file(&ctx, file)?;
            write_plan(&blocks, ctx.json, &mut out)?;
        }
        Command::Plot { file, dry_run } => {
            let blocks = plan_file(&ctx, file)?;

            let abort = Arc::new(AtomicBool::new(false));
            let flag = abort.clone();
            ctrlc::set_handler(move || {
                warn!("Interrupt received, stopping the plot");
                flag.store(true, Ordering::SeqCst);
            })?;

            let summary = plot_blocks(&ctx, &blocks, *dry_run, &abort)?;
            write_summary(&summary, *dry_run, ctx.json, &mut out)?;
        }
    }
    Ok(())
}

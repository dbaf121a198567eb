//! sonar binary
//!
//! Attaches the configured policy to the simulated kernel and logs the
//! busiest processes once per tick until Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sonar::{
    AttachGuard, Cli, Config, LogReporter, Monitor, MonitorOptions, ProcessTreeFilter,
    SimAttachment,
};
use sonar_sched::logger as kernel_log;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli).context("loading configuration")?;
    config.validate().context("invalid configuration")?;
    kernel_log::set_max_level(config.kernel_log_level(cli.verbose));
    log::debug!("{:?}", config);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::Relaxed);
    })
    .context("installing Ctrl-C handler")?;

    let attachment = SimAttachment::attach(config.policy.into(), config.settings(), &config.sim)
        .with_context(|| format!("attaching {:?} policy", config.policy))?;
    let mut filter = ProcessTreeFilter::new(attachment.processes(), config.filter.clone());
    let guard = AttachGuard::new(attachment);

    let mut monitor = Monitor::new(MonitorOptions::from_config(&config, cli.ticks));
    let stats = monitor
        .run(guard, &mut filter, &mut LogReporter, &shutdown)
        .context("monitor loop failed")?;

    log::info!("done after {} ticks, {} reports", stats.ticks, stats.reports);
    Ok(())
}

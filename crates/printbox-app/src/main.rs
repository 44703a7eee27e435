// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printbox: single-threaded print server daemon.
//
// Entry point. Loads configuration, initialises logging, builds the printer
// registry, binds the three listeners and drives the server loop.

mod services;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use printbox_core::ServerConfig;
use printbox_core::error::Result;
use printbox_server::{PrintServer, PrinterRegistry, StdListener};

use services::config_path;
use services::host_network::HostNetwork;

/// Sleep after a tick that found nothing to do.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

fn main() -> ExitCode {
    let path = config_path::resolve(std::env::args_os().nth(1));
    // Loaded before logging so the configured filter can apply.
    let loaded = ServerConfig::load_or_default(&path);
    let filter = loaded
        .as_ref()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    info!(config = %path.display(), "printbox starting");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, config = %path.display(), "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "printbox stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;
    let printers = PrinterRegistry::from_config(&config.printers)?;
    let status_interval = config.status_interval();

    let mut server: PrintServer<StdListener> =
        PrintServer::new(config, printers, Box::new(HostNetwork::new()));
    server.start(StdListener::bind)?;

    let mut last_status = Instant::now();
    loop {
        let report = server.tick();
        if report.is_idle() {
            std::thread::sleep(IDLE_SLEEP);
        }
        if last_status.elapsed() >= status_interval {
            server.log_slot_usage();
            last_status = Instant::now();
        }
    }
}

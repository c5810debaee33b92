//! tcpfwd binary entry point.
//!
//! Starts every task of the task file and forwards until Ctrl-C, or until
//! every task has ended on its own.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use tcpfwd::config_file;
use tcpfwd::{Cli, Exit};
use tcpfwd_core::{MemoryCatalog, TaskRegistry};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = tcpfwd_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tcpfwd starting");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("tcpfwd: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(&cli)) {
        error!(error = %e, "tcpfwd failed");
        eprintln!("tcpfwd: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> tcpfwd_core::Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file::default_config_path()?,
    };
    let tasks = config_file::load_or_init(&path)?;

    for name in &cli.tasks {
        if !tasks.iter().any(|t| &t.name == name) {
            warn!(task = %name, path = %path.display(), "Selected task not in task file");
        }
    }

    let catalog = Arc::new(MemoryCatalog::new(tasks));
    let registry = TaskRegistry::with_config(catalog, cli.relay_config())?;

    let mut started = 0usize;
    for task in registry.list() {
        if !cli.selects(&task.name) {
            continue;
        }
        match registry.start_config(&task).await {
            Ok(()) => started += 1,
            Err(e) => error!(task = %task.name, error = %e, "Failed to start task"),
        }
    }

    if started == 0 {
        return Err(tcpfwd_core::Error::Config {
            message: "no task could be started".to_string(),
        });
    }
    info!(
        tasks = ?registry.running(),
        listen = %registry.relay_config().listen_addr,
        "Forwarding, press Ctrl-C to stop"
    );

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to wait for Ctrl-C, shutting down");
        }
    };

    match tcpfwd::wait_for_exit(&registry, interrupt).await {
        Exit::Interrupted => {
            info!("Interrupted, stopping tasks");
            registry.shutdown().await;
            Ok(())
        }
        Exit::TasksEnded => {
            registry.shutdown().await;
            Err(tcpfwd_core::Error::Config {
                message: "every task stopped on its own".to_string(),
            })
        }
    }
}

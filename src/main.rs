//! procrelay server - main entry point.
//!
//! Starts the relay on the configured process notification source and
//! serves the control boundary over TCP+msgpack IPC.

use clap::Parser;
use procrelay::ipc::IpcServer;
use procrelay::kernel::Kernel;
use procrelay::source::{ManualNotifier, ProcessNotifier, ProcfsNotifier};
use procrelay::types::SourceKind;
use procrelay::Config;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "PROCRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the IPC listener (overrides the config file)
    #[arg(long, env = "PROCRELAY_LISTEN")]
    listen: Option<String>,

    /// Process notification source: procfs or manual
    #[arg(long)]
    source: Option<SourceKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(kind) = args.source {
        config.source.kind = kind;
    }

    procrelay::observability::init_tracing(&config.observability);

    let notifier: Arc<dyn ProcessNotifier> = match config.source.kind {
        SourceKind::Procfs => Arc::new(ProcfsNotifier::from_config(&config.source)),
        SourceKind::Manual => Arc::new(ManualNotifier::new()),
    };
    let mut kernel = Kernel::start(notifier)?;

    let addr = config.server.listen_addr.parse()?;
    let server = Arc::new(IpcServer::new(kernel.handle(), addr, config.ipc.clone()));

    tracing::info!(
        "procrelay starting on {} (source={:?})",
        addr,
        config.source.kind
    );

    let mut serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received shutdown signal");
        }
        result = &mut serving => {
            // The server only returns on its own when the listener fails.
            kernel.stop()?;
            result??;
            return Ok(());
        }
    }

    // Stop the relay first so a waiting client is answered with CANCELLED.
    let report = kernel.stop()?;
    tracing::info!(cancelled_waiter = report.cancelled_waiter, "relay shut down");
    server.shutdown();
    serving.await??;

    Ok(())
}

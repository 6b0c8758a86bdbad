use node_runtime::{Daemon, NodeConfig};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uc_telemetry::init();

    let config = match NodeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "fatal configuration error, refusing to start");
            std::process::exit(1);
        }
    };

    info!(node_home = %config.node_home.display(), operator = %config.identity.operator_address, "starting universal client daemon");

    let daemon = Daemon::build(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run_handle = tokio::spawn(daemon.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining subsystems");
    let _ = shutdown_tx.send(true);

    match run_handle.await {
        Ok(Ok(())) => info!("shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "daemon exited with an error"),
        Err(e) => error!(error = %e, "daemon task panicked"),
    }

    Ok(())
}

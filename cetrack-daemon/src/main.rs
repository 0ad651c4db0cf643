use anyhow::Result;
use clap::Parser;

use cetrack_core::CetrackConfig;
use cetrack_daemon::cli::DaemonCli;
use cetrack_daemon::daemon::Daemon;
use cetrack_daemon::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> env -> CLI flags, validated last
    let mut config = match &cli.config {
        Some(path) => CetrackConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?,
        None => {
            let mut config = CetrackConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cetrack-daemon starting");

    let daemon = Daemon::build_from_config(config).await?;
    daemon.run().await
}

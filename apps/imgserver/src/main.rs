//! SCDFTH image server entry point.

mod config;

use std::sync::Arc;

use scdft_server::Dispatcher;
use scdft_thumbnail::ImageThumbnailer;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting SCDFTH image server"
    );

    let path = config::config_path();
    let config = config::Config::load_from(&path)?;
    tracing::info!(
        path = %path.display(),
        port = config.port,
        root = %config.root_path,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let dispatcher = Arc::new(
        Dispatcher::bind(config.server_config(), Arc::new(ImageThumbnailer::default())).await?,
    );

    let stopper = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            stopper.shutdown();
        }
    });

    dispatcher.run().await?;
    Ok(())
}

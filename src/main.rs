use tokio_util::sync::CancellationToken;

use opsmeeting_agent::config::Config;
use opsmeeting_agent::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // A missing .env is normal; real environment variables win either way.
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        tracing::warn!("failed to load .env: {e}");
    }

    let config = Config::from_env();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received, shutting down");
                signal.cancel();
            }
            Err(e) => tracing::warn!("cannot listen for ctrl-c: {e}"),
        }
    });

    server::serve(config, shutdown).await?;

    tracing::info!("opsmeeting-agent stopped");
    Ok(())
}

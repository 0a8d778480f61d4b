use anyhow::{anyhow, Result};
use bbq_monitor::config::Config;
use bbq_monitor::mqtt;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,bbq_monitor=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let config = Config::from_env()?;

    let cancel = CancellationToken::new();
    let mut consumers: FuturesUnordered<_> = config
        .channels
        .iter()
        .cloned()
        .map(|channel| {
            let name = channel.name.clone();
            let handle =
                tokio::spawn(mqtt::run_channel(config.clone(), channel, cancel.clone()));
            async move { (name, handle.await) }
        })
        .collect();
    tracing::info!(
        host = %config.mqtt_host,
        port = config.mqtt_port,
        "[*] Ready for work. To exit press CTRL+C"
    );

    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("User interrupted continuous listening process.");
            signal_cancel.cancel();
        }
    });

    // Any consumer failing takes the others down with it; reconnecting is
    // left to whatever supervises this process.
    let mut failure: Option<anyhow::Error> = None;
    while let Some((name, joined)) = consumers.next().await {
        match joined {
            Ok(Ok(stats)) => stats.log_summary(&name),
            Ok(Err(err)) => {
                tracing::error!(
                    channel = %name,
                    error = %err,
                    "channel consumer failed; shutting down"
                );
                cancel.cancel();
                if failure.is_none() {
                    failure = Some(anyhow::Error::new(err).context(format!("{name} consumer")));
                }
            }
            Err(err) => {
                tracing::error!(channel = %name, error = %err, "channel consumer task aborted");
                cancel.cancel();
                if failure.is_none() {
                    failure = Some(anyhow!("{name} consumer task aborted: {err}"));
                }
            }
        }
    }

    signal_task.abort();
    tracing::info!("Closing connection. Goodbye.");
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

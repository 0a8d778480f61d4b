use anyhow::{Context, Result};
use bbq_monitor::config::Config;
use bbq_monitor::mqtt::ReadingPublisher;
use bbq_monitor::producer::load_readings;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Replay a smoker temperature CSV onto the smoker and food reading topics.")]
struct Args {
    #[arg(long, default_value = "smoker-temps.csv")]
    csv: PathBuf,
    /// Pause between rows.
    #[arg(long, default_value_t = 30)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let readings = load_readings(&args.csv, &config.timestamp_format)?;
    tracing::info!(rows = readings.len(), csv = %args.csv.display(), "loaded readings");

    let client_id = format!("{}-producer", config.mqtt_client_id);
    let publisher = ReadingPublisher::connect(&config, &client_id);
    let interval = Duration::from_secs(args.interval_secs);

    let replay = async {
        for reading in &readings {
            let payloads = reading.payloads(&config.timestamp_format);
            for (channel, payload) in config.channels.iter().zip(payloads) {
                publisher
                    .publish(&channel.topic, payload.clone())
                    .await
                    .with_context(|| format!("publish to {}", channel.topic))?;
                tracing::info!(topic = %channel.topic, payload = %payload, "sent reading");
            }
            tokio::time::sleep(interval).await;
        }
        anyhow::Ok(())
    };

    let outcome = tokio::select! {
        res = replay => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("User interrupted the reading replay.");
            Ok(())
        }
    };

    let closed = publisher.disconnect().await;
    tracing::info!("Closing connection. Goodbye.");
    outcome?;
    closed.context("close broker connection")?;
    Ok(())
}

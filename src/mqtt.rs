use crate::config::{ChannelConfig, Config};
use crate::consumer::{run_consumer, ChannelConsumer, ConsumerStats, MessageSource, TransportError};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, Publish, QoS};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

const DISCONNECT_DRAIN: Duration = Duration::from_secs(2);

pub fn mqtt_options(config: &Config, client_id: &str) -> MqttOptions {
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host.clone(), config.mqtt_port);
    mqttoptions.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt_username {
        mqttoptions.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }
    mqttoptions
}

/// One channel's subscription. Persistent session + QoS 1 + manual acks: the
/// broker keeps anything we have not acked and redelivers it on reconnect.
pub struct MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl MqttSource {
    pub async fn connect(config: &Config, channel: &ChannelConfig) -> Result<Self, TransportError> {
        let mut options = mqtt_options(config, &config.channel_client_id(channel));
        options.set_clean_session(false);
        options.set_manual_acks(true);

        let (client, eventloop) = AsyncClient::new(options, 10);
        client
            .subscribe(channel.topic.clone(), QoS::AtLeastOnce)
            .await?;
        Ok(Self {
            client,
            eventloop,
            topic: channel.topic.clone(),
        })
    }
}

impl MessageSource for MqttSource {
    type Message = Publish;

    fn payload(message: &Publish) -> &[u8] {
        &message.payload
    }

    async fn recv(&mut self) -> Result<Option<Publish>, TransportError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Incoming::Publish(publish)) => {
                    if publish.topic == self.topic {
                        return Ok(Some(publish));
                    }
                    // Left over from an older subscription on this session.
                    tracing::debug!(topic = %publish.topic, "dropping publish for foreign topic");
                    self.client.ack(&publish).await?;
                }
                Event::Incoming(Incoming::ConnAck(connack)) => {
                    tracing::info!(
                        topic = %self.topic,
                        session_present = connack.session_present,
                        "connected to broker"
                    );
                }
                Event::Incoming(Incoming::SubAck(_)) => {
                    tracing::info!(topic = %self.topic, "subscribed to readings");
                }
                Event::Incoming(Incoming::Disconnect) => return Err(TransportError::Closed),
                _ => {}
            }
        }
    }

    async fn ack(&mut self, message: &Publish) -> Result<(), TransportError> {
        self.client.ack(message).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = self.client.disconnect().await {
            tracing::debug!(topic = %self.topic, error = %err, "disconnect request failed");
            return;
        }
        // Pending acks and the DISCONNECT only reach the broker while polling.
        let eventloop = &mut self.eventloop;
        let drain = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if timeout(DISCONNECT_DRAIN, drain).await.is_err() {
            tracing::warn!(topic = %self.topic, "timed out closing broker connection");
        }
    }
}

/// Runs one channel until cancelled or the transport fails.
pub async fn run_channel(
    config: Config,
    channel: ChannelConfig,
    cancel: CancellationToken,
) -> Result<Arc<ConsumerStats>, TransportError> {
    let mut consumer = ChannelConsumer::new(channel.clone(), config.timestamp_format.clone());
    let stats = consumer.stats();

    let mut source = MqttSource::connect(&config, &channel).await?;
    tracing::info!(
        channel = %channel.name,
        topic = %channel.topic,
        window = channel.window_capacity,
        threshold = channel.alert_threshold,
        time_window_minutes = channel.time_window_minutes,
        "ready for readings"
    );

    run_consumer(
        &channel.name,
        &mut source,
        |payload| consumer.handle(payload),
        &stats,
        &cancel,
    )
    .await?;
    Ok(stats)
}

/// QoS 1 publisher for the reading producer.
pub struct ReadingPublisher {
    client: AsyncClient,
    poller: JoinHandle<Result<(), TransportError>>,
}

impl ReadingPublisher {
    pub fn connect(config: &Config, client_id: &str) -> Self {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(config, client_id), 32);
        let poller = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                    Ok(_) => {}
                    Err(err) => return Err(TransportError::from(err)),
                }
            }
        });
        Self { client, poller }
    }

    pub async fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        if self.poller.is_finished() {
            return Err(TransportError::Closed);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.into_bytes())
            .await?;
        Ok(())
    }

    /// Flushes queued publishes, sends DISCONNECT and surfaces any transport
    /// error the poller hit.
    pub async fn disconnect(self) -> Result<(), TransportError> {
        if self.poller.is_finished() {
            return match self.poller.await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Closed),
            };
        }
        self.client.disconnect().await?;
        match timeout(DISCONNECT_DRAIN, self.poller).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "publisher event loop task failed");
                Err(TransportError::Closed)
            }
            Err(_) => {
                tracing::warn!("timed out closing publisher connection");
                Ok(())
            }
        }
    }
}

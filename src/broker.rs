use crate::config::Settings;
use crate::errors::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// What the subscriber sees of the broker connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// The broker acknowledged a (re)connect. Subscriptions must be reissued.
    Connected,
    Message { topic: String, payload: Bytes },
    /// The connection dropped. The session keeps trying on the next poll.
    Offline { reason: String },
    /// The session cannot deliver any more events.
    Closed,
}

/// One broker connection owned by the subscriber.
#[async_trait]
pub trait BrokerSession: Send {
    async fn subscribe(&mut self, topic_pattern: &str) -> Result<(), BrokerError>;

    /// Waits for the next connection event. Polling is what drives reconnects.
    async fn next_event(&mut self) -> BrokerEvent;

    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

/// `rumqttc` backed session.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    reconnect_delay: Duration,
}

impl MqttSession {
    pub fn new(settings: &Settings) -> Self {
        let mut options = MqttOptions::new(
            settings.client_id(),
            settings.mqtt_host.clone(),
            settings.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(settings.mqtt_keep_alive_secs));
        options.set_clean_session(true);

        if let (Some(user), Some(pass)) = (&settings.mqtt_username, &settings.mqtt_password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Self {
            client,
            eventloop,
            reconnect_delay: Duration::from_millis(settings.mqtt_reconnect_delay_ms),
        }
    }
}

/// Maps one event loop poll onto what the subscriber cares about. `None`
/// means keep polling.
fn classify_poll(polled: Result<Event, ConnectionError>) -> Option<BrokerEvent> {
    match polled {
        Ok(Event::Incoming(Packet::ConnAck(_))) => Some(BrokerEvent::Connected),
        Ok(Event::Incoming(Packet::Publish(publish))) => Some(BrokerEvent::Message {
            topic: publish.topic,
            payload: publish.payload,
        }),
        Ok(_) => None,
        Err(ConnectionError::RequestsDone) => Some(BrokerEvent::Closed),
        Err(e) => {
            debug!("MQTT poll error: {}", e);
            Some(BrokerEvent::Offline {
                reason: e.to_string(),
            })
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, topic_pattern: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic_pattern, QoS::AtMostOnce)
            .await?;
        Ok(())
    }

    async fn next_event(&mut self) -> BrokerEvent {
        loop {
            let Some(event) = classify_poll(self.eventloop.poll().await) else {
                continue;
            };
            if matches!(event, BrokerEvent::Offline { .. }) {
                tokio::time::sleep(self.reconnect_delay).await;
            }
            return event;
        }
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client.disconnect().await?;

        // Drive the event loop until the DISCONNECT packet is on the wire.
        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;

        if flushed.is_err() {
            warn!("Timed out flushing MQTT disconnect");
        }
        Ok(())
    }
}

use crate::broker::{BrokerEvent, BrokerSession};
use crate::db_operations::StoreWriter;
use crate::errors::{PipelineError, Rejection};
use crate::metrics::METRICS;
use crate::parsers::power_payload::PayloadNormalizer;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Offline,
}

/// Owns the broker session and feeds every inbound message through the
/// normalizer into the store, one message at a time.
pub struct Subscriber<S> {
    session: S,
    topic_pattern: String,
    normalizer: PayloadNormalizer,
    writer: StoreWriter,
    state: ConnectionState,
    connected_once: bool,
    state_tx: watch::Sender<ConnectionState>,
}

impl<S> Subscriber<S>
where
    S: BrokerSession + 'static,
{
    pub fn new(
        session: S,
        topic_pattern: impl Into<String>,
        normalizer: PayloadNormalizer,
        writer: StoreWriter,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            session,
            topic_pattern: topic_pattern.into(),
            normalizer,
            writer,
            state: ConnectionState::Disconnected,
            connected_once: false,
            state_tx,
        }
    }

    pub fn start(self) -> SubscriberHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let state_rx = self.state_tx.subscribe();
        let task = tokio::spawn(self.run(stop_rx));

        SubscriberHandle {
            stop_tx: Some(stop_tx),
            task,
            state_rx,
        }
    }

    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) {
        info!("Subscriber starting on '{}'", self.topic_pattern);

        loop {
            if matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Offline
            ) {
                self.set_state(ConnectionState::Connecting);
            }

            let event = tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    info!("Subscriber stop requested");
                    break;
                }
                event = self.session.next_event() => event,
            };

            match event {
                BrokerEvent::Connected => self.on_connected().await,
                BrokerEvent::Message { topic, payload } => {
                    if self.state == ConnectionState::Connected {
                        self.handle_message(&topic, &payload).await;
                    } else {
                        debug!(
                            "Dropping message on '{}' received while {:?}",
                            topic, self.state
                        );
                    }
                }
                BrokerEvent::Offline { reason } => {
                    if self.state == ConnectionState::Connected {
                        warn!("Broker connection lost: {}", reason);
                    }
                    self.set_state(ConnectionState::Offline);
                }
                BrokerEvent::Closed => {
                    warn!("Broker session closed");
                    break;
                }
            }
        }

        if let Err(e) = self.session.disconnect().await {
            warn!("Error while disconnecting from broker: {}", e);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Subscriber stopped");
    }

    async fn on_connected(&mut self) {
        if self.connected_once {
            METRICS.lock().record_reconnect();
            info!("Reconnected to broker");
        } else {
            info!("Connected to broker");
        }
        self.connected_once = true;
        self.set_state(ConnectionState::Connected);

        match self.session.subscribe(&self.topic_pattern).await {
            Ok(()) => info!("Subscribed to '{}'", self.topic_pattern),
            Err(e) => error!("Failed to subscribe to '{}': {}", self.topic_pattern, e),
        }
    }

    async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        METRICS.lock().record_message();

        match self.normalizer.normalize(topic, payload, Utc::now()) {
            Ok(reading) => {
                if let Err(e) = self.writer.append(&reading).await {
                    error!("Failed to store reading from '{}': {}", topic, e);
                }
            }
            Err(Rejection::IgnoredTopic { .. }) => {
                METRICS.lock().record_ignored();
                debug!("Ignoring message on '{}'", topic);
            }
            Err(rejection) => {
                METRICS.lock().record_rejected();
                warn!("Rejected message: {}", rejection);
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Subscriber state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}

pub struct SubscriberHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SubscriberHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Asks the subscriber to disconnect and waits for it to finish.
    pub async fn stop(mut self) -> Result<(), PipelineError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have ended on its own.
            let _ = stop_tx.send(());
        }
        self.task.await?;
        Ok(())
    }

    /// Waits for the subscriber to end without asking it to.
    pub async fn join(self) -> Result<(), PipelineError> {
        let SubscriberHandle { stop_tx, task, .. } = self;
        task.await?;
        drop(stop_tx);
        Ok(())
    }
}

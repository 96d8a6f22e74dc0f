use crate::events::{EventBus, RelayEvent};
use crate::transport::SignalingConnector;
use huddle_core::{PeerId, SignalEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Reconnect attempts before the link reports permanent disconnection.
    pub max_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Doubling backoff with a cap and an attempt ceiling. Kept free of
/// timers so the sequence itself is testable.
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    initial: Duration,
    cap: Duration,
    attempt: u32,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            delay: config.initial_backoff,
            initial: config.initial_backoff,
            cap: config.max_backoff,
            attempt: 0,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before the next attempt, or `None` once the ceiling is hit.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        let delay = self.delay;
        self.delay = (self.delay * 2).min(self.cap);
        Some(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A successful connection starts the ladder over.
    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.attempt = 0;
    }
}

/// Client side of the signaling channel: dials the relay, announces the
/// local member into the room, shuttles envelopes between the relay and
/// the mesh, and reconnects with exponential backoff on loss.
pub struct RelayLink {
    connector: Arc<dyn SignalingConnector>,
    room_id: String,
    local: PeerId,
    to_mesh: mpsc::Sender<SignalEnvelope>,
    from_mesh: mpsc::UnboundedReceiver<SignalEnvelope>,
    shutdown_rx: mpsc::Receiver<()>,
    events: EventBus,
    config: LinkConfig,
}

impl RelayLink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: Arc<dyn SignalingConnector>,
        room_id: impl Into<String>,
        local: PeerId,
        to_mesh: mpsc::Sender<SignalEnvelope>,
        from_mesh: mpsc::UnboundedReceiver<SignalEnvelope>,
        shutdown_rx: mpsc::Receiver<()>,
        events: EventBus,
        config: LinkConfig,
    ) -> Self {
        Self {
            connector,
            room_id: room_id.into(),
            local,
            to_mesh,
            from_mesh,
            shutdown_rx,
            events,
            config,
        }
    }

    pub async fn run(mut self) {
        let mut backoff = Backoff::new(&self.config);

        'outer: loop {
            let transport = tokio::select! {
                _ = self.shutdown_rx.recv() => break 'outer,
                result = self.connector.connect() => match result {
                    Ok(transport) => transport,
                    Err(e) => {
                        warn!("Relay connection failed: {}", e);
                        if !self.wait_backoff(&mut backoff).await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                },
            };

            let init = SignalEnvelope::Init {
                room_id: self.room_id.clone(),
                client_id: self.local.clone(),
            };
            if transport.send(init).await.is_err() {
                warn!("Relay connection lost before init");
                if !self.wait_backoff(&mut backoff).await {
                    break 'outer;
                }
                continue 'outer;
            }

            backoff.reset();
            info!("Connected to relay as {}", self.local);
            self.events.emit_relay(RelayEvent::Connected);

            loop {
                tokio::select! {
                    _ = self.shutdown_rx.recv() => {
                        transport.close().await;
                        break 'outer;
                    }
                    outbound = self.from_mesh.recv() => match outbound {
                        Some(env) => {
                            if transport.send(env).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            transport.close().await;
                            break 'outer;
                        }
                    },
                    inbound = transport.recv() => match inbound {
                        Some(env) => {
                            let _ = self.to_mesh.send(env).await;
                        }
                        None => break,
                    },
                }
            }

            warn!("Relay connection lost");
            if !self.wait_backoff(&mut backoff).await {
                break 'outer;
            }
        }

        info!("Relay link for {} stopped", self.local);
    }

    /// Sleep out the next backoff step. `false` when the attempt ceiling
    /// was reached (permanent disconnect reported) or shutdown arrived.
    async fn wait_backoff(&mut self, backoff: &mut Backoff) -> bool {
        match backoff.next_delay() {
            Some(delay) => {
                self.events.emit_relay(RelayEvent::Reconnecting {
                    attempt: backoff.attempt(),
                    delay,
                });
                tokio::select! {
                    _ = self.shutdown_rx.recv() => false,
                    _ = tokio::time::sleep(delay) => true,
                }
            }
            None => {
                warn!("Relay reconnect ceiling reached, giving up");
                self.events.emit_relay(RelayEvent::Disconnected);
                false
            }
        }
    }
}

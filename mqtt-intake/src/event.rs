use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{ClientId, Reason, Topic};

/// Observable broker events, emitted while `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    ClientConnected { client_id: ClientId, remote_addr: SocketAddr },
    ClientDisconnected { client_id: ClientId, reason: Reason },
    MessageIntercepted { client_id: ClientId, topic: Topic, dropped: Option<Reason> },
}

/// External observer of broker events, e.g. a logger.
#[async_trait]
pub trait EventListener: Sync + Send {
    async fn on_event(&self, event: &BrokerEvent) -> Result<()>;
}

/// Fans events out to the registered listeners.
///
/// A listener failure is logged and contained; it never affects broker state
/// transitions or other listeners.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventEmitter {
    #[inline]
    pub fn new() -> Self {
        Self { listeners: RwLock::new(Vec::new()) }
    }

    #[inline]
    pub async fn add(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().await.push(listener);
    }

    pub async fn emit(&self, event: &BrokerEvent) {
        let listeners = { self.listeners.read().await.clone() };
        let results = futures::future::join_all(listeners.iter().map(|l| l.on_event(event))).await;
        for e in results.into_iter().filter_map(|r| r.err()) {
            log::warn!("event listener failed, event: {event:?}, {e:?}");
        }
    }
}

/// Default listener reporting connects, disconnects and intercepted
/// publishes through the `log` facade.
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    async fn on_event(&self, event: &BrokerEvent) -> Result<()> {
        match event {
            BrokerEvent::ClientConnected { client_id, remote_addr } => {
                log::info!("client connected: {client_id} from {remote_addr}");
            }
            BrokerEvent::ClientDisconnected { client_id, reason } => {
                log::info!("client disconnected: {client_id}, {reason}");
            }
            BrokerEvent::MessageIntercepted { client_id, topic, dropped: None } => {
                log::info!("message from {client_id} to '{topic}' forwarded");
            }
            BrokerEvent::MessageIntercepted { client_id, topic, dropped: Some(reason) } => {
                log::info!("message from {client_id} to '{topic}' dropped, {reason}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Recorder {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventListener for Recorder {
        async fn on_event(&self, _event: &BrokerEvent) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventListener for Failing {
        async fn on_event(&self, _event: &BrokerEvent) -> Result<()> {
            Err(anyhow::anyhow!("listener down"))
        }
    }

    #[tokio::test]
    async fn listener_failure_is_isolated() {
        let emitter = EventEmitter::new();
        let recorder = Arc::new(Recorder { seen: AtomicUsize::new(0) });
        emitter.add(Arc::new(Failing)).await;
        emitter.add(recorder.clone()).await;

        emitter
            .emit(&BrokerEvent::ClientDisconnected {
                client_id: "sensor-1".into(),
                reason: Reason::ConnectDisconnect,
            })
            .await;

        //the failing listener did not prevent delivery to the next one
        assert_eq!(recorder.seen.load(Ordering::SeqCst), 1);
    }
}

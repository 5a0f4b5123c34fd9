//! Broker lifecycle controller.
//!
//! Owns the `Stopped -> Starting -> Running -> Stopping -> Stopped` state
//! machine and wires validator, interceptor chain, registry and event
//! emitter together. The transport/codec layer drives it through three
//! inbound calls, one logical task per client connection:
//!
//! 1. [`Broker::on_connection_attempt`] gates a decoded CONNECT through the
//!    validator and, on accept, performs the registry takeover-insert.
//! 2. [`Broker::on_publish`] runs a decoded PUBLISH through the interceptor
//!    chain; the result says whether the fan-out collaborator may see it.
//! 3. [`Broker::on_disconnect`] removes the registry record on socket close.
//!
//! `stop()` is a barrier, not a signal: when it returns, no new work is
//! admitted and every in-flight publish has either completed interception or
//! been cancelled and reported as dropped.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::context::BrokerContext;
use crate::error::{Error, Result, StateError};
use crate::event::BrokerEvent;
use crate::types::{ClientId, ConnectAckReason, ConnectDecision, ConnectionAttempt, Intercepted, Publish, Reason};

/// MQTT v3.1.1 limit for the client identifier field.
const CLIENT_ID_MAX_LEN: usize = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

pub struct BrokerInner {
    scx: BrokerContext,
    state: RwLock<State>,
    /// Publishes currently inside the interceptor chain.
    inflight: AtomicUsize,
    drained: Notify,
    /// Replaced on every `start()`, cancelled when the drain timeout expires.
    stop_token: Mutex<CancellationToken>,
}

impl Deref for Broker {
    type Target = BrokerInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Broker {
    pub fn new(scx: BrokerContext) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                scx,
                state: RwLock::new(State::Stopped),
                inflight: AtomicUsize::new(0),
                drained: Notify::new(),
                stop_token: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    #[inline]
    pub fn context(&self) -> &BrokerContext {
        &self.scx
    }

    #[inline]
    pub fn state(&self) -> State {
        *self.state.read()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state(), State::Running)
    }

    /// Valid only from `Stopped`.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != State::Stopped {
                return Err(Error::Lifecycle(StateError::AlreadyRunning));
            }
            *state = State::Starting;
        }
        *self.stop_token.lock() = CancellationToken::new();
        {
            let mut state = self.state.write();
            //stop() is legal from `Starting`; if one raced in, the broker is stopped
            if *state != State::Starting {
                return Err(Error::Lifecycle(StateError::NotRunning));
            }
            *state = State::Running;
        }
        log::info!("broker started, transport listen config: {}", self.scx.settings.listen.addr);
        Ok(())
    }

    /// Valid from `Running` or `Starting`. On return no new connections are
    /// accepted, in-flight connection attempts have resolved (answered
    /// `ServerUnavailable` once past the `Stopping` flip) and every in-flight
    /// publish has completed interception or been cancelled (reported as
    /// dropped with `Reason::BrokerStopping`).
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                State::Running | State::Starting => *state = State::Stopping,
                State::Stopped | State::Stopping => {
                    return Err(Error::Lifecycle(StateError::NotRunning));
                }
            }
        }

        let drain_timeout = self.scx.settings.drain_timeout;
        if tokio::time::timeout(drain_timeout, self.wait_drained()).await.is_err() {
            let remaining = self.inflight.load(Ordering::SeqCst);
            log::warn!("drain timeout after {drain_timeout:?}, cancelling {remaining} in-flight operations");
            self.stop_token.lock().cancel();
            //cancelled operations resolve promptly, but stay bounded anyway
            let _ = tokio::time::timeout(drain_timeout, self.wait_drained()).await;
        }

        *self.state.write() = State::Stopped;
        log::info!("broker stopped");
        Ok(())
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.inflight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Gate for a decoded CONNECT, called by the transport once per attempt.
    ///
    /// Malformed metadata answers `Err(Error::Validation)` and the connection
    /// is rejected; outside of `Running` every attempt answers
    /// `ServerUnavailable` without touching the registry.
    pub async fn on_connection_attempt(&self, attempt: ConnectionAttempt) -> Result<ConnectDecision> {
        let _guard = InflightGuard::acquire(self);
        if !self.is_running() {
            return Ok(ConnectDecision::reject(ConnectAckReason::ServerUnavailable));
        }
        if attempt.client_id.len() > CLIENT_ID_MAX_LEN {
            return Err(Error::Validation(format!(
                "client id of {} bytes exceeds the {CLIENT_ID_MAX_LEN} byte limit",
                attempt.client_id.len()
            )));
        }

        let validate_timeout = self.scx.settings.validate_timeout;
        let token = { self.stop_token.lock().clone() };
        let decision = tokio::select! {
            biased;
            out = tokio::time::timeout(validate_timeout, self.scx.validator.validate(&attempt)) => {
                match out {
                    Ok(decision) => decision,
                    Err(_elapsed) => {
                        log::warn!("{attempt} validation timed out after {validate_timeout:?}");
                        return Ok(ConnectDecision::reject(ConnectAckReason::ServerUnavailable));
                    }
                }
            }
            _ = token.cancelled() => {
                return Ok(ConnectDecision::reject(ConnectAckReason::ServerUnavailable));
            }
        };
        log::debug!("{attempt} decision: {decision:?}");
        if !decision.accepted {
            return Ok(decision);
        }
        //the validator may have been out on a lookup while stop() flipped the
        //state; such an attempt must not reach the registry
        if !self.is_running() {
            return Ok(ConnectDecision::reject(ConnectAckReason::ServerUnavailable));
        }

        let client_id =
            decision.assigned_client_id.clone().unwrap_or_else(|| attempt.client_id.clone());
        if let Some(evicted) = self.scx.registry.connect(client_id.clone(), attempt.remote_addr) {
            self.scx
                .emitter
                .emit(&BrokerEvent::ClientDisconnected {
                    client_id: evicted.client_id,
                    reason: Reason::ConnectKicked,
                })
                .await;
        }
        self.scx
            .emitter
            .emit(&BrokerEvent::ClientConnected { client_id, remote_addr: attempt.remote_addr })
            .await;
        Ok(decision)
    }

    /// Runs a decoded PUBLISH through the interceptor chain, called by the
    /// transport within the publishing connection's task.
    pub async fn on_publish(&self, from: &ClientId, publish: Publish) -> Result<Intercepted> {
        let _guard = InflightGuard::acquire(self);
        if !self.is_running() {
            return Ok(Intercepted::dropped(publish, Reason::BrokerStopping));
        }

        let token = { self.stop_token.lock().clone() };
        let intercepted = tokio::select! {
            biased;
            out = self.scx.chain.run(from, publish.clone()) => out,
            _ = token.cancelled() => Intercepted::dropped(publish, Reason::BrokerStopping),
        };

        self.scx
            .emitter
            .emit(&BrokerEvent::MessageIntercepted {
                client_id: from.clone(),
                topic: intercepted.publish.topic.clone(),
                dropped: intercepted.dropped.clone(),
            })
            .await;
        Ok(intercepted)
    }

    /// Registry removal on socket close or protocol-level disconnect.
    pub async fn on_disconnect(&self, client_id: &str) {
        if let Some(record) = self.scx.registry.disconnect(client_id) {
            self.scx
                .emitter
                .emit(&BrokerEvent::ClientDisconnected {
                    client_id: record.client_id,
                    reason: Reason::ConnectDisconnect,
                })
                .await;
        }
    }
}

/// Keeps the in-flight counter exact on every exit path of `on_publish`
/// and `on_connection_attempt`.
struct InflightGuard<'a> {
    broker: &'a Broker,
}

impl<'a> InflightGuard<'a> {
    #[inline]
    fn acquire(broker: &'a Broker) -> Self {
        broker.inflight.fetch_add(1, Ordering::SeqCst);
        Self { broker }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.broker.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.broker.drained.notify_waiters();
        }
    }
}

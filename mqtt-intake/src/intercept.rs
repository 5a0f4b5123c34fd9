use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytestring::ByteString;
use tokio::sync::RwLock;

use anyhow::Result;

use crate::error::Error;
use crate::types::{ClientId, Intercepted, Publish, Reason};

pub type Priority = u32;

/// What a step decided for the current message.
#[derive(Debug)]
pub enum StepFlow {
    /// Hand the (possibly mutated) message to the next step.
    Continue(Publish),
    /// Terminate the chain, the message is not forwarded.
    Drop(Reason),
}

/// One inspection/transformation step of the publish path.
///
/// Steps are side-effect-isolated from each other: step N+1 sees step N's
/// output, never the original message, so mutation order is significant and
/// follows chain order.
#[async_trait]
pub trait InterceptorStep: Sync + Send {
    /// Stable name used in error reporting.
    fn name(&self) -> &str;

    async fn intercept(&self, from: &ClientId, publish: Publish) -> Result<StepFlow>;
}

type StepKey = (Priority, u64);

/// Ordered interceptor sequence applied to every inbound publish.
///
/// Steps execute in ascending priority; steps of equal priority execute in
/// registration order. A `Drop` short-circuits. A step failure or timeout is
/// converted into a terminal drop and reported, never allowed to take down
/// the broker or to pass silently.
pub struct InterceptorChain {
    steps: RwLock<BTreeMap<StepKey, Arc<dyn InterceptorStep>>>,
    seq: AtomicU64,
    step_timeout: Duration,
}

impl InterceptorChain {
    #[inline]
    pub fn new(step_timeout: Duration) -> Self {
        Self { steps: RwLock::new(BTreeMap::default()), seq: AtomicU64::new(0), step_timeout }
    }

    #[inline]
    pub async fn add(&self, step: Arc<dyn InterceptorStep>) {
        self.add_priority(0, step).await;
    }

    #[inline]
    pub async fn add_priority(&self, priority: Priority, step: Arc<dyn InterceptorStep>) {
        let key = (priority, self.seq.fetch_add(1, Ordering::SeqCst));
        self.steps.write().await.insert(key, step);
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.steps.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.steps.read().await.is_empty()
    }

    /// Left-to-right fold of the registered steps over `publish`.
    pub async fn run(&self, from: &ClientId, publish: Publish) -> Intercepted {
        let steps = { self.steps.read().await.values().cloned().collect::<Vec<_>>() };
        let mut acc = publish;
        for step in steps.iter() {
            match tokio::time::timeout(self.step_timeout, step.intercept(from, acc.clone())).await {
                Ok(Ok(StepFlow::Continue(publish))) => {
                    acc = publish;
                }
                Ok(Ok(StepFlow::Drop(reason))) => {
                    return Intercepted::dropped(acc, reason);
                }
                Ok(Err(e)) => {
                    let e = Error::Interceptor { step: step.name().into(), source: e };
                    log::warn!("{from} message dropped, {e}");
                    return Intercepted::dropped(acc, Reason::InterceptError(ByteString::from(e.to_string())));
                }
                Err(_elapsed) => {
                    log::warn!(
                        "{from} message dropped, interceptor step '{}' timed out after {:?}",
                        step.name(),
                        self.step_timeout
                    );
                    return Intercepted::dropped(acc, Reason::InterceptTimeout);
                }
            }
        }
        Intercepted::forwarded(acc)
    }
}

/// Telemetry collaborator fed by [`TelemetryStep`].
#[async_trait]
pub trait MessageObserver: Sync + Send {
    async fn message(&self, from: &ClientId, publish: &Publish);
}

/// Reports publishes to the `log` facade.
pub struct LogObserver;

#[async_trait]
impl MessageObserver for LogObserver {
    async fn message(&self, from: &ClientId, publish: &Publish) {
        log::info!("{from} published to '{}', {} bytes", publish.topic, publish.payload.len());
    }
}

/// Observability step: reports {client id, topic, payload size} to the
/// observer and passes the message through unmodified.
pub struct TelemetryStep {
    observer: Arc<dyn MessageObserver>,
}

impl TelemetryStep {
    #[inline]
    pub fn new(observer: Arc<dyn MessageObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl InterceptorStep for TelemetryStep {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn intercept(&self, from: &ClientId, publish: Publish) -> Result<StepFlow> {
        self.observer.message(from, &publish).await;
        Ok(StepFlow::Continue(publish))
    }
}

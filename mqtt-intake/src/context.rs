use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::event::{EventEmitter, EventListener};
use crate::intercept::{InterceptorChain, InterceptorStep, Priority};
use crate::registry::ClientRegistry;
use crate::settings::Settings;
use crate::validate::{AcceptAll, ConnectValidator};

/// Shared wiring of the pipeline: settings, registry, validator, interceptor
/// chain and event emitter. Cheap to clone, owned by its caller.
#[derive(Clone)]
pub struct BrokerContext {
    inner: Arc<BrokerContextInner>,
}

pub struct BrokerContextInner {
    pub settings: Settings,
    pub registry: ClientRegistry,
    pub chain: InterceptorChain,
    pub validator: Box<dyn ConnectValidator>,
    pub emitter: EventEmitter,
}

impl Deref for BrokerContext {
    type Target = BrokerContextInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BrokerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BrokerContext {{ settings: {:?} }}", self.settings)
    }
}

impl BrokerContext {
    pub fn new(settings: Settings) -> BrokerContextBuilder {
        BrokerContextBuilder::new(settings)
    }
}

pub struct BrokerContextBuilder {
    settings: Settings,
    validator: Option<Box<dyn ConnectValidator>>,
    steps: Vec<(Priority, Arc<dyn InterceptorStep>)>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl BrokerContextBuilder {
    fn new(settings: Settings) -> Self {
        Self { settings, validator: None, steps: Vec::new(), listeners: Vec::new() }
    }

    /// Replace the default accept-all admission policy.
    pub fn validator(mut self, validator: Box<dyn ConnectValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Append an interceptor step at default priority (registration order).
    pub fn step(mut self, step: Arc<dyn InterceptorStep>) -> Self {
        self.steps.push((0, step));
        self
    }

    pub fn step_priority(mut self, priority: Priority, step: Arc<dyn InterceptorStep>) -> Self {
        self.steps.push((priority, step));
        self
    }

    /// Register an external event listener.
    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub async fn build(self) -> BrokerContext {
        let validator = self
            .validator
            .unwrap_or_else(|| Box::new(AcceptAll::new(self.settings.policy.empty_client_id)));

        let chain = InterceptorChain::new(self.settings.intercept_timeout);
        for (priority, step) in self.steps {
            chain.add_priority(priority, step).await;
        }

        let emitter = EventEmitter::new();
        for listener in self.listeners {
            emitter.add(listener).await;
        }

        BrokerContext {
            inner: Arc::new(BrokerContextInner {
                settings: self.settings,
                registry: ClientRegistry::new(),
                chain,
                validator,
                emitter,
            }),
        }
    }
}

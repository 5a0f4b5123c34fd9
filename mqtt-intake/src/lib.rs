#![deny(unsafe_code)]

//! # Overall Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mqtt_intake::broker::Broker;
//! use mqtt_intake::context::BrokerContext;
//! use mqtt_intake::event::LogListener;
//! use mqtt_intake::intercept::{LogObserver, TelemetryStep};
//! use mqtt_intake::settings::Settings;
//! use mqtt_intake::types::{ConnectionAttempt, Publish, QoS};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scx = BrokerContext::new(Settings::new(None)?)
//!         .listener(Arc::new(LogListener))
//!         .step(Arc::new(TelemetryStep::new(Arc::new(LogObserver))))
//!         .build()
//!         .await;
//!
//!     let broker = Broker::new(scx);
//!     broker.start().await?;
//!
//!     // the transport layer drives the pipeline:
//!     let attempt = ConnectionAttempt::new("sensor-1".into(), "10.0.0.5:53211".parse()?);
//!     let decision = broker.on_connection_attempt(attempt).await?;
//!     assert!(decision.accepted);
//!
//!     let publish = Publish::new("home/temp".into(), "21.5".into(), QoS::AtMostOnce, false);
//!     let out = broker.on_publish(&"sensor-1".into(), publish).await?;
//!     assert!(!out.is_dropped());
//!
//!     broker.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod broker; // Lifecycle controller and inbound transport interface
pub mod context; // Shared pipeline wiring
pub mod error; // Error taxonomy
pub mod event; // Observable events and listeners
pub mod intercept; // Message interceptor chain
pub mod registry; // Connected-clients registry
pub mod settings; // Configuration
pub mod types; // Common data types
pub mod utils; // Small helpers
pub mod validate; // Connection validator

pub use error::{Error, Result};

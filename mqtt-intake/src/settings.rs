use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::{Config, File};
use serde::Deserialize;

use crate::utils::deserialize_duration;
use crate::validate::EmptyClientIdPolicy;

/// Broker configuration, loaded from an optional TOML file plus
/// `MQTT_INTAKE`-prefixed environment variables. Explicitly constructed and
/// passed to the broker context; there is no process-wide instance.
#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub listen: Listen,
    #[serde(default)]
    pub policy: Policy,
    /// Upper bound for the validator's external lookups; on expiry the
    /// attempt is rejected with `ServerUnavailable`.
    #[serde(default = "Inner::validate_timeout_default", deserialize_with = "deserialize_duration")]
    pub validate_timeout: Duration,
    /// Upper bound for a single interceptor step; on expiry the message is
    /// dropped and the timeout reported.
    #[serde(default = "Inner::intercept_timeout_default", deserialize_with = "deserialize_duration")]
    pub intercept_timeout: Duration,
    /// How long `stop()` waits for in-flight publishes before cancelling
    /// what remains.
    #[serde(default = "Inner::drain_timeout_default", deserialize_with = "deserialize_duration")]
    pub drain_timeout: Duration,
}

impl Inner {
    fn validate_timeout_default() -> Duration {
        Duration::from_secs(5)
    }

    fn intercept_timeout_default() -> Duration {
        Duration::from_secs(5)
    }

    fn drain_timeout_default() -> Duration {
        Duration::from_secs(15)
    }
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            listen: Listen::default(),
            policy: Policy::default(),
            validate_timeout: Self::validate_timeout_default(),
            intercept_timeout: Self::intercept_timeout_default(),
            drain_timeout: Self::drain_timeout_default(),
        }
    }
}

/// Transport inputs, passed through to the (external) transport layer
/// unmodified.
#[derive(Debug, Clone, Deserialize)]
pub struct Listen {
    #[serde(default = "Listen::name_default")]
    pub name: String,
    #[serde(default = "Listen::addr_default")]
    pub addr: SocketAddr,
}

impl Listen {
    fn name_default() -> String {
        "external/tcp".into()
    }

    fn addr_default() -> SocketAddr {
        ([0, 0, 0, 0], 1883).into()
    }
}

impl Default for Listen {
    fn default() -> Self {
        Self { name: Self::name_default(), addr: Self::addr_default() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub empty_client_id: EmptyClientIdPolicy,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self(Arc::new(Inner::default()))
    }
}

impl From<Inner> for Settings {
    fn from(inner: Inner) -> Self {
        Self(Arc::new(inner))
    }
}

impl Settings {
    pub fn new(cfg_name: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("mqtt-intake").required(false))
            .add_source(config::Environment::with_prefix("mqtt_intake").try_parsing(true));

        if let Some(cfg) = cfg_name {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen.addr, "0.0.0.0:1883".parse().unwrap());
        assert_eq!(settings.listen.name, "external/tcp");
        assert_eq!(settings.validate_timeout, Duration::from_secs(5));
        assert_eq!(settings.intercept_timeout, Duration::from_secs(5));
        assert_eq!(settings.drain_timeout, Duration::from_secs(15));
        assert_eq!(settings.policy.empty_client_id, EmptyClientIdPolicy::Assign);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let settings = Settings::new(None).unwrap();
        assert_eq!(settings.listen.addr.port(), 1883);
    }
}

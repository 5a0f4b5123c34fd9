use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::utils::timestamp_millis;

pub type ClientId = ByteString;
pub type Topic = ByteString;
pub type TimestampMillis = i64;

/// Quality of Service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// At most once delivery
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    #[inline]
    pub fn value(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    #[inline]
    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(v),
        }
    }
}

/// Connection attempt metadata, constructed by the transport layer once per
/// CONNECT and consumed once by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub client_id: ClientId,
    pub remote_addr: SocketAddr,
}

impl ConnectionAttempt {
    #[inline]
    pub fn new(client_id: ClientId, remote_addr: SocketAddr) -> Self {
        Self { client_id, remote_addr }
    }
}

impl fmt::Display for ConnectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.client_id, self.remote_addr)
    }
}

/// CONNACK-aligned reason codes, v3.1.1 subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectAckReason {
    Success,
    ClientIdentifierNotValid,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    Unauthorized,
}

impl ConnectAckReason {
    #[inline]
    pub fn success(&self) -> bool {
        matches!(self, ConnectAckReason::Success)
    }
}

/// Verdict of the connection validator, consumed by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDecision {
    pub accepted: bool,
    pub reason: ConnectAckReason,
    /// Set when the empty-client-id policy assigned a synthetic id; the
    /// registry records the client under this id.
    pub assigned_client_id: Option<ClientId>,
}

impl ConnectDecision {
    #[inline]
    pub fn accept() -> Self {
        Self { accepted: true, reason: ConnectAckReason::Success, assigned_client_id: None }
    }

    #[inline]
    pub fn accept_with_id(client_id: ClientId) -> Self {
        Self { accepted: true, reason: ConnectAckReason::Success, assigned_client_id: Some(client_id) }
    }

    #[inline]
    pub fn reject(reason: ConnectAckReason) -> Self {
        Self { accepted: false, reason, assigned_client_id: None }
    }
}

/// A decoded PUBLISH, handed in by the transport layer. Transient, flows
/// through the interceptor chain and out to the fan-out collaborator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publish {
    pub topic: Topic,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub create_time: Option<TimestampMillis>,
}

impl Publish {
    #[inline]
    pub fn new(topic: Topic, payload: Bytes, qos: QoS, retain: bool) -> Self {
        Self { topic, payload, qos, retain, create_time: Some(timestamp_millis()) }
    }
}

impl fmt::Debug for Publish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publish")
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("retain", &self.retain)
            .field("payload", &"<REDACTED>")
            .field("create_time", &self.create_time)
            .finish()
    }
}

/// Why a message was dropped or a client disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    ConnectDisconnect,
    /// Session taken over by a new connection with the same client id.
    ConnectKicked,
    InterceptDenied(ByteString),
    InterceptError(ByteString),
    InterceptTimeout,
    BrokerStopping,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ConnectDisconnect => write!(f, "Disconnect"),
            Reason::ConnectKicked => write!(f, "Kicked"),
            Reason::InterceptDenied(r) => write!(f, "InterceptDenied({r})"),
            Reason::InterceptError(r) => write!(f, "InterceptError({r})"),
            Reason::InterceptTimeout => write!(f, "InterceptTimeout"),
            Reason::BrokerStopping => write!(f, "BrokerStopping"),
        }
    }
}

/// Outcome of running a publish through the interceptor chain.
///
/// `dropped.is_some()` means the message must not be forwarded; `publish` is
/// the last state the chain observed, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercepted {
    pub publish: Publish,
    pub dropped: Option<Reason>,
}

impl Intercepted {
    #[inline]
    pub fn forwarded(publish: Publish) -> Self {
        Self { publish, dropped: None }
    }

    #[inline]
    pub fn dropped(publish: Publish, reason: Reason) -> Self {
        Self { publish, dropped: Some(reason) }
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.dropped.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_values() {
        for v in 0..=2u8 {
            assert_eq!(QoS::try_from(v).unwrap().value(), v);
        }
        assert_eq!(QoS::try_from(3), Err(3));
    }

    #[test]
    fn connack_reason() {
        assert!(ConnectAckReason::Success.success());
        assert!(!ConnectAckReason::ServerUnavailable.success());
    }

    #[test]
    fn publish_debug_redacts_payload() {
        let p = Publish::new("home/temp".into(), "secret".into(), QoS::AtLeastOnce, false);
        let s = format!("{p:?}");
        assert!(s.contains("<REDACTED>"));
        assert!(!s.contains("secret"));
    }

    #[test]
    fn reason_display() {
        assert_eq!(Reason::ConnectKicked.to_string(), "Kicked");
        assert_eq!(
            Reason::InterceptDenied(bytestring::ByteString::from_static("acl")).to_string(),
            "InterceptDenied(acl)"
        );
    }
}

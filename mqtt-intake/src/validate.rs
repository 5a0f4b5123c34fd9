use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ClientId, ConnectAckReason, ConnectDecision, ConnectionAttempt};

/// Connection admission policy, one per broker.
///
/// Must be a total function over attempts: no side effects on broker state,
/// read-only external lookups at most. Substituting a stricter policy
/// (credential check, rate limiting) does not touch the broker itself.
#[async_trait]
pub trait ConnectValidator: Sync + Send {
    async fn validate(&self, attempt: &ConnectionAttempt) -> ConnectDecision;
}

/// What to do with a CONNECT carrying an empty client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyClientIdPolicy {
    /// Assign a synthetic unique id and accept.
    Assign,
    /// Reject with `ClientIdentifierNotValid`.
    Reject,
}

impl Default for EmptyClientIdPolicy {
    fn default() -> Self {
        EmptyClientIdPolicy::Assign
    }
}

#[inline]
pub(crate) fn assign_client_id() -> ClientId {
    ClientId::from(format!("auto-{}", Uuid::new_v4().as_simple()))
}

/// Default policy: accept every attempt with `Success`.
///
/// Empty client ids are handled per the configured [`EmptyClientIdPolicy`]
/// rather than being admitted as-is, so the registry uniqueness invariant
/// holds even for anonymous clients.
pub struct AcceptAll {
    empty_client_id: EmptyClientIdPolicy,
}

impl AcceptAll {
    #[inline]
    pub fn new(empty_client_id: EmptyClientIdPolicy) -> Self {
        Self { empty_client_id }
    }
}

impl Default for AcceptAll {
    fn default() -> Self {
        Self::new(EmptyClientIdPolicy::default())
    }
}

#[async_trait]
impl ConnectValidator for AcceptAll {
    async fn validate(&self, attempt: &ConnectionAttempt) -> ConnectDecision {
        if attempt.client_id.is_empty() {
            return match self.empty_client_id {
                EmptyClientIdPolicy::Assign => ConnectDecision::accept_with_id(assign_client_id()),
                EmptyClientIdPolicy::Reject => {
                    ConnectDecision::reject(ConnectAckReason::ClientIdentifierNotValid)
                }
            };
        }
        ConnectDecision::accept()
    }
}

use std::net::SocketAddr;

use dashmap::DashMap;

use crate::types::{ClientId, TimestampMillis};
use crate::utils::timestamp_millis;

/// State of one admitted client, owned exclusively by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub remote_addr: SocketAddr,
    pub connected_at: TimestampMillis,
}

/// Concurrent connected-clients map, the only structure shared across
/// connection tasks.
///
/// Invariant: at most one record per client id. A `connect` with an id that
/// is already present atomically replaces the stale record (MQTT takeover)
/// and hands it back so the caller can report the kick.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientRecord>,
}

impl ClientRegistry {
    #[inline]
    pub fn new() -> Self {
        Self { clients: DashMap::default() }
    }

    /// Insert a record for a freshly accepted connection, evicting any prior
    /// record under the same id. Returns the evicted record, if any.
    #[inline]
    pub fn connect(&self, client_id: ClientId, remote_addr: SocketAddr) -> Option<ClientRecord> {
        let record =
            ClientRecord { client_id: client_id.clone(), remote_addr, connected_at: timestamp_millis() };
        self.clients.insert(client_id, record)
    }

    /// Remove on socket close or protocol-level disconnect.
    #[inline]
    pub fn disconnect(&self, client_id: &str) -> Option<ClientRecord> {
        self.clients.remove(client_id).map(|(_, record)| record)
    }

    #[inline]
    pub fn get(&self, client_id: &str) -> Option<ClientRecord> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    /// Check if client_id exist
    #[inline]
    pub fn exist(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ClientRecord> + '_ {
        self.clients.iter().map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::ClientRegistry;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn connect_lookup_disconnect() {
        let registry = ClientRegistry::new();
        assert!(registry.connect("sensor-1".into(), addr("10.0.0.5:53211")).is_none());

        let record = registry.get("sensor-1").unwrap();
        assert_eq!(record.client_id, "sensor-1");
        assert_eq!(record.remote_addr, addr("10.0.0.5:53211"));
        assert!(registry.exist("sensor-1"));

        assert_eq!(registry.iter().count(), 1);

        let removed = registry.disconnect("sensor-1").unwrap();
        assert_eq!(removed.client_id, "sensor-1");
        assert!(registry.get("sensor-1").is_none());
        assert!(registry.disconnect("sensor-1").is_none());
    }

    #[test]
    fn takeover_evicts_prior_record() {
        let registry = ClientRegistry::new();
        assert!(registry.connect("dev".into(), addr("10.0.0.1:1000")).is_none());
        let evicted = registry.connect("dev".into(), addr("10.0.0.2:2000")).unwrap();
        assert_eq!(evicted.remote_addr, addr("10.0.0.1:1000"));

        //exactly one record remains, the new one
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("dev").unwrap().remote_addr, addr("10.0.0.2:2000"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_connects_distinct_ids() {
        let registry = Arc::new(ClientRegistry::new());
        let n = 256;

        let mut tasks = Vec::with_capacity(n);
        for i in 0..n {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let client_id = format!("client-{i}");
                registry.connect(client_id.clone().into(), addr("127.0.0.1:1883"));
                assert!(registry.exist(&client_id));
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(registry.len(), n);

        //and drain them concurrently
        let mut tasks = Vec::with_capacity(n);
        for i in 0..n {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                assert!(registry.disconnect(&format!("client-{i}")).is_some());
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_takeover_single_record() {
        let registry = Arc::new(ClientRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..64u16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.connect("shared".into(), addr(&format!("10.0.0.9:{}", 1000 + i)));
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}

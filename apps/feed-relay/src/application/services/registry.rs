//! Client Registry
//!
//! Maps client-declared ids to live downstream connections and fans
//! messages out to all of them.
//!
//! # Semantics
//!
//! - Registering an id that already exists replaces its connection
//! - A disconnect removes only records that still point at that connection,
//!   so an id re-registered on a newer connection survives
//! - Broadcast is best-effort; one failed send never stops the others

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{ClientConnectionPort, ConnectionId};
use crate::domain::protocol::ClientId;

/// Result of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Registered clients a send was attempted for.
    pub attempted: usize,
    /// Sends that were queued.
    pub delivered: usize,
    /// Sends that failed (closed connection or full queue).
    pub failed: usize,
}

/// Registry of downstream clients.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Arc<dyn ClientConnectionPort>>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a client id, replacing any prior record.
    ///
    /// Returns the id of the connection that was replaced, if any.
    pub fn register(
        &self,
        client_id: ClientId,
        connection: Arc<dyn ClientConnectionPort>,
    ) -> Option<ConnectionId> {
        let connection_id = connection.id();
        let previous = self.clients.write().insert(client_id.clone(), connection);
        let replaced = previous.map(|c| c.id());

        tracing::info!(
            client_id = %client_id,
            connection_id,
            replaced = ?replaced,
            "Client registered"
        );
        replaced
    }

    /// Remove every record pointing at a connection.
    ///
    /// Returns the client ids that were removed.
    pub fn unregister_connection(&self, connection_id: ConnectionId) -> Vec<ClientId> {
        let mut removed = Vec::new();
        self.clients.write().retain(|client_id, connection| {
            if connection.id() == connection_id {
                removed.push(client_id.clone());
                false
            } else {
                true
            }
        });

        if !removed.is_empty() {
            tracing::info!(connection_id, clients = ?removed, "Client unregistered");
        }
        removed
    }

    /// Send a text frame to every registered client.
    pub fn broadcast(&self, text: &str) -> BroadcastReport {
        // Snapshot so no lock is held while sending.
        let targets: Vec<(ClientId, Arc<dyn ClientConnectionPort>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
            .collect();

        let mut report = BroadcastReport {
            attempted: targets.len(),
            ..BroadcastReport::default()
        };

        for (client_id, connection) in targets {
            match connection.send(text) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        client_id = %client_id,
                        connection_id = connection.id(),
                        error = %e,
                        "Broadcast send failed"
                    );
                }
            }
        }

        report
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Registered client ids, sorted.
    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.clients.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ConnectionSendError, MockClientConnectionPort};

    fn connection(
        id: ConnectionId,
        result: Result<(), ConnectionSendError>,
    ) -> Arc<dyn ClientConnectionPort> {
        let mut mock = MockClientConnectionPort::new();
        mock.expect_id().return_const(id);
        mock.expect_send().returning(move |_| result);
        Arc::new(mock)
    }

    #[test]
    fn register_overwrites_existing_id() {
        let registry = ClientRegistry::new();

        assert!(registry.register(ClientId::new("a"), connection(1, Ok(()))).is_none());
        assert_eq!(registry.register(ClientId::new("a"), connection(2, Ok(()))), Some(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn broadcast_continues_past_failures() {
        let registry = ClientRegistry::new();
        registry.register(ClientId::new("a"), connection(1, Ok(())));
        registry.register(
            ClientId::new("b"),
            connection(2, Err(ConnectionSendError::Closed)),
        );
        registry.register(ClientId::new("c"), connection(3, Ok(())));
        registry.register(ClientId::new("d"), connection(4, Err(ConnectionSendError::Full)));

        let report = registry.broadcast("{}");

        assert_eq!(
            report,
            BroadcastReport {
                attempted: 4,
                delivered: 2,
                failed: 2
            }
        );
    }

    #[test]
    fn broadcast_sends_exact_text_to_each_client() {
        let registry = ClientRegistry::new();
        for id in 1..=3u64 {
            let mut mock = MockClientConnectionPort::new();
            mock.expect_id().return_const(id);
            mock.expect_send()
                .withf(|text| text == r#"{"marketdata":[]}"#)
                .times(1)
                .returning(|_| Ok(()));
            registry.register(ClientId::new(id.to_string()), Arc::new(mock));
        }

        let report = registry.broadcast(r#"{"marketdata":[]}"#);
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn broadcast_with_no_clients() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.broadcast("{}"), BroadcastReport::default());
    }

    #[test]
    fn unregister_removes_all_ids_for_connection() {
        let registry = ClientRegistry::new();
        let shared = connection(7, Ok(()));
        registry.register(ClientId::new("a"), Arc::clone(&shared));
        registry.register(ClientId::new("b"), shared);
        registry.register(ClientId::new("c"), connection(8, Ok(())));

        let removed = registry.unregister_connection(7);

        assert_eq!(removed.len(), 2);
        assert_eq!(registry.client_ids(), vec![ClientId::new("c")]);
    }

    #[test]
    fn unregister_keeps_record_moved_to_newer_connection() {
        let registry = ClientRegistry::new();
        registry.register(ClientId::new("a"), connection(1, Ok(())));
        registry.register(ClientId::new("a"), connection(2, Ok(())));

        assert!(registry.unregister_connection(1).is_empty());
        assert_eq!(registry.client_ids(), vec![ClientId::new("a")]);

        assert_eq!(registry.unregister_connection(2), vec![ClientId::new("a")]);
        assert!(registry.is_empty());
    }
}

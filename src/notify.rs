//! Delivery of notifications from background services to IRC.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::Error;
use crate::irc::{MessageSink, Sender};

/// Routes `(server, target, text)` notifications to the matching connection.
///
/// Lines go through the connection's own rate-limited send path.
#[derive(Clone, Default)]
pub struct Notifier {
    senders: Arc<RwLock<HashMap<String, Sender>>>,
}

impl Notifier {
    /// Creates a notifier with no servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `sender` reachable under its server id, replacing any previous sender.
    pub async fn register(&self, sender: Sender) {
        let server_id = sender.server_id().to_string();

        debug!(%server_id, "registering notification target");
        self.senders.write().await.insert(server_id, sender);
    }

    /// Returns the ids of the registered servers.
    pub async fn servers(&self) -> Vec<String> {
        let mut servers: Vec<String> = self.senders.read().await.keys().cloned().collect();

        servers.sort();
        servers
    }

    /// Returns the status line of every registered server.
    pub async fn statuses(&self) -> Vec<String> {
        let senders = self.senders.read().await;
        let mut statuses: Vec<String> = senders
            .iter()
            .map(|(id, sender)| format!("[{id}] {}", sender.status()))
            .collect();

        statuses.sort();
        statuses
    }

    /// Sends `text` to `target` on the server `server_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownServer`] if no such server is registered, or the send error.
    pub async fn send(&self, server_id: &str, target: &str, text: &str) -> Result<(), Error> {
        let sender = self
            .senders
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| Error::UnknownServer(server_id.to_string()))?;

        sender.send_message(target, text).await
    }
}

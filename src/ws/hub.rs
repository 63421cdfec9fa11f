//! Outbound fan-out to live WebSocket connections

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::{ConnId, Dispatch};
use crate::ws::protocol::ServerMsg;

/// Writer-task channels keyed by connection id
#[derive(Default)]
pub struct ConnectionHub {
    senders: DashMap<ConnId, mpsc::UnboundedSender<ServerMsg>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; the receiver feeds its writer task
    pub fn register(&self, conn_id: ConnId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(conn_id, tx);
        rx
    }

    pub fn unregister(&self, conn_id: ConnId) {
        self.senders.remove(&conn_id);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Queue a message for one connection. Unknown or closed connections are skipped.
    pub fn send(&self, conn_id: ConnId, msg: ServerMsg) {
        if let Some(tx) = self.senders.get(&conn_id) {
            if tx.send(msg).is_err() {
                debug!(conn_id = %conn_id, "Writer gone, dropping message");
            }
        }
    }

    /// Deliver router output in order
    pub fn deliver(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            for conn_id in dispatch.targets {
                self.send(conn_id, dispatch.msg.clone());
            }
        }
    }
}

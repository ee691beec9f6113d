//! Fan-out of outbound messages to every attached WebSocket peer.
//!
//! Each peer gets a small private buffer; a slow peer drops its own
//! messages and never blocks the producer.

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Per-peer outbound buffer size.
const PEER_BUFFER: usize = 8;

#[derive(Default)]
pub struct MessageForwarder {
    peers: RwLock<Vec<mpsc::Sender<Vec<u8>>>>,
}

impl MessageForwarder {
    pub fn new() -> MessageForwarder {
        MessageForwarder::default()
    }

    /// Register a peer. The returned receiver is the peer's private outbound
    /// buffer; dropping it detaches the peer (pruned on the next send).
    pub fn attach(&self) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(PEER_BUFFER);
        self.peers.write().push(tx);
        rx
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Fan a message out to every attached peer, non-blocking.
    pub fn send_message(&self, msg: &[u8]) {
        let mut prune = false;
        for peer in self.peers.read().iter() {
            match peer.try_send(msg.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("peer buffer full, dropping message for slow peer");
                }
                Err(TrySendError::Closed(_)) => prune = true,
            }
        }
        if prune {
            self.peers.write().retain(|p| !p.is_closed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_out_to_all_peers() {
        let fwd = MessageForwarder::new();
        let mut a = fwd.attach();
        let mut b = fwd.attach();

        fwd.send_message(b"hello");
        assert_eq!(a.recv().await.unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn slow_peer_drops_without_blocking() {
        let fwd = MessageForwarder::new();
        let mut slow = fwd.attach();
        let mut fast = fwd.attach();

        // overflow the slow peer's buffer
        for i in 0..PEER_BUFFER + 3 {
            fwd.send_message(format!("m{i}").as_bytes());
        }

        // fast peer drained nothing yet either, but the producer never blocked
        // and the slow peer kept only the first PEER_BUFFER messages
        let mut got = 0;
        while slow.try_recv().is_ok() {
            got += 1;
        }
        assert_eq!(got, PEER_BUFFER);
        assert!(fast.try_recv().is_ok());
    }

    #[tokio::test]
    async fn detached_peers_are_pruned() {
        let fwd = MessageForwarder::new();
        let rx = fwd.attach();
        assert_eq!(fwd.peer_count(), 1);

        drop(rx);
        fwd.send_message(b"x");
        assert_eq!(fwd.peer_count(), 0);
    }
}

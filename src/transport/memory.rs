//! In-process duplex transport
//!
//! Connects two endpoints within the same process over `tokio::mpsc` channels.
//! Used by this crate's own integration tests and by callers who want a
//! client and server talking to each other without an external process or
//! socket.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::protocol::JsonRpcMessage;
use crate::transport::{Transport, TransportError};

/// One half of an in-process duplex channel pair.
///
/// Construct a connected pair with [`MemoryTransport::pair`].
pub struct MemoryTransport {
    sender: mpsc::UnboundedSender<JsonRpcMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
}

impl MemoryTransport {
    /// Build two transports wired to each other: messages sent on one are
    /// received on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            sender: tx_a,
            receiver: Mutex::new(rx_b),
        };
        let b = Self {
            sender: tx_b,
            receiver: Mutex::new(rx_a),
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = TransportError;

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Self::Error> {
        self.sender
            .send(message.clone())
            .map_err(|_| TransportError::closed())
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>, Self::Error> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    #[tokio::test]
    async fn messages_sent_on_one_side_arrive_on_the_other() {
        let (client, server) = MemoryTransport::pair();

        let request = JsonRpcMessage::from_request("ping", None, RequestId::new_number(1));
        client.send(&request).await.unwrap();

        let received = server.receive().await.unwrap().unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn dropping_one_side_yields_none_on_receive() {
        let (client, server) = MemoryTransport::pair();
        drop(client);
        assert!(server.receive().await.unwrap().is_none());
    }
}

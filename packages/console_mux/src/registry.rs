use std::net::SocketAddr;

use tokio::net::TcpStream;

/// Default attach-client capacity.
pub const DEFAULT_MAX_CLIENTS: usize = 3;

/// An accepted attach client: its socket (already registered with the
/// dispatcher for readiness) and the peer address it connected from.
#[derive(Debug)]
pub struct AttachClient {
    stream: TcpStream,
    addr: SocketAddr,
}

impl AttachClient {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self { stream, addr }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Insertion-ordered collection of attach clients with a hard capacity
/// bound. Fan-out iterates in insertion order; `len() <= capacity()` holds
/// at all times.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Vec<AttachClient>,
    capacity: usize,
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.capacity
    }

    /// Append a client, preserving insertion order. Returns the client back
    /// when the registry is at capacity so the caller can close it.
    pub fn push(&mut self, client: AttachClient) -> Result<(), AttachClient> {
        if self.is_full() {
            return Err(client);
        }
        self.clients.push(client);
        Ok(())
    }

    /// Remove the client at `index`, reclaiming its slot. Later clients keep
    /// their relative order.
    pub fn remove(&mut self, index: usize) -> AttachClient {
        self.clients.remove(index)
    }

    pub fn get(&self, index: usize) -> Option<&AttachClient> {
        self.clients.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttachClient> {
        self.clients.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn accepted_pair(listener: &TcpListener) -> (AttachClient, TcpStream) {
        let peer = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, addr) = listener.accept().await.unwrap();
        (AttachClient::new(stream, addr), peer)
    }

    #[tokio::test]
    async fn enforces_capacity_bound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut registry = ClientRegistry::new(2);
        let mut peers = Vec::new();

        for _ in 0..2 {
            let (client, peer) = accepted_pair(&listener).await;
            peers.push(peer);
            assert!(registry.push(client).is_ok());
        }
        assert!(registry.is_full());
        assert_eq!(registry.len(), 2);

        let (extra, peer) = accepted_pair(&listener).await;
        peers.push(peer);
        let rejected = registry.push(extra);
        assert!(rejected.is_err());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn preserves_insertion_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut registry = ClientRegistry::new(3);
        let mut peers = Vec::new();
        let mut addrs = Vec::new();

        for _ in 0..3 {
            let (client, peer) = accepted_pair(&listener).await;
            addrs.push(client.addr());
            peers.push(peer);
            registry.push(client).unwrap();
        }

        let seen: Vec<SocketAddr> = registry.iter().map(|c| c.addr()).collect();
        assert_eq!(seen, addrs);
    }

    #[tokio::test]
    async fn removal_reclaims_a_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut registry = ClientRegistry::new(1);

        let (first, _peer_a) = accepted_pair(&listener).await;
        let first_addr = first.addr();
        registry.push(first).unwrap();
        assert!(registry.is_full());

        let removed = registry.remove(0);
        assert_eq!(removed.addr(), first_addr);
        assert!(registry.is_empty());

        let (second, _peer_b) = accepted_pair(&listener).await;
        assert!(registry.push(second).is_ok());
    }
}

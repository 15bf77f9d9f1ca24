use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::Connection;
use crate::command::RemoteCommand;
use crate::error::{Error, Result};

/// The set of registered peers.
///
/// Peers are unique by descriptor; adding the same peer twice keeps one
/// entry. Forwarded commands go to a single peer picked round-robin.
/// Iterate over [`connections`](Self::connections), which is a snapshot,
/// so concurrent registration never disturbs a broadcast in progress.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    peers: Mutex<Vec<Arc<dyn Connection>>>,
    next: AtomicUsize,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the peer was already registered.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) -> bool {
        let descriptor = connection.descriptor();
        let mut peers = self.peers.lock();
        if peers.iter().any(|p| p.descriptor() == descriptor) {
            return false;
        }
        peers.push(connection);
        true
    }

    /// Returns `false` if the peer was not registered.
    pub fn remove_connection(&self, connection: &dyn Connection) -> bool {
        let descriptor = connection.descriptor();
        let mut peers = self.peers.lock();
        let before = peers.len();
        peers.retain(|p| p.descriptor() != descriptor);
        peers.len() != before
    }

    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        self.peers.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    fn pick(&self) -> Result<Arc<dyn Connection>> {
        let peers = self.peers.lock();
        if peers.is_empty() {
            return Err(Error::Send("no peers registered".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % peers.len();
        Ok(Arc::clone(&peers[index]))
    }

    pub async fn send_request(&self, command: &dyn RemoteCommand) -> Result<()> {
        let peer = self.pick()?;
        peer.send_request(command).await
    }

    pub async fn send_response(&self, command: &dyn RemoteCommand) -> Result<()> {
        let peer = self.pick()?;
        peer.send_response(command).await
    }
}

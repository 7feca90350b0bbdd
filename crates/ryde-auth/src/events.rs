//! Session lifecycle broadcast
//!
//! One broadcast channel shared by everything holding a client handle.
//! The only event today is `Unauthorized`: the backend terminally
//! rejected the session and local state was cleared, so UIs should drop
//! to their login surface. Explicit logout never fires it.

use tokio::sync::broadcast;

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The session was torn down after a terminal refresh failure.
    Unauthorized,
}

/// Cloneable broadcast handle for session notifications.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Announce a terminal session loss. Having no receivers is fine.
    pub fn unauthorized(&self) {
        let _ = self.tx.send(AuthEvent::Unauthorized);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

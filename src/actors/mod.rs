//! Background actors.
//!
//! Each actor is an independent tokio task that reports to its owner over a
//! channel and stops when its cancellation token fires:
//! - interval timers driving the pull cycle (Ticker)
//! - the WebSocket push subscription (PushActor)

pub mod push;
pub mod ticker;

use tokio_util::sync::CancellationToken;

pub use push::{ConnectionStatus, PushActor, PushEvent, PushMessage, TreeUpdate};
pub use ticker::{Ticker, TimerGauge};

/// Handle to a running actor, used for graceful shutdown.
///
/// Dropping the handle cancels the actor.
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the actor to shut down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ActorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

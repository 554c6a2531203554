//! Typed publish/subscribe bus for cross-component notifications.
//!
//! Publishing is fire-and-forget: nobody listening is not an error, and a
//! subscriber that falls behind skips what it missed.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::clog_trace;
use crate::model::JobId;

const BUS_CAPACITY: usize = 64;

/// Dashboard view a notification can bring to the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum View {
    #[default]
    Tree,
    Tasks,
}

impl View {
    pub fn toggle(self) -> Self {
        match self {
            View::Tree => View::Tasks,
            View::Tasks => View::Tree,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            View::Tree => "Tree",
            View::Tasks => "Tasks",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Bring `view` to the front for `job`.
    SwitchView { job: JobId, view: View },
    JobCompleted(JobId),
    JobFailed { job: JobId, error: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: BusEvent) -> usize {
        clog_trace!("bus: publish {:?}", event);
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct BusSubscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl BusSubscription {
    /// Next event, or `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

//! Inputs to the update function.

use crossterm::event::KeyEvent;

use crate::bus::BusEvent;
use crate::model::{Job, JobId};
use crate::sync::SyncSnapshot;

#[derive(Debug)]
pub enum Message {
    // Keyboard/terminal events
    Key(KeyEvent),
    Resize(u16, u16),

    /// The coordinator published a new snapshot.
    Synced(SyncSnapshot),
    /// The tracker's job list or selection changed.
    JobsChanged {
        jobs: Vec<Job>,
        selected: Option<JobId>,
    },
    Bus(BusEvent),
}

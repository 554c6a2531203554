//! The Elm Architecture (TEA) layer of the dashboard.
//!
//! - `Model`: what the dashboard shows, mirrored from the coordinator and tracker
//! - `Message`: keyboard input, snapshots and bus notifications
//! - `Command`: requests the logic thread carries out against sync and lifecycle
//! - `update`: pure function that transforms state

pub mod command;
pub mod message;
pub mod model;
pub mod update;

pub use command::Command;
pub use message::Message;
pub use model::{Model, Notification, NotificationLevel};
pub use update::update;

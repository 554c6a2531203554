//! Pure update function for the TEA (The Elm Architecture) pattern.
//!
//! The update function takes a model and a message, mutates the model,
//! and returns a list of commands to execute.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::bus::BusEvent;
use crate::{clog, clog_debug, clog_warn};

use super::command::Command;
use super::message::Message;
use super::model::{Model, Notification, NotificationLevel};

fn set_error(model: &mut Model, message: String) {
    clog_warn!("UI Error: {}", message);
    model.notification = Some(Notification {
        level: NotificationLevel::Error,
        message,
    });
    model.dirty = true;
}

fn set_info(model: &mut Model, message: String) {
    model.notification = Some(Notification {
        level: NotificationLevel::Info,
        message,
    });
    model.dirty = true;
}

/// Pure update function: Model + Message → Commands
///
/// All I/O happens via the returned Commands.
pub fn update(model: &mut Model, msg: Message) -> Vec<Command> {
    let mut cmds = Vec::new();

    match msg {
        Message::Key(key) => {
            model.notification = None; // Clear notification on any key press
            model.dirty = true;
            update_key(model, key, &mut cmds);
        }
        Message::Resize(_, _) => {
            model.dirty = true;
        }
        Message::Synced(snapshot) => {
            if snapshot.revision != model.sync.revision || snapshot.target != model.sync.target {
                clog_debug!(
                    "Snapshot rev={} gen={} tree={:?} tasks={:?}",
                    snapshot.revision,
                    snapshot.generation,
                    snapshot.tree_state,
                    snapshot.task_state
                );
                model.apply_snapshot(snapshot);
                model.dirty = true;
            }
        }
        Message::JobsChanged { jobs, selected } => {
            model.set_jobs(jobs, selected);
            model.dirty = true;
        }
        Message::Bus(event) => match event {
            BusEvent::SwitchView { job, view } => {
                clog!("Job {} running, showing {}", job, view.label());
                model.view = view;
                set_info(model, format!("Job {} is running", job.short()));
            }
            BusEvent::JobCompleted(job) => {
                set_info(model, format!("Job {} completed", job.short()));
            }
            BusEvent::JobFailed { job, error } => {
                set_error(model, format!("Job {} failed: {}", job.short(), error));
            }
        },
    }

    cmds
}

fn update_key(model: &mut Model, key: KeyEvent, cmds: &mut Vec<Command>) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        cmds.push(Command::Quit);
        return;
    }

    match key.code {
        KeyCode::Tab => {
            model.view = model.view.toggle();
        }
        KeyCode::Char('j') | KeyCode::Down => {
            let order = model.focus_order(model.view);
            model.selection.step(model.view, &order, 1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            let order = model.focus_order(model.view);
            model.selection.step(model.view, &order, -1);
        }
        KeyCode::Esc => {
            if model.selection.focused(model.view).is_some() {
                model.selection.clear(model.view);
            } else {
                cmds.push(Command::Quit);
            }
        }
        KeyCode::Char('J') => {
            if model.jobs.is_empty() {
                set_error(model, "No jobs to select".to_string());
            } else {
                cmds.push(Command::SelectRelativeJob(1));
            }
        }
        KeyCode::Char('K') => {
            if model.jobs.is_empty() {
                set_error(model, "No jobs to select".to_string());
            } else {
                cmds.push(Command::SelectRelativeJob(-1));
            }
        }
        KeyCode::Char('g') => {
            cmds.push(Command::ObserveGlobal);
        }
        KeyCode::Char('r') => {
            cmds.push(Command::Retry);
        }
        KeyCode::Char('R') => {
            set_info(model, "Asked backend to refresh".to_string());
            cmds.push(Command::BackendRefresh);
        }
        KeyCode::Char('q') => {
            cmds.push(Command::Quit);
        }
        KeyCode::Char('?') => {
            model.show_keymap = !model.show_keymap;
        }
        _ => {}
    }
}

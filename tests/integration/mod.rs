//! Integration test suite for canopy.
//!
//! These tests drive the sync coordinator, job tracker, layout engines and
//! the dashboard model together against an in-memory backend. Time is
//! paused, so timer cadences run instantly and deterministically.
//!
//! # Test Categories
//!
//! - `sync_flow`: Ordering, debounce, fallback and target-switch guarantees
//! - `lifecycle_flow`: Job promotion, completion and auto-selection
//! - `layout_scenarios`: Tree and task layouts for reference snapshots
//! - `dashboard`: Wired dashboard feeding the model and the renderer
//!
//! # CI Compatibility
//!
//! No test opens a socket or talks to a real backend.

mod fixtures;

mod dashboard;
mod layout_scenarios;
mod lifecycle_flow;
mod sync_flow;

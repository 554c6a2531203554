//! Per-kind debounce floor for background pulls.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::{PullKind, PullMode};
use crate::config::CadenceConfig;

#[derive(Debug, Clone)]
pub struct Debouncer {
    floors: HashMap<PullKind, Duration>,
    last: HashMap<PullKind, Instant>,
}

impl Debouncer {
    pub fn new(cadence: &CadenceConfig) -> Self {
        let floors = HashMap::from([
            (PullKind::Tree, cadence.tree_debounce()),
            (PullKind::Tasks, cadence.task_debounce()),
        ]);
        Self {
            floors,
            last: HashMap::new(),
        }
    }

    /// Decide whether a pull may go out now, recording it if so.
    ///
    /// Silent pulls inside the floor are refused. Loud pulls always pass
    /// and still reset the window.
    pub fn admit(&mut self, kind: PullKind, mode: PullMode, now: Instant) -> bool {
        if mode == PullMode::Silent {
            if let (Some(last), Some(floor)) = (self.last.get(&kind), self.floors.get(&kind)) {
                if now.saturating_duration_since(*last) < *floor {
                    return false;
                }
            }
        }
        self.last.insert(kind, now);
        true
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer() -> Debouncer {
        Debouncer::new(&CadenceConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_inside_floor_is_refused() {
        let mut d = debouncer();
        let t0 = Instant::now();
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0));
        assert!(!d.admit(PullKind::Tree, PullMode::Silent, t0 + Duration::from_millis(999)));
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0 + Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let mut d = debouncer();
        let t0 = Instant::now();
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0));
        assert!(d.admit(PullKind::Tasks, PullMode::Silent, t0));
        assert!(!d.admit(PullKind::Tasks, PullMode::Silent, t0 + Duration::from_millis(1500)));
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0 + Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loud_bypasses_and_resets_window() {
        let mut d = debouncer();
        let t0 = Instant::now();
        assert!(d.admit(PullKind::Tasks, PullMode::Silent, t0));
        let t1 = t0 + Duration::from_millis(500);
        assert!(d.admit(PullKind::Tasks, PullMode::Loud, t1));
        assert!(!d.admit(PullKind::Tasks, PullMode::Silent, t0 + Duration::from_millis(2100)));
        assert!(d.admit(PullKind::Tasks, PullMode::Silent, t1 + Duration::from_millis(2000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forgets_history() {
        let mut d = debouncer();
        let t0 = Instant::now();
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0));
        d.reset();
        assert!(d.admit(PullKind::Tree, PullMode::Silent, t0));
    }
}

//! Interval timer actor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ActorHandle;
use crate::clog_trace;

/// Counts timer tasks that are still alive.
///
/// A timer registers when spawned and deregisters when its task actually
/// exits, so the count only drops once cancellation has been observed.
#[derive(Debug, Clone, Default)]
pub struct TimerGauge(Arc<AtomicUsize>);

impl TimerGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GaugeGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        GaugeGuard(self.0.clone())
    }
}

struct GaugeGuard(Arc<AtomicUsize>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sends a copy of `message` every `period`.
///
/// The first tick fires one full period after spawning; the caller is
/// expected to have done the immediate work itself.
pub struct Ticker<T> {
    period: Duration,
    message: T,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Ticker<T>
where
    T: Clone + Send + std::fmt::Debug + 'static,
{
    pub fn new(period: Duration, message: T, tx: mpsc::UnboundedSender<T>) -> Self {
        Self {
            period,
            message,
            tx,
        }
    }

    /// Spawn under `parent`: cancelling the parent stops this timer too.
    pub fn spawn(self, parent: &CancellationToken, gauge: &TimerGauge) -> ActorHandle {
        let cancel = parent.child_token();
        let cancel_clone = cancel.clone();
        let guard = gauge.enter();

        tokio::spawn(async move {
            let _guard = guard;
            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => {
                        clog_trace!("Ticker {:?} cancelled", self.message);
                        break;
                    }
                    _ = interval.tick() => {
                        if self.tx.send(self.message.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}

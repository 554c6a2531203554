//! The sync coordinator: one writer for the observed target's snapshot.
//!
//! Pull results race each other and push frames. Ordering is last-writer-wins
//! by arrival with two guards:
//! - every pull carries the generation it was issued under and is dropped
//!   once the target has changed since;
//! - every tree pull carries the push epoch, so a pull issued before a push
//!   never overwrites that push.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    DataState, Debouncer, PullKind, PullMode, Pulled, SyncEvent, SyncFailure, SyncSnapshot,
    Target, TickKind, TreePayload,
};
use crate::actors::{ActorHandle, PushEvent, PushMessage, Ticker, TimerGauge, TreeUpdate};
use crate::config::{CadenceConfig, Config};
use crate::model::{TaskQueue, TreeNode, TreeStats};
use crate::remote::{Scope, StateSource};
use crate::{clog, clog_debug, clog_trace, clog_warn, Error, Result};

pub struct SyncCoordinator {
    source: Arc<dyn StateSource>,
    cadence: CadenceConfig,
    auto_refresh: bool,

    target: Option<Target>,
    generation: u64,
    push_epoch: u64,
    live: bool,

    root: CancellationToken,
    session: Option<CancellationToken>,
    timers: Vec<ActorHandle>,
    live_timer: Option<ActorHandle>,
    gauge: TimerGauge,
    debouncer: Debouncer,

    snapshot: SyncSnapshot,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    watch_tx: watch::Sender<SyncSnapshot>,
}

impl SyncCoordinator {
    pub fn new(source: Arc<dyn StateSource>, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (watch_tx, _) = watch::channel(SyncSnapshot::default());
        Self {
            source,
            cadence: config.cadence.clone(),
            auto_refresh: config.auto_refresh,
            target: None,
            generation: 0,
            push_epoch: 0,
            live: false,
            root: CancellationToken::new(),
            session: None,
            timers: Vec::new(),
            live_timer: None,
            gauge: TimerGauge::new(),
            debouncer: Debouncer::new(&config.cadence),
            snapshot: SyncSnapshot::default(),
            events_tx,
            events_rx,
            watch_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.watch_tx.subscribe()
    }

    /// Sender for events produced outside the coordinator (push frames).
    pub fn sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
        self.events_tx.clone()
    }

    pub fn snapshot(&self) -> &SyncSnapshot {
        &self.snapshot
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Interval timers whose tasks are still running.
    pub fn live_timers(&self) -> usize {
        self.gauge.live()
    }

    pub fn source(&self) -> Arc<dyn StateSource> {
        self.source.clone()
    }

    /// Begin observing `target`.
    pub fn start(&mut self, target: Target) {
        self.switch_target(target);
    }

    /// Atomically move observation to `target`.
    ///
    /// Old timers are cancelled and the snapshot cleared before one loud pull
    /// per kind goes out for the new target and its timers start. Switching
    /// to the target already observed is a no-op.
    pub fn switch_target(&mut self, target: Target) -> bool {
        if self.target.as_ref() == Some(&target) {
            clog_trace!("SyncCoordinator: already observing {}", target);
            return false;
        }
        clog!("SyncCoordinator: observing {}", target);

        self.end_session();
        self.generation += 1;
        self.target = Some(target);
        self.snapshot = SyncSnapshot::fresh(self.target.clone(), self.generation, &self.snapshot);
        self.debouncer.reset();

        let session = self.root.child_token();
        self.session = Some(session.clone());

        for kind in PullKind::ALL {
            self.pull(kind, PullMode::Loud);
        }

        if self.auto_refresh {
            self.timers = vec![
                self.spawn_ticker(self.cadence.tree(), TickKind::Tree, &session),
                self.spawn_ticker(self.cadence.tasks(), TickKind::Tasks, &session),
            ];
        }
        self.publish();
        true
    }

    /// Stop observing: cancel timers, invalidate in-flight pulls, discard data.
    pub fn stop(&mut self) {
        if self.target.is_none() && self.session.is_none() {
            return;
        }
        clog_debug!("SyncCoordinator: stop");
        self.end_session();
        self.generation += 1;
        self.target = None;
        self.snapshot = SyncSnapshot::fresh(None, self.generation, &self.snapshot);
        self.publish();
    }

    /// Cancel everything, including work not tied to a session.
    pub fn shutdown(&mut self) {
        self.stop();
        self.root.cancel();
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.timers.clear();
        self.live_timer = None;
        self.live = false;
    }

    /// Loud pull of every kind, as after a user-requested retry.
    pub fn retry(&mut self) {
        if self.target.is_none() {
            return;
        }
        clog_debug!("SyncCoordinator: retry");
        self.snapshot.clear_errors();
        for kind in PullKind::ALL {
            self.pull(kind, PullMode::Loud);
        }
        self.publish();
    }

    /// Toggle task status corroboration for a running job.
    pub fn set_live(&mut self, live: bool) {
        if live == self.live {
            return;
        }
        self.live = live;
        if !live {
            self.live_timer = None;
            return;
        }
        let Some(session) = self.session.clone() else {
            self.live = false;
            return;
        };
        if !self.auto_refresh {
            return;
        }
        clog_debug!("SyncCoordinator: task corroboration on");
        self.live_timer =
            Some(self.spawn_ticker(self.cadence.task_status(), TickKind::TaskStatus, &session));
    }

    /// Ask the backend to reload, then pull everything loudly.
    pub fn request_backend_refresh(&self) {
        let source = self.source.clone();
        let tx = self.events_tx.clone();
        let root = self.root.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = root.cancelled() => return,
                result = source.refresh() => result,
            };
            let result = result.map_err(|e| SyncFailure::from_error(PullKind::Tree, &e));
            let _ = tx.send(SyncEvent::BackendRefreshed(result));
        });
    }

    fn spawn_ticker(
        &self,
        period: Duration,
        kind: TickKind,
        session: &CancellationToken,
    ) -> ActorHandle {
        Ticker::new(period, SyncEvent::Tick(kind), self.events_tx.clone())
            .spawn(session, &self.gauge)
    }

    /// Wait for the next event. Never returns `None` while `self` is alive.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events_rx.recv().await
    }

    /// Apply every queued event. Returns whether the snapshot changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.handle_event(event);
        }
        changed
    }

    /// Handle events until `duration` of (tokio) time has passed.
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }
        self.pump();
    }

    /// Handle events until no loud pull is outstanding or `limit` passes.
    pub async fn settle(&mut self, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        while self.snapshot.loading {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Err(Error::Timeout(limit)),
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: SyncEvent) -> bool {
        match event {
            SyncEvent::Tick(kind) => {
                self.pull(kind.pull_kind(), PullMode::Silent);
                false
            }
            SyncEvent::TreeLoaded(pulled) => self.apply_tree(pulled),
            SyncEvent::TasksLoaded(pulled) => self.apply_tasks(pulled),
            SyncEvent::Push(event) => self.apply_push(event),
            SyncEvent::BackendRefreshed(Ok(())) => {
                clog!("SyncCoordinator: backend refreshed");
                self.retry();
                true
            }
            SyncEvent::BackendRefreshed(Err(failure)) => {
                clog_warn!("SyncCoordinator: backend refresh failed: {}", failure.message);
                self.snapshot.set_error(failure);
                self.publish();
                true
            }
        }
    }

    fn pull(&mut self, kind: PullKind, mode: PullMode) {
        let (Some(target), Some(session)) = (self.target.clone(), self.session.clone()) else {
            return;
        };
        if !self.debouncer.admit(kind, mode, Instant::now()) {
            clog_trace!("SyncCoordinator: {} pull debounced", kind.label());
            return;
        }
        if mode == PullMode::Loud {
            self.snapshot.set_state(kind, DataState::Loading);
        }

        let generation = self.generation;
        let epoch = self.push_epoch;
        let source = self.source.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match kind {
                PullKind::Tree => {
                    let fetched = tokio::select! {
                        _ = session.cancelled() => return,
                        fetched = fetch_tree(source.as_ref(), &target) => fetched,
                    };
                    SyncEvent::TreeLoaded(stamp(kind, generation, epoch, mode, fetched))
                }
                PullKind::Tasks => {
                    let fetched = tokio::select! {
                        _ = session.cancelled() => return,
                        fetched = fetch_tasks(source.as_ref(), &target) => fetched,
                    };
                    SyncEvent::TasksLoaded(stamp(kind, generation, epoch, mode, fetched))
                }
            };
            let _ = tx.send(event);
        });
    }

    fn check_generation<T>(&self, pulled: &Pulled<T>, kind: PullKind) -> bool {
        if pulled.generation == self.generation {
            return true;
        }
        let stale = Error::StaleTarget {
            generation: pulled.generation,
            current: self.generation,
        };
        clog_debug!("SyncCoordinator: dropping {} result: {}", kind.label(), stale);
        false
    }

    fn apply_tree(&mut self, pulled: Pulled<TreePayload>) -> bool {
        if !self.check_generation(&pulled, PullKind::Tree) {
            return false;
        }
        if pulled.epoch != self.push_epoch {
            clog_debug!(
                "SyncCoordinator: tree pull from epoch {} superseded by push epoch {}",
                pulled.epoch,
                self.push_epoch
            );
            return false;
        }

        match pulled.outcome {
            Ok(payload) => {
                let source = if pulled.fell_back { "fallback" } else { "pull" };
                self.replace_tree(payload.tree, payload.stats, source);
                self.snapshot.clear_error(PullKind::Tree);
            }
            Err(failure) => self.record_failure(failure, pulled.mode),
        }
        self.publish();
        true
    }

    fn apply_tasks(&mut self, pulled: Pulled<Option<TaskQueue>>) -> bool {
        if !self.check_generation(&pulled, PullKind::Tasks) {
            return false;
        }

        match pulled.outcome {
            Ok(queue) => {
                let state = match &queue {
                    Some(q) if !q.is_empty() => DataState::Ready,
                    _ => DataState::NotProduced,
                };
                self.snapshot.tasks = queue.map(Arc::new);
                self.snapshot.set_state(PullKind::Tasks, state);
                self.snapshot.clear_error(PullKind::Tasks);
            }
            Err(failure) => self.record_failure(failure, pulled.mode),
        }
        self.publish();
        true
    }

    fn record_failure(&mut self, failure: SyncFailure, mode: PullMode) {
        match mode {
            PullMode::Loud => {
                clog_warn!("SyncCoordinator: {}", failure);
                self.snapshot.set_state(failure.kind, DataState::Failed);
                self.snapshot.set_error(failure);
            }
            PullMode::Silent => {
                clog_debug!("SyncCoordinator: background {}", failure);
            }
        }
    }

    fn replace_tree(&mut self, tree: Option<TreeNode>, stats: Option<TreeStats>, source: &str) {
        let stats = match (&tree, stats) {
            (_, Some(stats)) => Some(stats),
            (Some(tree), None) => Some(tree.compute_stats()),
            (None, None) => None,
        };
        let state = if tree.is_some() {
            DataState::Ready
        } else {
            DataState::NotProduced
        };
        self.snapshot.tree = tree.map(Arc::new);
        self.snapshot.stats = stats;
        self.snapshot.set_state(PullKind::Tree, state);
        self.snapshot.last_update = Some(Utc::now());
        self.snapshot.last_source = Some(source.to_string());
    }

    fn apply_push(&mut self, event: PushEvent) -> bool {
        match event {
            PushEvent::Message(PushMessage::ConnectionStatus(status)) => {
                self.snapshot.connected = status.is_connected();
                self.snapshot.connection_message = Some(status.message);
            }
            PushEvent::Message(PushMessage::TreeUpdate(update)) => {
                self.snapshot.connected = true;
                if self.target != Some(Target::Global) {
                    clog_trace!("SyncCoordinator: push ignored for {:?}", self.target);
                    self.publish();
                    return true;
                }
                self.apply_tree_update(update);
            }
            PushEvent::Disconnected(reason) => {
                self.snapshot.connected = false;
                self.snapshot.connection_message = Some(reason);
            }
        }
        self.publish();
        true
    }

    fn apply_tree_update(&mut self, update: TreeUpdate) {
        self.push_epoch += 1;
        let TreeUpdate {
            tree, stats, source, ..
        } = update;
        let source = source.unwrap_or_else(|| "push".to_string());
        self.replace_tree(tree, stats, &source);
        self.snapshot.clear_error(PullKind::Tree);
        // Background pulls restart their window from the push.
        self.debouncer.admit(PullKind::Tree, PullMode::Loud, Instant::now());
    }

    fn publish(&mut self) {
        self.snapshot.revision += 1;
        self.watch_tx.send_replace(self.snapshot.clone());
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn stamp<T>(
    kind: PullKind,
    generation: u64,
    epoch: u64,
    mode: PullMode,
    fetched: Result<(T, bool)>,
) -> Pulled<T> {
    let (outcome, fell_back) = match fetched {
        Ok((value, fell_back)) => (Ok(value), fell_back),
        Err(e) => (Err(SyncFailure::from_error(kind, &e)), false),
    };
    Pulled {
        generation,
        epoch,
        mode,
        fell_back,
        outcome,
    }
}

async fn fetch_tree_pair(source: &dyn StateSource, scope: &Scope) -> Result<TreePayload> {
    let (tree, stats) = tokio::join!(source.fetch_tree(scope), source.fetch_tree_stats(scope));
    let tree = tree?;
    let stats = match stats {
        Ok(stats) => stats,
        Err(e) => {
            clog_debug!("SyncCoordinator: {} stats unavailable: {}", scope, e);
            None
        }
    };
    Ok(TreePayload { tree, stats })
}

/// Fetch the tree pair for `target`, falling back once to the global pair.
async fn fetch_tree(source: &dyn StateSource, target: &Target) -> Result<(TreePayload, bool)> {
    let scope = target.scope();
    match fetch_tree_pair(source, &scope).await {
        Ok(payload) => Ok((payload, false)),
        Err(primary) if target.job().is_some() && primary.is_fallback_candidate() => {
            clog_warn!("SyncCoordinator: {} tree failed ({}), using global", scope, primary);
            fetch_tree_pair(source, &Scope::Global)
                .await
                .map(|payload| (payload, true))
                .map_err(|fallback| fallback_error(&scope, &primary, &fallback))
        }
        Err(e) => Err(e),
    }
}

async fn fetch_tasks(
    source: &dyn StateSource,
    target: &Target,
) -> Result<(Option<TaskQueue>, bool)> {
    let scope = target.scope();
    match source.fetch_tasks(&scope).await {
        Ok(queue) => Ok((queue, false)),
        Err(primary) if target.job().is_some() && primary.is_fallback_candidate() => {
            clog_warn!("SyncCoordinator: {} tasks failed ({}), using global", scope, primary);
            source
                .fetch_tasks(&Scope::Global)
                .await
                .map(|queue| (queue, true))
                .map_err(|fallback| fallback_error(&scope, &primary, &fallback))
        }
        Err(e) => Err(e),
    }
}

fn fallback_error(scope: &Scope, primary: &Error, fallback: &Error) -> Error {
    Error::network(
        scope.to_string(),
        format!("{}; global fallback: {}", primary, fallback),
    )
}

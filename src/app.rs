use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use crossterm::event::{self, Event, KeyCode};
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::actors::{ActorHandle, PushActor};
use crate::bus::{BusSubscription, EventBus};
use crate::config::Config;
use crate::lifecycle::JobLifecycleTracker;
use crate::model::{Job, JobId};
use crate::remote::{HttpStateSource, StateSource};
use crate::render::RenderState;
use crate::sync::{SyncCoordinator, SyncSnapshot, Target};
use crate::tea::{update, Command, Message, Model};
use crate::{clog, clog_debug, clog_warn, Error, Result};

const MAX_BG_MESSAGES: usize = 50;

/// Jobs to watch and the initial target, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub jobs: Vec<Job>,
    /// Start on the global tree even when jobs were given.
    pub global: bool,
}

/// Sync coordinator and job tracker wired together.
///
/// The tracker decides the target; the coordinator follows it. Everything
/// here runs on the logic thread, so it needs no locking.
pub struct Dashboard {
    coordinator: SyncCoordinator,
    tracker: JobLifecycleTracker,
    snapshot_rx: watch::Receiver<SyncSnapshot>,
    bus_rx: BusSubscription,
    last_jobs: Vec<Job>,
    last_selected: Option<JobId>,
}

impl Dashboard {
    pub fn new(source: Arc<dyn StateSource>, config: &Config) -> Self {
        let bus = EventBus::new();
        let bus_rx = bus.subscribe();
        let coordinator = SyncCoordinator::new(source.clone(), config);
        let snapshot_rx = coordinator.subscribe();
        let tracker = JobLifecycleTracker::new(source, config, bus);
        Self {
            coordinator,
            tracker,
            snapshot_rx,
            bus_rx,
            last_jobs: Vec::new(),
            last_selected: None,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn tracker(&self) -> &JobLifecycleTracker {
        &self.tracker
    }

    /// Register the watched jobs and start observing.
    pub fn start(&mut self, options: WatchOptions) {
        for job in options.jobs {
            self.tracker.add_job(job);
        }
        if options.global {
            // Only `None` is passed, which never fails.
            let _ = self.tracker.select(None);
        }
        self.reconcile();
    }

    /// Point the coordinator at the tracker's target.
    fn reconcile(&mut self) {
        let target = self.tracker.target();
        if self.coordinator.target() != Some(&target) {
            self.coordinator.switch_target(target);
        }
        self.coordinator.set_live(self.tracker.selected_is_running());
    }

    /// A pulled tree for a pending job means the backend started it.
    fn observe_activity(&mut self) {
        let snapshot = self.coordinator.snapshot();
        let Some(Target::Job(id)) = &snapshot.target else {
            return;
        };
        // A fallback tree belongs to the global target, not the job.
        let own_tree = snapshot.tree.is_some() && snapshot.last_source.as_deref() == Some("pull");
        let id = id.clone();
        match self.tracker.observe_activity(&id, own_tree) {
            Ok(true) => clog!("Dashboard: job {} started", id.short()),
            Ok(false) => {}
            Err(e) => clog_debug!("Dashboard: activity for {}: {}", id.short(), e),
        }
    }

    /// Drain both event queues and collect what the model must hear about.
    pub fn poll(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();

        self.coordinator.pump();
        self.observe_activity();
        self.tracker.pump();
        self.reconcile();

        let selected = self.tracker.selected().cloned();
        if self.tracker.jobs() != self.last_jobs.as_slice() || selected != self.last_selected {
            self.last_jobs = self.tracker.jobs().to_vec();
            self.last_selected = selected.clone();
            messages.push(Message::JobsChanged {
                jobs: self.last_jobs.clone(),
                selected,
            });
        }

        // Bounded so a burst of notifications cannot starve the keyboard.
        for _ in 0..MAX_BG_MESSAGES {
            let Some(event) = self.bus_rx.try_next() else { break };
            messages.push(Message::Bus(event));
        }

        if self.snapshot_rx.has_changed().unwrap_or(false) {
            let snapshot = self.snapshot_rx.borrow_and_update().clone();
            messages.push(Message::Synced(snapshot));
        }

        messages
    }

    /// Carry out a command. Returns true when the dashboard should quit.
    pub fn execute(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SelectRelativeJob(offset) => {
                if let Some(id) = self.tracker.select_relative(offset) {
                    clog_debug!("Command::SelectRelativeJob -> {}", id.short());
                }
                self.reconcile();
            }
            Command::ObserveGlobal => {
                clog_debug!("Command::ObserveGlobal");
                let _ = self.tracker.select(None);
                self.reconcile();
            }
            Command::Retry => {
                clog_debug!("Command::Retry");
                self.coordinator.retry();
            }
            Command::BackendRefresh => {
                clog_debug!("Command::BackendRefresh");
                self.coordinator.request_backend_refresh();
            }
            Command::Quit => return true,
        }
        false
    }

    pub fn shutdown(&mut self) {
        self.tracker.shutdown();
        self.coordinator.shutdown();
    }
}

/// One loud pull of both kinds for `target`, with no timers and no push.
///
/// Used by the headless commands. A loud failure becomes the error.
pub async fn pull_once(
    source: Arc<dyn StateSource>,
    config: &Config,
    target: Target,
) -> Result<SyncSnapshot> {
    let mut config = config.clone();
    config.auto_refresh = false;
    let mut coordinator = SyncCoordinator::new(source, &config);
    coordinator.start(target);
    // Tree and stats go out together; a job fallback adds one more round.
    coordinator.settle(config.request_timeout() * 3).await?;
    let snapshot = coordinator.snapshot().clone();
    coordinator.shutdown();
    match snapshot.error() {
        Some(failure) => Err(Error::Pull(failure.clone())),
        None => Ok(snapshot),
    }
}

pub struct LogicThread;

impl LogicThread {
    pub fn run(
        config: Config,
        options: WatchOptions,
        state_tx: Sender<RenderState>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        Runtime::new()?.block_on(Self::run_async(config, options, state_tx, shutdown))
    }

    async fn run_async(
        config: Config,
        options: WatchOptions,
        state_tx: Sender<RenderState>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        clog_debug!(
            "LogicThread::run_async api={} ws={} jobs={}",
            config.api_base,
            config.ws_url,
            options.jobs.len()
        );
        let source: Arc<dyn StateSource> = Arc::new(HttpStateSource::from_config(&config)?);
        let mut dashboard = Dashboard::new(source, &config);

        let actors = vec![PushActor::new(&config.ws_url, dashboard.coordinator.sender())
            .with_reconnect_delay(config.cadence.reconnect())
            .with_connect_timeout(config.request_timeout())
            .with_auto_reconnect(config.auto_refresh)
            .spawn()];

        let mut model = Model::new(config);
        dashboard.start(options);

        send_state(&state_tx, &model);
        let mut esc_filter = EscapeSequenceFilter::new();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Keyboard input (priority)
            while event::poll(Duration::ZERO)? {
                let msg = match event::read()? {
                    Event::Key(key) => {
                        if let KeyCode::Char(c) = key.code {
                            if esc_filter.filter(c) {
                                continue;
                            }
                        }
                        Message::Key(key)
                    }
                    Event::Resize(w, h) => Message::Resize(w, h),
                    _ => continue,
                };

                if dispatch(&mut model, &mut dashboard, msg) {
                    shutdown.store(true, Ordering::Relaxed);
                    shutdown_all(&actors, &mut dashboard);
                    return Ok(());
                }

                if model.dirty {
                    send_state(&state_tx, &model);
                    model.dirty = false;
                }
            }

            // Background messages
            for msg in dashboard.poll() {
                if dispatch(&mut model, &mut dashboard, msg) {
                    shutdown.store(true, Ordering::Relaxed);
                    shutdown_all(&actors, &mut dashboard);
                    return Ok(());
                }
            }

            if model.dirty {
                send_state(&state_tx, &model);
                model.dirty = false;
            }

            tokio::time::sleep(Duration::from_micros(500)).await;
        }

        shutdown_all(&actors, &mut dashboard);
        Ok(())
    }
}

/// Run one message through `update` and its commands. Returns true to quit.
fn dispatch(model: &mut Model, dashboard: &mut Dashboard, msg: Message) -> bool {
    for cmd in update(model, msg) {
        if dashboard.execute(cmd) {
            return true;
        }
    }
    false
}

fn shutdown_all(actors: &[ActorHandle], dashboard: &mut Dashboard) {
    for actor in actors {
        actor.shutdown();
    }
    dashboard.shutdown();
    clog!("Dashboard stopped");
}

fn send_state(tx: &Sender<RenderState>, model: &Model) {
    if tx.try_send(model.snapshot()).is_err() {
        // Render thread still holds the previous frame; the next dirty
        // state supersedes it.
        clog_warn!("render channel full, frame skipped");
    }
}

/// Drops the tail of terminal escape sequences that arrive as plain chars.
struct EscapeSequenceFilter {
    len: u8,
    active: bool,
}

impl EscapeSequenceFilter {
    fn new() -> Self {
        Self {
            len: 0,
            active: false,
        }
    }

    fn filter(&mut self, c: char) -> bool {
        if c == '\x1b' || c == '[' || c == 'O' {
            self.active = true;
            self.len = 1;
            return true;
        }
        if self.active {
            self.len += 1;
            if c.is_ascii_alphabetic() || c == '~' || self.len > 10 {
                self.active = false;
            }
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, View};
    use crate::model::{JobStatus, JobSummary, NodeStatus, SummaryResponse, TreeNode};
    use crate::remote::{MemorySource, Scope};
    use crate::sync::{DataState, FailureCause, PullKind};
    use std::time::Instant;

    fn tree(id: &str) -> TreeNode {
        TreeNode::new(id, id, NodeStatus::InProgress)
    }

    async fn settle(dashboard: &mut Dashboard) -> Vec<Message> {
        let mut messages = Vec::new();
        for _ in 0..20 {
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
            messages.extend(dashboard.poll());
        }
        messages
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dashboard Wiring Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test(start_paused = true)]
    async fn test_start_without_jobs_observes_global() {
        let source = Arc::new(MemorySource::new());
        source.set_tree(Scope::Global, Some(tree("g")));
        let mut dashboard = Dashboard::new(source, &Config::default());
        dashboard.start(WatchOptions::default());

        let messages = settle(&mut dashboard).await;
        assert_eq!(dashboard.coordinator().target(), Some(&Target::Global));
        let synced = messages.iter().rev().find_map(|m| match m {
            Message::Synced(s) => Some(s),
            _ => None,
        });
        let synced = synced.expect("snapshot published");
        assert_eq!(synced.tree_state, DataState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_job_promoted_by_its_tree() {
        let source = Arc::new(MemorySource::new());
        let job = JobId::new("job-1");
        source.set_tree(Scope::Job(job.clone()), Some(tree("j")));
        let mut dashboard = Dashboard::new(source, &Config::default());
        dashboard.start(WatchOptions {
            jobs: vec![Job::new("job-1", "case")],
            global: false,
        });

        let messages = settle(&mut dashboard).await;
        assert_eq!(dashboard.tracker().job(&job).unwrap().status, JobStatus::Running);
        assert!(dashboard.coordinator().is_live());
        assert!(messages.iter().any(|m| matches!(
            m,
            Message::Bus(BusEvent::SwitchView { view: View::Tree, .. })
        )));
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::JobsChanged { selected: Some(id), .. } if *id == job)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_tree_does_not_promote() {
        let source = Arc::new(MemorySource::new());
        let job = JobId::new("job-1");
        source.set_tree(Scope::Global, Some(tree("g")));
        source.fail(Scope::Job(job.clone()), crate::remote::Endpoint::Tree);
        let mut dashboard = Dashboard::new(source, &Config::default());
        dashboard.start(WatchOptions {
            jobs: vec![Job::new("job-1", "case")],
            global: false,
        });

        settle(&mut dashboard).await;
        assert_eq!(
            dashboard.coordinator().snapshot().last_source.as_deref(),
            Some("fallback")
        );
        assert_eq!(dashboard.tracker().job(&job).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_move_target() {
        let source = Arc::new(MemorySource::new());
        let mut dashboard = Dashboard::new(source, &Config::default());
        dashboard.start(WatchOptions {
            jobs: vec![Job::new("a", "a"), Job::new("b", "b")],
            global: true,
        });
        assert_eq!(dashboard.coordinator().target(), Some(&Target::Global));

        assert!(!dashboard.execute(Command::SelectRelativeJob(1)));
        assert_eq!(
            dashboard.coordinator().target(),
            Some(&Target::Job(JobId::new("a")))
        );
        dashboard.execute(Command::ObserveGlobal);
        assert_eq!(dashboard.coordinator().target(), Some(&Target::Global));
        assert!(dashboard.execute(Command::Quit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_reaches_model_as_bus_event() {
        let source = Arc::new(MemorySource::new());
        let job = JobId::new("job-1");
        source.set_tree(Scope::Job(job.clone()), Some(tree("j")));
        source.set_summary(
            job.clone(),
            SummaryResponse {
                summary: Some(JobSummary {
                    conclusion: "done".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let mut dashboard = Dashboard::new(source, &Config::default());
        dashboard.start(WatchOptions {
            jobs: vec![Job::new("job-1", "case")],
            global: false,
        });
        settle(&mut dashboard).await;

        // One probe period later the summary lands.
        tokio::time::sleep(Duration::from_millis(3100)).await;
        let messages = settle(&mut dashboard).await;
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::Bus(BusEvent::JobCompleted(id)) if *id == job)));
        assert_eq!(
            dashboard.tracker().job(&job).unwrap().status,
            JobStatus::Completed
        );
        assert!(!dashboard.coordinator().is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_once_returns_snapshot_or_error() {
        let source = Arc::new(MemorySource::new());
        source.set_tree(Scope::Global, Some(tree("g")));
        let snapshot = pull_once(source.clone(), &Config::default(), Target::Global)
            .await
            .unwrap();
        assert_eq!(snapshot.tree.as_deref().map(|t| t.id.as_str()), Some("g"));
        assert_eq!(snapshot.task_state, DataState::NotProduced);

        source.fail(Scope::Global, crate::remote::Endpoint::Tasks);
        let err = tokio_test::assert_err!(
            pull_once(source, &Config::default(), Target::Global).await
        );
        assert!(err.to_string().contains("tasks unavailable"));
        match err {
            Error::Pull(failure) => {
                assert_eq!(failure.kind, PullKind::Tasks);
                assert_eq!(failure.cause, FailureCause::Network);
            }
            other => panic!("Expected Pull error, got {:?}", other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Loop Plumbing Tests
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_escape_filter() {
        let mut filter = EscapeSequenceFilter::new();
        assert!(!filter.filter('j'));
        assert!(!filter.filter('R'));
    }

    #[test]
    fn test_escape_filter_sequence() {
        let mut filter = EscapeSequenceFilter::new();
        assert!(filter.filter('\x1b'));
        assert!(filter.filter('['));
        assert!(filter.filter('A'));
        assert!(!filter.filter('j'));
    }

    #[test]
    fn test_send_state_skips_frames_without_blocking() {
        let (tx, rx) = crossbeam_channel::bounded::<RenderState>(1);
        let model = Model::new(Config::default());
        send_state(&tx, &model);

        let start = Instant::now();
        send_state(&tx, &model);
        assert!(start.elapsed() < Duration::from_millis(50));

        let first = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        send_state(&tx, &model);
        assert!(rx.try_recv().unwrap().version > first.version);
    }
}

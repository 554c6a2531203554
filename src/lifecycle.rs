//! Job lifecycle tracking and target auto-selection.
//!
//! Running jobs are probed on the summary endpoint until a summary (or a
//! failure report) shows up. The tracker owns the job list and the
//! selection; the sync coordinator consumes [`JobLifecycleTracker::target`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actors::{ActorHandle, Ticker, TimerGauge};
use crate::bus::{BusEvent, EventBus, View};
use crate::config::Config;
use crate::model::{Job, JobId, JobStatus, SummaryResponse};
use crate::remote::StateSource;
use crate::sync::Target;
use crate::{clog, clog_debug, clog_warn, Error, Result};

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Probe timer for a running job fired.
    Probe(JobId),
    SummaryLoaded {
        job: JobId,
        result: std::result::Result<SummaryResponse, String>,
    },
}

pub struct JobLifecycleTracker {
    source: Arc<dyn StateSource>,
    probe_period: Duration,
    auto_refresh: bool,
    bus: EventBus,

    jobs: Vec<Job>,
    selected: Option<JobId>,
    /// Jobs that already got their view switch.
    switched: HashSet<JobId>,
    probes: HashMap<JobId, ActorHandle>,
    in_flight: HashSet<JobId>,

    root: CancellationToken,
    gauge: TimerGauge,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl JobLifecycleTracker {
    pub fn new(source: Arc<dyn StateSource>, config: &Config, bus: EventBus) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            source,
            probe_period: config.cadence.job_probe(),
            auto_refresh: config.auto_refresh,
            bus,
            jobs: Vec::new(),
            selected: None,
            switched: HashSet::new(),
            probes: HashMap::new(),
            in_flight: HashSet::new(),
            root: CancellationToken::new(),
            gauge: TimerGauge::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    fn job_mut(&mut self, id: &JobId) -> Result<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    pub fn selected(&self) -> Option<&JobId> {
        self.selected.as_ref()
    }

    pub fn selected_job(&self) -> Option<&Job> {
        self.selected.as_ref().and_then(|id| self.job(id))
    }

    /// Target the sync coordinator should observe.
    pub fn target(&self) -> Target {
        match &self.selected {
            Some(id) => Target::Job(id.clone()),
            None => Target::Global,
        }
    }

    /// Whether the observed job is running, which enables task corroboration.
    pub fn selected_is_running(&self) -> bool {
        self.selected_job()
            .is_some_and(|j| j.status == JobStatus::Running)
    }

    /// Probe timers still alive.
    pub fn live_probes(&self) -> usize {
        self.gauge.live()
    }

    pub fn is_probing(&self, id: &JobId) -> bool {
        self.probes.contains_key(id)
    }

    /// Add a job, or merge it into the entry with the same id.
    pub fn add_job(&mut self, job: Job) {
        let id = job.id.clone();
        match self.jobs.iter_mut().find(|j| j.id == id) {
            Some(existing) => merge_job(existing, job),
            None => self.jobs.push(job),
        }
        let Some(job) = self.job(&id) else {
            return;
        };
        clog!("JobLifecycleTracker: job {} ({}) is {}", id.short(), job.name, job.status);
        if job.status == JobStatus::Running {
            self.start_probe(&id);
        } else {
            self.stop_probe(&id);
        }
        self.auto_select();
    }

    /// Replace the whole job set. Jobs already known are merged, so none
    /// leaves a terminal status.
    pub fn set_jobs(&mut self, jobs: Vec<Job>) {
        self.probes.clear();
        self.in_flight.clear();
        let mut previous: HashMap<JobId, Job> =
            self.jobs.drain(..).map(|j| (j.id.clone(), j)).collect();
        self.jobs = jobs
            .into_iter()
            .map(|job| match previous.remove(&job.id) {
                Some(mut existing) => {
                    merge_job(&mut existing, job);
                    existing
                }
                None => job,
            })
            .collect();
        let running: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id.clone())
            .collect();
        for id in &running {
            self.start_probe(id);
        }
        if let Some(selected) = &self.selected {
            if self.job(selected).is_none() {
                self.selected = None;
            }
        }
        self.auto_select();
    }

    pub fn remove_job(&mut self, id: &JobId) -> Result<Job> {
        let idx = self
            .jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        let job = self.jobs.remove(idx);
        self.stop_probe(id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.auto_select();
        Ok(job)
    }

    /// The caller observed the job start on the backend.
    pub fn mark_running(&mut self, id: &JobId) -> Result<()> {
        let job = self.job_mut(id)?;
        if job.status == JobStatus::Running {
            return Ok(());
        }
        job.start()?;
        clog!("JobLifecycleTracker: job {} running", id.short());
        self.start_probe(id);
        self.auto_select();
        Ok(())
    }

    /// A non-empty tree for a pending job means it has started.
    ///
    /// Returns whether the job was promoted.
    pub fn observe_activity(&mut self, id: &JobId, has_tree: bool) -> Result<bool> {
        if !has_tree {
            return Ok(false);
        }
        match self.job(id).map(|j| j.status) {
            Some(JobStatus::Pending) => {
                self.mark_running(id)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::JobNotFound(id.to_string())),
        }
    }

    /// Fold a summary probe result into the job.
    ///
    /// Returns the new status when the job reached a terminal state.
    pub fn apply_summary(
        &mut self,
        id: &JobId,
        response: SummaryResponse,
    ) -> Result<Option<JobStatus>> {
        let now = Utc::now();
        let job = self.job_mut(id)?;
        if job.status.is_terminal() {
            clog_debug!("JobLifecycleTracker: job {} already {}", id.short(), job.status);
            return Ok(None);
        }

        if response.reports_failure() {
            let error = response
                .error
                .clone()
                .unwrap_or_else(|| "analysis failed".to_string());
            job.fail(&error, now)?;
            clog_warn!("JobLifecycleTracker: job {} failed: {}", id.short(), error);
            self.stop_probe(id);
            self.bus.publish(BusEvent::JobFailed {
                job: id.clone(),
                error,
            });
            self.auto_select();
            return Ok(Some(JobStatus::Failed));
        }

        let Some(summary) = response.summary else {
            return Ok(None);
        };
        if job.status == JobStatus::Pending {
            job.start()?;
        }
        job.complete(summary, now)?;
        clog!("JobLifecycleTracker: job {} completed", id.short());
        self.stop_probe(id);
        self.bus.publish(BusEvent::JobCompleted(id.clone()));
        self.auto_select();
        Ok(Some(JobStatus::Completed))
    }

    /// Manual selection; always honoured. `None` observes the global tree.
    pub fn select(&mut self, id: Option<&JobId>) -> Result<()> {
        if let Some(id) = id {
            if self.job(id).is_none() {
                return Err(Error::JobNotFound(id.to_string()));
            }
        }
        self.selected = id.cloned();
        clog_debug!("JobLifecycleTracker: selected {}", self.target());
        Ok(())
    }

    /// Select the job `offset` places away from the current one, in list order.
    pub fn select_relative(&mut self, offset: isize) -> Option<&JobId> {
        if self.jobs.is_empty() {
            return None;
        }
        let len = self.jobs.len() as isize;
        let current = self
            .selected
            .as_ref()
            .and_then(|id| self.jobs.iter().position(|j| &j.id == id))
            .map(|i| i as isize)
            .unwrap_or(if offset > 0 { -1 } else { len });
        let next = (current + offset).rem_euclid(len) as usize;
        self.selected = Some(self.jobs[next].id.clone());
        self.selected.as_ref()
    }

    fn newest(&self) -> Option<&Job> {
        self.jobs.iter().max_by_key(|j| j.created_at)
    }

    /// Pick the newest job when nothing is selected or it is active and
    /// unselected. A running pick gets one view switch per job.
    fn auto_select(&mut self) {
        let Some(newest) = self.newest() else {
            return;
        };
        let id = newest.id.clone();
        let status = newest.status;
        let is_selected = self.selected.as_ref() == Some(&id);

        if self.selected.is_none() || (status.is_active() && !is_selected) {
            clog_debug!("JobLifecycleTracker: auto-selecting {}", id.short());
            self.selected = Some(id.clone());
        }

        if self.selected.as_ref() == Some(&id)
            && status == JobStatus::Running
            && self.switched.insert(id.clone())
        {
            clog!("JobLifecycleTracker: switching view to job {}", id.short());
            self.bus.publish(BusEvent::SwitchView {
                job: id,
                view: View::Tree,
            });
        }
    }

    fn start_probe(&mut self, id: &JobId) {
        if self.probes.contains_key(id) || !self.auto_refresh {
            return;
        }
        clog_debug!("JobLifecycleTracker: probing job {}", id.short());
        let handle = Ticker::new(
            self.probe_period,
            LifecycleEvent::Probe(id.clone()),
            self.events_tx.clone(),
        )
        .spawn(&self.root, &self.gauge);
        self.probes.insert(id.clone(), handle);
    }

    fn stop_probe(&mut self, id: &JobId) {
        if self.probes.remove(id).is_some() {
            clog_debug!("JobLifecycleTracker: probe for {} stopped", id.short());
        }
        self.in_flight.remove(id);
    }

    /// Fetch the summary for `id` now, outside the probe cadence.
    pub fn probe_now(&mut self, id: &JobId) {
        if !self.in_flight.insert(id.clone()) {
            return;
        }
        let source = self.source.clone();
        let tx = self.events_tx.clone();
        let root = self.root.clone();
        let job = id.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = root.cancelled() => return,
                result = source.fetch_summary(&job) => result,
            };
            let _ = tx.send(LifecycleEvent::SummaryLoaded {
                job,
                result: result.map_err(|e| e.to_string()),
            });
        });
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Probe(id) => {
                if self.is_probing(&id) {
                    self.probe_now(&id);
                }
                false
            }
            LifecycleEvent::SummaryLoaded { job, result } => {
                self.in_flight.remove(&job);
                match result {
                    Ok(response) => match self.apply_summary(&job, response) {
                        Ok(change) => change.is_some(),
                        Err(e) => {
                            clog_debug!("JobLifecycleTracker: summary for {}: {}", job.short(), e);
                            false
                        }
                    },
                    Err(e) => {
                        clog_debug!("JobLifecycleTracker: probe for {} failed: {}", job.short(), e);
                        false
                    }
                }
            }
        }
    }

    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.events_rx.recv().await
    }

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

    pub fn shutdown(&mut self) {
        self.probes.clear();
        self.root.cancel();
    }
}

impl Drop for JobLifecycleTracker {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn merge_job(existing: &mut Job, incoming: Job) {
    if let Err(e) = existing.merge(incoming) {
        clog_warn!(
            "JobLifecycleTracker: kept job {} as {}: {}",
            existing.id.short(),
            existing.status,
            e
        );
    }
}

//! Job tracking against a scripted summary endpoint.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_test::{assert_err, assert_ok};

use canopy::bus::{BusEvent, EventBus, View};
use canopy::config::Config;
use canopy::lifecycle::JobLifecycleTracker;
use canopy::model::{Job, JobId, JobStatus, JobSummary, SummaryResponse};
use canopy::sync::Target;
use canopy::Error;

use crate::fixtures::{source, yield_a_few};

fn job(id: &str, day: u32) -> Job {
    Job::new(id, id).with_created_at(Utc.with_ymd_and_hms(2026, 10, day, 9, 0, 0).unwrap())
}

fn summary(conclusion: &str) -> SummaryResponse {
    SummaryResponse {
        summary: Some(JobSummary {
            conclusion: conclusion.to_string(),
            ..Default::default()
        }),
        status: Some("completed".to_string()),
        error: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_pending_job_runs_then_completes() {
    let source = source();
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let mut tracker = JobLifecycleTracker::new(source.clone(), &Config::default(), bus);
    let id = JobId::new("case-1");

    tracker.add_job(job("case-1", 1));
    assert_eq!(tracker.target(), Target::Job(id.clone()));
    assert!(!tracker.is_probing(&id));

    assert!(assert_ok!(tracker.observe_activity(&id, true)));
    assert!(tracker.is_probing(&id));
    assert!(tracker.selected_is_running());
    assert_eq!(
        events.try_next(),
        Some(BusEvent::SwitchView {
            job: id.clone(),
            view: View::Tree
        })
    );

    // Nothing yet: the probe keeps going.
    tracker.run_for(Duration::from_millis(3100)).await;
    assert_eq!(tracker.job(&id).unwrap().status, JobStatus::Running);

    source.set_summary(id.clone(), summary("lateral movement confirmed"));
    tracker.run_for(Duration::from_millis(3100)).await;

    let done = tracker.job(&id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        done.summary.as_ref().unwrap().conclusion,
        "lateral movement confirmed"
    );
    assert!(done.completed_at.is_some());
    assert_eq!(events.try_next(), Some(BusEvent::JobCompleted(id.clone())));

    yield_a_few().await;
    assert!(!tracker.is_probing(&id));
    assert_eq!(tracker.live_probes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_report_fails_job_and_notifies() {
    let source = source();
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let mut tracker = JobLifecycleTracker::new(source.clone(), &Config::default(), bus);
    let id = JobId::new("case-2");
    tracker.add_job(job("case-2", 1));
    tracker.mark_running(&id).unwrap();
    let _ = events.try_next();

    source.set_summary(
        id.clone(),
        SummaryResponse {
            summary: None,
            status: Some("failed".to_string()),
            error: Some("worker crashed".to_string()),
        },
    );
    tracker.run_for(Duration::from_millis(3100)).await;

    assert_eq!(tracker.job(&id).unwrap().status, JobStatus::Failed);
    assert_eq!(
        events.try_next(),
        Some(BusEvent::JobFailed {
            job: id.clone(),
            error: "worker crashed".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_terminal_jobs_never_transition_again() {
    let source = source();
    let mut tracker = JobLifecycleTracker::new(source, &Config::default(), EventBus::new());
    let id = JobId::new("case-3");
    tracker.add_job(job("case-3", 1));
    tracker.mark_running(&id).unwrap();
    tracker.apply_summary(&id, summary("done")).unwrap();

    let err = assert_err!(tracker.mark_running(&id));
    assert!(matches!(err, Error::InvalidJobTransition { .. }));
    let late_failure = SummaryResponse {
        summary: None,
        status: Some("failed".to_string()),
        error: Some("late".to_string()),
    };
    assert_eq!(tracker.apply_summary(&id, late_failure).unwrap(), None);
    assert_eq!(tracker.job(&id).unwrap().status, JobStatus::Completed);
    assert!(!tracker.observe_activity(&id, true).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_relisting_a_finished_job_keeps_its_outcome() {
    let source = source();
    let mut tracker = JobLifecycleTracker::new(source, &Config::default(), EventBus::new());
    let id = JobId::new("case-5");
    tracker.add_job(job("case-5", 1));
    tracker.mark_running(&id).unwrap();
    tracker.apply_summary(&id, summary("closed")).unwrap();
    let completed_at = tracker.job(&id).unwrap().completed_at;

    tracker.add_job(job("case-5", 1));
    let kept = tracker.job(&id).unwrap();
    assert_eq!(kept.status, JobStatus::Completed);
    assert_eq!(kept.summary.as_ref().unwrap().conclusion, "closed");
    assert_eq!(kept.completed_at, completed_at);
    assert!(!tracker.is_probing(&id));

    tracker.set_jobs(vec![job("case-5", 1), job("case-6", 2)]);
    let kept = tracker.job(&id).unwrap();
    assert_eq!(kept.status, JobStatus::Completed);
    assert!(kept.summary.is_some());
    assert_eq!(tracker.jobs().len(), 2);
    assert_eq!(tracker.target(), Target::Job(JobId::new("case-6")));
}

#[tokio::test(start_paused = true)]
async fn test_newest_active_job_is_auto_selected() {
    let source = source();
    let mut tracker = JobLifecycleTracker::new(source, &Config::default(), EventBus::new());
    tracker.add_job(job("older", 1));
    tracker.add_job(job("newer", 2));
    assert_eq!(tracker.selected(), Some(&JobId::new("newer")));

    // Manual choice holds until the job set changes.
    tracker.select(Some(&JobId::new("older"))).unwrap();
    assert_eq!(tracker.target(), Target::Job(JobId::new("older")));

    let err = assert_err!(tracker.select(Some(&JobId::new("missing"))));
    assert!(matches!(err, Error::JobNotFound(_)));
    tracker.remove_job(&JobId::new("older")).unwrap();
    assert_eq!(tracker.selected(), Some(&JobId::new("newer")));
}

#[tokio::test(start_paused = true)]
async fn test_probes_stay_off_without_auto_refresh() {
    let source = source();
    let config = Config {
        auto_refresh: false,
        ..Config::default()
    };
    let mut tracker = JobLifecycleTracker::new(source.clone(), &config, EventBus::new());
    let id = JobId::new("case-4");
    tracker.add_job(job("case-4", 1));
    tracker.mark_running(&id).unwrap();
    assert!(!tracker.is_probing(&id));

    source.set_summary(id.clone(), summary("done"));
    tracker.probe_now(&id);
    tracker.run_for(Duration::from_millis(10)).await;
    assert_eq!(tracker.job(&id).unwrap().status, JobStatus::Completed);
}

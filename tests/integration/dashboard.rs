//! The wired dashboard feeding the TEA model and the renderer.

use std::time::Duration;

use ratatui::{backend::TestBackend, Terminal};

use canopy::app::{Dashboard, WatchOptions};
use canopy::bus::View;
use canopy::config::Config;
use canopy::model::{Job, JobId, NodeStatus};
use canopy::remote::Scope;
use canopy::sync::Target;
use canopy::tea::{update, Command, Model};
use canopy::ui;

use crate::fixtures::{leaf, seed_global, source};

fn screen(model: &Model) -> String {
    let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
    let state = model.snapshot();
    terminal.draw(|frame| ui::draw(frame, &state)).unwrap();
    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    out
}

/// Advance paused time, then feed whatever the dashboard collected to the model.
async fn tick(dashboard: &mut Dashboard, model: &mut Model, millis: u64) -> Vec<Command> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    let mut cmds = Vec::new();
    for message in dashboard.poll() {
        cmds.extend(update(model, message));
    }
    cmds
}

#[tokio::test(start_paused = true)]
async fn test_global_tree_reaches_the_screen() {
    let source = source();
    seed_global(&source);
    let config = Config::default();
    let mut dashboard = Dashboard::new(source, &config);
    let mut model = Model::new(config);

    dashboard.start(WatchOptions::default());
    tick(&mut dashboard, &mut model, 20).await;

    assert_eq!(model.sync.target, Some(Target::Global));
    let text = screen(&model);
    assert!(text.contains("root"));
    assert!(text.contains("global"));

    model.view = View::Tasks;
    let text = screen(&model);
    assert!(text.contains("Pending (1)"));
    assert!(text.contains("In Progress (1)"));
    dashboard.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_job_selection_moves_target_and_clears_focus() {
    let source = source();
    seed_global(&source);
    let job_scope = Scope::Job(JobId::new("case-1"));
    source.set_tree(job_scope, Some(leaf("job-root", NodeStatus::InProgress)));
    let config = Config::default();
    let mut dashboard = Dashboard::new(source, &config);
    let mut model = Model::new(config);

    dashboard.start(WatchOptions {
        jobs: vec![Job::new("case-1", "Case one")],
        global: true,
    });
    tick(&mut dashboard, &mut model, 20).await;
    assert_eq!(model.sync.target, Some(Target::Global));
    model.selection.focus(View::Tree, "a");

    let quit = dashboard.execute(Command::SelectRelativeJob(1));
    assert!(!quit);
    tick(&mut dashboard, &mut model, 20).await;
    tick(&mut dashboard, &mut model, 20).await;

    assert_eq!(
        model.sync.target,
        Some(Target::Job(JobId::new("case-1")))
    );
    assert_eq!(model.selection.focused(View::Tree), None);
    assert_eq!(model.tree_layout.focus_order(), vec!["job-root".to_string()]);
    assert!(screen(&model).contains("Case one"));

    assert!(!dashboard.execute(Command::ObserveGlobal));
    tick(&mut dashboard, &mut model, 20).await;
    assert_eq!(model.sync.target, Some(Target::Global));
    assert!(dashboard.execute(Command::Quit));
    dashboard.shutdown();
}

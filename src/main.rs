use std::io::{self, stdout, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::{backend::CrosstermBackend, Terminal};

use canopy::app::{pull_once, LogicThread, WatchOptions};
use canopy::config::Config;
use canopy::layout::{TaskLayout, TreeLayout};
use canopy::model::{Job, JobId};
use canopy::remote::{HttpStateSource, StateSource};
use canopy::render::{RenderState, FRAME_DURATION};
use canopy::sync::Target;
use canopy::{clog, ui, Error, Result};

/// Canopy - live dashboard for an analysis tree and its task queue
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    CANOPY_DEBUG=1     Enable debug logging (alternative to --debug)\n    CANOPY_LOG=LEVEL   Log threshold: error, warn, info, debug or trace"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.canopy/canopy.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Backend REST base URL (overrides the config file)
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Backend push channel URL (overrides the config file)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the dashboard (default when no command is given)
    Watch {
        /// Job to track, as ID or ID:NAME (repeatable)
        #[arg(long = "job", value_parser = parse_job)]
        jobs: Vec<Job>,

        /// Start on the global tree even when jobs are given
        #[arg(long)]
        global: bool,
    },

    /// Print backend status as JSON
    Status,

    /// Pull the tree once and print its layout as JSON
    Tree {
        /// Job whose tree to pull (global when omitted)
        #[arg(long)]
        job: Option<String>,
    },

    /// Pull the task queue once and print its layout as JSON
    Tasks {
        /// Job whose tasks to pull (global when omitted)
        #[arg(long)]
        job: Option<String>,
    },

    /// Print the backend's detail for one node as JSON
    Node {
        /// Node id
        id: String,
    },
}

/// Parse `ID` or `ID:NAME` into a pending job.
fn parse_job(arg: &str) -> std::result::Result<Job, String> {
    let (id, name) = match arg.split_once(':') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (arg.trim(), ""),
    };
    if id.is_empty() {
        return Err(format!("invalid job '{}': id must not be empty", arg));
    }
    Ok(Job::new(id, name))
}

fn target_for(job: Option<String>) -> Target {
    match job {
        Some(id) => Target::Job(JobId::new(id)),
        None => Target::Global,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    canopy::log::init_with_debug(cli.debug);

    let mut config = Config::load()?;
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    config.validate()?;

    let options = match cli.command {
        Some(Command::Status) => return run_status(&config),
        Some(Command::Tree { job }) => return run_tree(&config, target_for(job)),
        Some(Command::Tasks { job }) => return run_tasks(&config, target_for(job)),
        Some(Command::Node { id }) => return run_node(&config, &id),
        Some(Command::Watch { jobs, global }) => WatchOptions { jobs, global },
        None => WatchOptions::default(),
    };

    if cli.debug {
        clog!("Canopy starting (debug mode enabled)");
    } else {
        clog!("Canopy starting");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let (state_tx, state_rx) = crossbeam_channel::bounded::<RenderState>(1);

    let shutdown_clone = shutdown.clone();
    let logic_handle =
        thread::spawn(move || LogicThread::run(config, options, state_tx, shutdown_clone));

    let mut terminal = setup_terminal()?;
    let result = render_loop(&mut terminal, state_rx, &shutdown);

    shutdown.store(true, Ordering::SeqCst);
    let logic_result = logic_handle
        .join()
        .map_err(|_| Error::TaskJoin("logic thread panicked".to_string()))?;
    restore_terminal(&mut terminal)?;
    result.and(logic_result)
}

fn http_source(config: &Config) -> Result<Arc<dyn StateSource>> {
    Ok(Arc::new(HttpStateSource::from_config(config)?))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    let source = http_source(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(source.fetch_status())?;
    print_json(&serde_json::to_value(status)?)
}

fn run_tree(config: &Config, target: Target) -> Result<()> {
    clog!("Headless tree pull for {}", target);
    let source = http_source(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(pull_once(source, config, target.clone()))?;
    let layout = TreeLayout::build(snapshot.tree.as_deref(), &config.layout);

    print_json(&serde_json::json!({
        "target": target.to_string(),
        "state": snapshot.tree_state,
        "source": snapshot.last_source,
        "stats": snapshot.stats,
        "layout": layout,
    }))
}

fn run_tasks(config: &Config, target: Target) -> Result<()> {
    clog!("Headless task pull for {}", target);
    let source = http_source(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(pull_once(source, config, target.clone()))?;
    let layout = match snapshot.tasks.as_deref() {
        Some(queue) => TaskLayout::build(queue, &config.layout),
        None => TaskLayout::default(),
    };

    print_json(&serde_json::json!({
        "target": target.to_string(),
        "state": snapshot.task_state,
        "layout": layout,
    }))
}

fn run_node(config: &Config, id: &str) -> Result<()> {
    let source = http_source(config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let detail = rt
        .block_on(source.fetch_node(id))?
        .ok_or_else(|| Error::NoData(format!("node {}", id)))?;
    print_json(&serde_json::to_value(detail)?)
}

fn render_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state_rx: Receiver<RenderState>,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut state = RenderState::default();
    let mut last_version: u64 = 0;
    let mut last_frame = Instant::now();
    let mut dirty = true;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match state_rx.try_recv() {
            Ok(s) => {
                dirty = dirty || s.version != last_version;
                state = s;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        if last_frame.elapsed() < FRAME_DURATION {
            thread::sleep(Duration::from_micros(500));
            continue;
        }
        last_frame = Instant::now();

        if dirty {
            terminal.draw(|f| ui::draw(f, &state))?;
            last_version = state.version;
            dirty = false;
        }
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(disable_raw_mode()?)
}

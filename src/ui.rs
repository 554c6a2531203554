//! Terminal UI rendering for the canopy dashboard.
//!
//! Minimal chrome: whitespace and a single separator create the structure,
//! the canvas carries colour. Selection uses the REVERSED modifier so it
//! adapts to the terminal theme.
//!
//! This module renders from RenderState (immutable snapshot) - it never
//! mutates application state.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Context, Line as EdgeLine},
        Clear, Paragraph, Wrap,
    },
    Frame,
};

use crate::bus::View;
use crate::layout::{Bounds, EdgeStyle, Position, TaskColumn, TaskLayout, TreeLayout};
use crate::model::{JobStatus, NodeStatus, TaskStatus};
use crate::render::{DetailView, JobView, RenderState, SyncView};
use crate::sync::DataState;
use crate::tea::{Notification, NotificationLevel};
use crate::util::truncate;

// Color tokens
const COLOR_TEXT_DIMMED: Color = Color::Gray;
const COLOR_TEXT_MUTED: Color = Color::DarkGray;
const COLOR_SEPARATOR: Color = Color::White;

const COLOR_STATUS_DONE: Color = Color::Green;
const COLOR_STATUS_FAILED: Color = Color::Red;
const COLOR_STATUS_ACTIVE: Color = Color::Yellow;
const COLOR_STATUS_PENDING: Color = Color::Gray;

// Pane widths
const JOBS_WIDTH: u16 = 26;
const DETAILS_WIDTH: u16 = 38;

// Canvas units per terminal cell
const SCALE_X: f64 = 12.0;
const SCALE_Y: f64 = 40.0;
const CANVAS_PADDING: f64 = 40.0;
const LABEL_WIDTH: usize = 22;

// -----------------------------------------------------------------------------
// Context-sensitive keymap system
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeymapContext {
    pub view: View,
    pub has_jobs: bool,
    pub has_error: bool,
}

impl KeymapContext {
    pub fn from_render_state(state: &RenderState) -> Self {
        Self {
            view: state.view,
            has_jobs: !state.jobs.is_empty(),
            has_error: state.sync.error.is_some(),
        }
    }
}

/// A single keybinding entry for display.
struct Keybinding(&'static str, &'static str);

/// A group of related keybindings (separated by │).
struct KeybindingGroup(Vec<Keybinding>);

fn keybindings_for_context(ctx: KeymapContext) -> Vec<KeybindingGroup> {
    let view_switch = match ctx.view {
        View::Tree => Keybinding("Tab", "tasks"),
        View::Tasks => Keybinding("Tab", "tree"),
    };
    let focus = match ctx.view {
        View::Tree => vec![Keybinding("j/k", "node")],
        View::Tasks => vec![Keybinding("j/k", "task")],
    };
    let mut jobs = Vec::new();
    if ctx.has_jobs {
        jobs.push(Keybinding("J/K", "job"));
    }
    jobs.push(Keybinding("g", "global"));

    let retry = if ctx.has_error {
        Keybinding("r", "retry")
    } else {
        Keybinding("r", "reload")
    };

    vec![
        KeybindingGroup(vec![view_switch]),
        KeybindingGroup(focus),
        KeybindingGroup(jobs),
        KeybindingGroup(vec![retry, Keybinding("R", "backend refresh")]),
        KeybindingGroup(vec![Keybinding("q", "quit")]),
    ]
}

/// Main render function - entry point for all UI drawing.
pub fn draw(frame: &mut Frame, state: &RenderState) {
    render_main_layout(frame, state);

    if let Some(ref notification) = state.notification {
        render_notification(frame, notification, frame.area());
    }
}

/// Header, panes, separator, status bar.
fn render_main_layout(frame: &mut Frame, state: &RenderState) {
    let area = frame.area();

    if area.height < 4 {
        render_statusbar(frame, state, area);
        return;
    }

    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .split(area);

    render_header(frame, state, rows[0]);

    let (jobs_width, details_width) = if area.width >= JOBS_WIDTH + DETAILS_WIDTH + 30 {
        (JOBS_WIDTH, DETAILS_WIDTH)
    } else {
        (0, 0)
    };
    let panes = Layout::horizontal([
        Constraint::Length(jobs_width),
        Constraint::Fill(1),
        Constraint::Length(details_width),
    ])
    .split(rows[1]);

    if jobs_width > 0 {
        render_jobs(frame, state, panes[0]);
    }
    render_canvas(frame, state, panes[1]);
    if details_width > 0 {
        render_details(frame, state, panes[2]);
    }
    render_separator(frame, rows[2]);
    render_statusbar(frame, state, rows[3]);
}

fn render_header(frame: &mut Frame, state: &RenderState, area: Rect) {
    let sep = Span::styled(" │ ", Style::default().fg(COLOR_TEXT_MUTED));
    let mut spans = vec![
        Span::styled("canopy", Style::default().add_modifier(Modifier::BOLD)),
        sep.clone(),
        Span::raw(state.sync.target.clone()),
        sep.clone(),
        Span::styled(state.view.label(), Style::default().fg(COLOR_TEXT_DIMMED)),
    ];

    let counts = match state.view {
        View::Tree => state.sync.stats.as_ref().map(|s| {
            format!(
                "{} nodes • depth {} • {} failed",
                s.total_nodes,
                s.max_depth,
                s.count(NodeStatus::Failed)
            )
        }),
        View::Tasks if !state.tasks.is_empty() => {
            let blocked = state.tasks.nodes.iter().filter(|n| n.blocked).count();
            Some(format!("{} tasks • {} blocked", state.tasks.nodes.len(), blocked))
        }
        View::Tasks => None,
    };
    if let Some(counts) = counts {
        spans.push(sep.clone());
        spans.push(Span::styled(counts, Style::default().fg(COLOR_TEXT_DIMMED)));
    }

    if let Some(updated) = format_last_update(&state.sync) {
        spans.push(sep);
        spans.push(Span::styled(updated, Style::default().fg(COLOR_TEXT_MUTED)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn format_last_update(sync: &SyncView) -> Option<String> {
    let at = sync.last_update?;
    let local = at.with_timezone(&chrono::Local).format("%H:%M:%S");
    Some(match sync.last_source.as_deref() {
        Some(source) => format!("updated {} via {}", local, source),
        None => format!("updated {}", local),
    })
}

// -----------------------------------------------------------------------------
// Job list
// -----------------------------------------------------------------------------

fn job_status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Pending => COLOR_STATUS_PENDING,
        JobStatus::Running => COLOR_STATUS_ACTIVE,
        JobStatus::Completed => COLOR_STATUS_DONE,
        JobStatus::Failed => COLOR_STATUS_FAILED,
    }
}

fn job_status_glyph(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "○",
        JobStatus::Running => "◐",
        JobStatus::Completed => "✓",
        JobStatus::Failed => "✗",
    }
}

fn job_line(job: &JobView, selected: bool, width: usize) -> Line<'static> {
    let label = if job.name.is_empty() {
        job.id.short().to_string()
    } else {
        job.name.clone()
    };
    let mut name_style = Style::default();
    if selected {
        name_style = name_style.add_modifier(Modifier::REVERSED);
    }
    Line::from(vec![
        Span::styled(
            format!("{} ", job_status_glyph(job.status)),
            Style::default().fg(job_status_color(job.status)),
        ),
        Span::styled(truncate(&label, width.saturating_sub(3)), name_style),
    ])
}

fn render_jobs(frame: &mut Frame, state: &RenderState, area: Rect) {
    let width = area.width.saturating_sub(1) as usize;
    let mut lines = vec![Line::from(Span::styled(
        "Jobs",
        Style::default().fg(COLOR_TEXT_MUTED),
    ))];

    let global_style = if state.selected_job.is_none() {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default().fg(COLOR_TEXT_DIMMED)
    };
    lines.push(Line::from(vec![
        Span::styled("◆ ", Style::default().fg(COLOR_TEXT_DIMMED)),
        Span::styled("global", global_style),
    ]));

    for (i, job) in state.jobs.iter().enumerate() {
        lines.push(job_line(job, state.selected_job == Some(i), width));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

// -----------------------------------------------------------------------------
// Canvas
// -----------------------------------------------------------------------------

/// Visible window of layout space, in canvas coordinates (y flipped).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl Viewport {
    /// Fit `bounds` when it fits the area, otherwise follow `focus`.
    pub fn frame(width: u16, height: u16, bounds: Option<Bounds>, focus: Option<Position>) -> Self {
        let span_x = f64::from(width.max(1)) * SCALE_X;
        let span_y = f64::from(height.max(1)) * SCALE_Y;
        let Some(bounds) = bounds else {
            return Self {
                x: [0.0, span_x],
                y: [-span_y / 2.0, span_y / 2.0],
            };
        };
        let padded = bounds.padded(CANVAS_PADDING);

        let x0 = if padded.width() <= span_x {
            padded.min.x
        } else {
            match focus {
                // Labels extend right of the node; keep it in the left third.
                Some(p) => p.x - span_x / 3.0,
                None => padded.min.x,
            }
        };

        let center_y = if padded.height() <= span_y {
            (padded.min.y + padded.max.y) / 2.0
        } else {
            match focus {
                Some(p) => p.y,
                None => padded.min.y + span_y / 2.0,
            }
        };

        Self {
            x: [x0, x0 + span_x],
            y: [-center_y - span_y / 2.0, -center_y + span_y / 2.0],
        }
    }
}

fn node_status_color(status: NodeStatus) -> Color {
    match status {
        NodeStatus::Completed => COLOR_STATUS_DONE,
        NodeStatus::Failed => COLOR_STATUS_FAILED,
        NodeStatus::InProgress => COLOR_STATUS_ACTIVE,
        NodeStatus::Pending => COLOR_STATUS_PENDING,
        NodeStatus::Unknown => COLOR_TEXT_MUTED,
    }
}

fn node_status_glyph(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Completed => "✓",
        NodeStatus::Failed => "✗",
        NodeStatus::InProgress => "◐",
        NodeStatus::Pending => "○",
        NodeStatus::Unknown => "?",
    }
}

fn task_status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Completed => COLOR_STATUS_DONE,
        TaskStatus::Failed => COLOR_STATUS_FAILED,
        TaskStatus::InProgress => COLOR_STATUS_ACTIVE,
        TaskStatus::Blocked => Color::Magenta,
        TaskStatus::Pending => COLOR_STATUS_PENDING,
        TaskStatus::Unknown => COLOR_TEXT_MUTED,
    }
}

fn edge_color(style: EdgeStyle) -> Color {
    match style {
        EdgeStyle::Structural => COLOR_TEXT_MUTED,
        EdgeStyle::Waiting => COLOR_TEXT_DIMMED,
        EdgeStyle::Active => COLOR_STATUS_ACTIVE,
        EdgeStyle::Satisfied => COLOR_STATUS_DONE,
        EdgeStyle::Failed => COLOR_STATUS_FAILED,
    }
}

fn label_style(color: Color, focused: bool) -> Style {
    let style = Style::default().fg(color);
    if focused {
        style.add_modifier(Modifier::REVERSED)
    } else {
        style
    }
}

/// Message shown instead of an empty canvas.
pub fn empty_message(view: View, sync: &SyncView) -> String {
    let what = match view {
        View::Tree => "analysis tree",
        View::Tasks => "task queue",
    };
    match sync.state(view) {
        DataState::Loading => format!("Loading {}…", what),
        DataState::NotProduced => match view {
            View::Tree => "No analysis tree has been produced for this target yet".to_string(),
            View::Tasks => "No tasks have been queued for this target yet".to_string(),
        },
        DataState::Failed => format!("Could not load the {}. Press r to retry", what),
        DataState::Ready => format!("The {} is empty", what),
        DataState::Idle => "Waiting for data".to_string(),
    }
}

fn render_canvas(frame: &mut Frame, state: &RenderState, area: Rect) {
    let empty = match state.view {
        View::Tree => state.tree.is_empty(),
        View::Tasks => state.tasks.is_empty(),
    };
    if empty {
        let style = match state.sync.state(state.view) {
            DataState::Failed => Style::default().fg(COLOR_STATUS_FAILED),
            _ => Style::default().fg(COLOR_TEXT_DIMMED),
        };
        let y = area.y + area.height / 2;
        let line_area = Rect {
            x: area.x + 2,
            y,
            width: area.width.saturating_sub(4),
            height: 1,
        };
        let message = empty_message(state.view, &state.sync);
        frame.render_widget(Paragraph::new(Span::styled(message, style)), line_area);
        return;
    }

    let focused = state.focused.as_deref();
    match state.view {
        View::Tree => render_tree_canvas(frame, &state.tree, focused, area),
        View::Tasks => render_task_canvas(frame, &state.tasks, focused, area),
    }
}

fn render_tree_canvas(frame: &mut Frame, layout: &TreeLayout, focused: Option<&str>, area: Rect) {
    let focus = focused.and_then(|id| layout.find(id)).map(|n| n.position);
    let viewport = Viewport::frame(area.width, area.height, layout.bounds(), focus);

    let canvas = Canvas::default()
        .x_bounds(viewport.x)
        .y_bounds(viewport.y)
        .marker(Marker::Braille)
        .paint(|ctx| {
            for edge in &layout.edges {
                let (Some(source), Some(target)) = (layout.node(&edge.source), layout.node(&edge.target))
                else {
                    continue;
                };
                draw_edge(ctx, source.position, target.position, edge_color(edge.style));
            }
            ctx.layer();
            for node in &layout.nodes {
                let label = format!(
                    "{} {}",
                    node_status_glyph(node.status),
                    truncate(&node.name, LABEL_WIDTH)
                );
                let style = label_style(node_status_color(node.status), focused == Some(&node.id));
                ctx.print(node.position.x, -node.position.y, Span::styled(label, style));
            }
        });
    frame.render_widget(canvas, area);
}

fn render_task_canvas(frame: &mut Frame, layout: &TaskLayout, focused: Option<&str>, area: Rect) {
    let focus = focused.and_then(|id| layout.node(id)).map(|n| n.position);
    let title_y = layout
        .nodes
        .iter()
        .map(|n| n.position.y)
        .fold(f64::INFINITY, f64::min)
        - SCALE_Y * 1.5;
    let bounds = layout.bounds().map(|b| Bounds {
        min: Position::new(b.min.x, b.min.y.min(title_y)),
        max: b.max,
    });
    let viewport = Viewport::frame(area.width, area.height, bounds, focus);

    let canvas = Canvas::default()
        .x_bounds(viewport.x)
        .y_bounds(viewport.y)
        .marker(Marker::Braille)
        .paint(|ctx| {
            for edge in &layout.edges {
                let (Some(source), Some(target)) = (layout.node(&edge.source), layout.node(&edge.target))
                else {
                    continue;
                };
                draw_edge(ctx, source.position, target.position, edge_color(edge.style));
            }
            ctx.layer();
            for column in TaskColumn::ALL {
                let count = layout.column(column).count();
                ctx.print(
                    layout.column_x(column),
                    -title_y,
                    Span::styled(
                        format!("{} ({})", column.title(), count),
                        Style::default().fg(COLOR_TEXT_DIMMED).add_modifier(Modifier::BOLD),
                    ),
                );
            }
            for node in &layout.nodes {
                let marker = if node.blocked { "⧗" } else { "•" };
                let label = format!(
                    "{} {} {}",
                    marker,
                    node.id,
                    truncate(&node.description, LABEL_WIDTH.saturating_sub(node.id.len()))
                );
                let color = if node.blocked {
                    task_status_color(TaskStatus::Blocked)
                } else {
                    task_status_color(node.status)
                };
                let style = label_style(color, focused == Some(&node.id));
                ctx.print(node.position.x, -node.position.y, Span::styled(label, style));
            }
        });
    frame.render_widget(canvas, area);
}

fn draw_edge(ctx: &mut Context<'_>, from: Position, to: Position, color: Color) {
    ctx.draw(&EdgeLine::new(from.x, -from.y, to.x, -to.y, color));
}

// -----------------------------------------------------------------------------
// Details pane
// -----------------------------------------------------------------------------

fn field(name: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<9}", name), Style::default().fg(COLOR_TEXT_MUTED)),
        Span::raw(value),
    ])
}

fn detail_lines(detail: &DetailView) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match detail {
        DetailView::Node(d) => {
            lines.push(Line::from(Span::styled(
                d.node.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(field("id", d.node.id.clone()));
            lines.push(Line::from(vec![
                Span::styled(format!("{:<9}", "status"), Style::default().fg(COLOR_TEXT_MUTED)),
                Span::styled(
                    d.node.status.to_string(),
                    Style::default().fg(node_status_color(d.node.status)),
                ),
            ]));
            lines.push(field("depth", d.depth_from_root.to_string()));
            lines.push(field("siblings", d.siblings_count.to_string()));
            lines.push(field(
                "children",
                if d.has_children { "yes" } else { "no" }.to_string(),
            ));
            if !d.node.description.is_empty() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    d.node.description.clone(),
                    Style::default().fg(COLOR_TEXT_DIMMED),
                )));
            }
        }
        DetailView::Task(d) => {
            lines.push(Line::from(Span::styled(
                d.task.id.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            let status = if d.blocked {
                format!("{} (blocked)", d.task.status)
            } else {
                d.task.status.to_string()
            };
            lines.push(Line::from(vec![
                Span::styled(format!("{:<9}", "status"), Style::default().fg(COLOR_TEXT_MUTED)),
                Span::styled(status, Style::default().fg(task_status_color(d.effective_status))),
            ]));
            lines.push(field("priority", d.task.priority.label().to_string()));
            if d.task.retry_count > 0 {
                lines.push(field(
                    "retries",
                    format!("{}/{}", d.task.retry_count, d.task.max_retries),
                ));
            }
            if !d.dependencies.is_empty() {
                lines.push(field("needs", d.dependencies.join(", ")));
            }
            if !d.dependents.is_empty() {
                lines.push(field("unblocks", d.dependents.join(", ")));
            }
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                d.task.description.clone(),
                Style::default().fg(COLOR_TEXT_DIMMED),
            )));
            if let Some(error) = &d.task.error_message {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    error.clone(),
                    Style::default().fg(COLOR_STATUS_FAILED),
                )));
            }
            if let Some(result) = d.task.result_text() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    result,
                    Style::default().fg(COLOR_STATUS_DONE),
                )));
            }
        }
    }
    lines
}

fn render_details(frame: &mut Frame, state: &RenderState, area: Rect) {
    let lines = match &state.detail {
        Some(detail) => detail_lines(detail),
        None => {
            let hint = match state.view {
                View::Tree => "j/k to focus a node",
                View::Tasks => "j/k to focus a task",
            };
            vec![Line::from(Span::styled(hint, Style::default().fg(COLOR_TEXT_MUTED)))]
        }
    };
    let inner = Rect {
        x: area.x + 1,
        width: area.width.saturating_sub(1),
        ..area
    };
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_separator(frame: &mut Frame, area: Rect) {
    let solid = "─".repeat(area.width as usize);
    let line = Line::from(Span::styled(solid, Style::default().fg(COLOR_SEPARATOR)));
    frame.render_widget(Paragraph::new(line), area);
}

// -----------------------------------------------------------------------------
// Status bar
// -----------------------------------------------------------------------------

/// Loading and error text shown next to the `?` toggle.
pub fn sync_status(sync: &SyncView) -> Option<(String, Color)> {
    if let Some(error) = &sync.error {
        return Some((format!("{} (press r to retry)", error), COLOR_STATUS_FAILED));
    }
    if sync.loading {
        return Some(("loading…".to_string(), COLOR_TEXT_DIMMED));
    }
    None
}

fn connection_badge(sync: &SyncView) -> (&'static str, Style) {
    if sync.connected {
        (" LIVE ", Style::default().fg(Color::Black).bg(Color::Green))
    } else {
        (
            " reconnecting… ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )
    }
}

fn render_statusbar(frame: &mut Frame, state: &RenderState, area: Rect) {
    frame.render_widget(Paragraph::new(render_keymap_line(state, area.width)), area);
}

/// "?" alone when collapsed, "? │ <keymap>" when expanded, then sync state
/// and a right-aligned connection badge.
fn render_keymap_line(state: &RenderState, width: u16) -> Line<'static> {
    let ctx = KeymapContext::from_render_state(state);
    let groups = keybindings_for_context(ctx);

    let key_style = Style::default().fg(COLOR_TEXT_DIMMED);
    let desc_style = Style::default().fg(COLOR_TEXT_MUTED);
    let sep_style = Style::default().fg(COLOR_TEXT_MUTED);

    let mut spans: Vec<Span> = Vec::new();

    let help_style = if state.show_keymap {
        Style::default()
    } else {
        Style::default().fg(COLOR_TEXT_MUTED)
    };
    spans.push(Span::styled("?", help_style));

    if state.show_keymap {
        for group in groups.iter() {
            if group.0.is_empty() {
                continue;
            }
            spans.push(Span::styled(" │ ", sep_style));
            for (key_idx, keybinding) in group.0.iter().enumerate() {
                if key_idx > 0 {
                    spans.push(Span::styled(" • ", sep_style));
                }
                spans.push(Span::styled(keybinding.0, key_style));
                spans.push(Span::styled(format!(" {}", keybinding.1), desc_style));
            }
        }
    } else if let Some((text, color)) = sync_status(&state.sync) {
        spans.push(Span::styled(" │ ", sep_style));
        spans.push(Span::styled(text, Style::default().fg(color)));
    }

    let (badge, badge_style) = connection_badge(&state.sync);
    let badge_len = badge.chars().count();
    let content_width: usize = spans.iter().map(|s| s.content.chars().count()).sum();
    let spacer_width = (width as usize)
        .saturating_sub(content_width)
        .saturating_sub(badge_len);
    if spacer_width > 0 {
        spans.push(Span::raw(" ".repeat(spacer_width)));
    }
    spans.push(Span::styled(badge, badge_style));

    Line::from(spans)
}

/// - Error: Red text with "Error:" prefix and bold styling
/// - Info: Green text without prefix
fn render_notification(frame: &mut Frame, notification: &Notification, area: Rect) {
    let notification_area = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(1),
        width: area.width,
        height: 1,
    };

    frame.render_widget(Clear, notification_area);

    let line = match notification.level {
        NotificationLevel::Error => Line::from(vec![
            Span::styled(
                "Error: ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                notification.message.clone(),
                Style::default().fg(Color::Red),
            ),
        ]),
        NotificationLevel::Info => Line::from(Span::styled(
            notification.message.clone(),
            Style::default().fg(Color::Green),
        )),
    };

    frame.render_widget(Paragraph::new(line), notification_area);
}

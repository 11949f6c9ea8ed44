//! UI rendering for the TUI

use casedesk_api::{Case, CaseBundle};
use casedesk_export::{format_size, format_time};
use ratatui::{
    prelude::*,
    widgets::{
        Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Tabs, Wrap,
    },
};

use super::app::{App, DetailTab, Overlay};
use super::dialog::{FilterDialog, FilterField};
use crate::cli::output::truncate;

const KEY_HELP: &str =
    "j/k move  Tab detail  / search  f filter  1-9 preset  e/E export  x cancel  ? help  q quit";

const HELP_LINES: &[(&str, &str)] = &[
    ("j / k, Up / Down", "Move selection"),
    ("PgUp / PgDn", "Move a page"),
    ("g / G", "First / last loaded case"),
    ("Tab", "Next detail tab"),
    ("s / S", "Cycle sort field / reverse order"),
    ("/", "Jump to case id or search by keyword"),
    ("f", "Edit filter"),
    ("0-9", "Apply preset"),
    ("c", "Clear filter"),
    ("r", "Refresh"),
    ("e", "Export selected case"),
    ("E", "Export every case in the filter"),
    ("x", "Cancel export"),
    ("?", "Toggle this help"),
    ("q / Esc", "Quit"),
];

/// Draw the entire UI
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let footer_height = if app.export.is_some() { 2 } else { 1 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(4),
            Constraint::Length(footer_height),
        ])
        .split(area);

    draw_header(frame, app, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);
    draw_case_list(frame, app, body[0]);
    draw_detail(frame, app, body[1]);

    draw_footer(frame, app, chunks[2]);

    match &app.overlay {
        Overlay::None => {}
        Overlay::Help => draw_help(frame, area),
        Overlay::QuickSearch(text) => draw_quick_search(frame, text, area),
        Overlay::Filter(dialog) => draw_filter_dialog(frame, dialog, area),
    }
}

/// `width` x `height` in the middle of `area`, shrunk to fit.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn dialog_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(title, Style::default().fg(Color::Cyan).bold()))
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let dialog_area = centered(area, 60, HELP_LINES.len() as u16 + 4);
    frame.render_widget(Clear, dialog_area);

    let mut lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(format!("{:<20}", keys), Style::default().fg(Color::Yellow)),
                Span::raw(*action),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled("Esc or ? to close", Style::default().fg(Color::DarkGray)));
    frame.render_widget(
        Paragraph::new(lines).block(dialog_block(" Keys ")),
        dialog_area,
    );
}

fn draw_quick_search(frame: &mut Frame, text: &str, area: Rect) {
    let dialog_area = centered(area, 60, 4);
    frame.render_widget(Clear, dialog_area);
    let lines = vec![
        Line::from(vec![
            Span::raw(text.to_string()),
            Span::styled("_", Style::default().fg(Color::Cyan)),
        ]),
        Line::styled(
            "Enter: case id or keyword  Esc: cancel",
            Style::default().fg(Color::DarkGray),
        ),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(dialog_block(" Search ")),
        dialog_area,
    );
}

fn draw_filter_dialog(frame: &mut Frame, dialog: &FilterDialog, area: Rect) {
    let dialog_area = centered(area, 64, FilterField::ALL.len() as u16 + 5);
    frame.render_widget(Clear, dialog_area);

    let mut lines: Vec<Line> = FilterField::ALL
        .iter()
        .map(|field| {
            let focused = *field == dialog.focus;
            let label_style = if focused {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let value = match dialog.value(*field) {
                Some(text) if focused => format!("{}_", text),
                Some(text) => text.to_string(),
                None if dialog.include_closed => "[x]".to_string(),
                None => "[ ]".to_string(),
            };
            Line::from(vec![
                Span::styled(format!("{:<16}", field.label()), label_style),
                Span::raw(value),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        "Tab/Up/Down move  Space toggle  Ctrl+U clear  Enter apply  Esc cancel",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(dialog_block(" Filter ")),
        dialog_area,
    );
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let list = app.session.list();
    let count = match list.total() {
        Some(total) => format!("{}/{}", list.len(), total),
        None => list.len().to_string(),
    };
    let mut spans = vec![
        Span::styled(" casedesk ", Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(app.filter_label.clone(), Style::default().fg(Color::Yellow)),
        Span::raw(format!("  {} cases  sort: {}", count, list.sort())),
    ];
    if list.is_loading() {
        spans.push(Span::styled("  loading...", Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn severity_style(severity: &str) -> Style {
    let lower = severity.to_lowercase();
    if lower.starts_with('1') || lower.contains("urgent") {
        Style::default().fg(Color::Red)
    } else if lower.starts_with('2') || lower.contains("high") {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn draw_case_list(frame: &mut Frame, app: &App, area: Rect) {
    let list = app.session.list();
    let block = Block::default().borders(Borders::ALL).title(" Cases ");

    if list.is_empty() {
        let text = if list.is_loading() {
            "Loading cases..."
        } else {
            "No cases"
        };
        let placeholder = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let summary_width = area.width.saturating_sub(34) as usize;
    let rows: Vec<Row> = list
        .rows()
        .map(|case| {
            Row::new(vec![
                Cell::from(case.id.to_string()),
                Cell::from(truncate(&case.severity, 10)).style(severity_style(&case.severity)),
                Cell::from(truncate(&case.status, 12)),
                Cell::from(truncate(&case.summary, summary_width.max(8))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Min(8),
        ],
    )
    .header(
        Row::new(vec!["CASE", "SEVERITY", "STATUS", "SUMMARY"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .block(block);

    let mut state = TableState::default();
    state.select(list.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Detail ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let tabs = Tabs::new(vec!["Overview", "Comments", "Attachments"])
        .select(app.tab.index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let lines = match app.session.displayed() {
        Some(bundle) => match app.tab {
            DetailTab::Overview => overview_lines(&bundle),
            DetailTab::Comments => comment_lines(&bundle),
            DetailTab::Attachments => attachment_lines(&bundle),
        },
        None => {
            let text = match app.session.list().selected_id() {
                Some(id) if app.session.detail().is_loading() => format!("Loading {}...", id),
                Some(id) => format!("{} selected", id),
                None => "Nothing selected".to_string(),
            };
            vec![Line::styled(text, Style::default().fg(Color::DarkGray))]
        }
    };
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }),
        chunks[1],
    );
}

fn field(label: &str, value: &str) -> Line<'static> {
    let value = if value.is_empty() { "-" } else { value };
    Line::from(vec![
        Span::styled(format!("{:<10}", label), Style::default().fg(Color::DarkGray)),
        Span::raw(value.to_string()),
    ])
}

fn overview_lines(bundle: &CaseBundle) -> Vec<Line<'static>> {
    let case: &Case = &bundle.case;
    let mut lines = vec![
        Line::styled(
            format!("{}  {}", case.id, case.summary),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        field("Status", &case.status),
        field("Severity", &case.severity),
        field("Product", &case.product_line()),
        field("Account", &case.account_number),
        field("Owner", &case.owner),
        field("Created", &format_time(case.created_at)),
        field("Modified", &format_time(case.last_modified)),
    ];
    for gap in &bundle.gaps {
        lines.push(Line::styled(
            format!("{} unavailable: {}", gap.part.as_str(), gap.reason),
            Style::default().fg(Color::Yellow),
        ));
    }
    lines.push(Line::raw(""));
    lines.extend(case.description.lines().map(|l| Line::raw(l.to_string())));
    lines
}

fn comment_lines(bundle: &CaseBundle) -> Vec<Line<'static>> {
    if bundle.comments.is_empty() {
        return vec![Line::styled("No comments", Style::default().fg(Color::DarkGray))];
    }
    let mut lines = Vec::new();
    for comment in &bundle.comments {
        let visibility = if comment.public { "" } else { " (private)" };
        lines.push(Line::styled(
            format!(
                "{} - {}{}",
                comment.author,
                format_time(comment.created_at),
                visibility
            ),
            Style::default().fg(Color::Cyan),
        ));
        lines.extend(comment.text.lines().map(|l| Line::raw(l.to_string())));
        lines.push(Line::raw(""));
    }
    lines
}

fn attachment_lines(bundle: &CaseBundle) -> Vec<Line<'static>> {
    if bundle.attachments.is_empty() {
        return vec![Line::styled("No attachments", Style::default().fg(Color::DarkGray))];
    }
    bundle
        .attachments
        .iter()
        .map(|attachment| {
            Line::from(vec![
                Span::raw(attachment.filename.clone()),
                Span::styled(
                    format!(
                        "  {}  {}",
                        format_size(attachment.size),
                        format_time(attachment.created_at)
                    ),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect()
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut status_area = area;
    if let Some(job) = &app.export {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(area);
        let (ratio, label) = match &job.progress {
            Some(event) => (
                event.ratio(),
                format!(
                    "{} {}/{} {} {}",
                    job.label,
                    event.completed_tasks,
                    event.total_tasks,
                    event.current_task,
                    event.current_step
                ),
            ),
            None => (0.0, format!("{} starting", job.label)),
        };
        let label = if job.is_cancelling() {
            format!("{} (cancelling)", label)
        } else {
            label
        };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(label);
        frame.render_widget(gauge, chunks[0]);
        status_area = chunks[1];
    }

    let line = match &app.status {
        Some(status) if status.is_error => {
            Line::styled(status.text.clone(), Style::default().fg(Color::Red))
        }
        Some(status) => Line::styled(status.text.clone(), Style::default().fg(Color::Green)),
        None => Line::styled(KEY_HELP, Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(Paragraph::new(line), status_area);
}

//! TUI application state and key handling.
//!
//! Everything here runs on the event loop and never awaits network I/O.
//! Browse fetches go through [`BrowseSession`]; exports run on a spawned
//! task and report through a progress channel and a oneshot result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use casedesk::browse::{BrowseSession, BrowseSettings, BrowseUpdate};
use casedesk::config::Config;
use casedesk_api::{CaseFilter, CaseId, CaseService};
use casedesk_export::{
    collect_case_ids, progress_channel, CancelToken, ExportReport, ProgressEvent,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cli::export::{build_engine, ExportFlags};
use crate::cli::tui::dialog::{handle_text_input, DialogAction, FilterDialog, TextInputResult};

const INFO_TTL: Duration = Duration::from_secs(3);
const ERROR_TTL: Duration = Duration::from_secs(5);

/// Tabs of the detail pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailTab {
    #[default]
    Overview,
    Comments,
    Attachments,
}

impl DetailTab {
    pub fn next(self) -> Self {
        match self {
            DetailTab::Overview => DetailTab::Comments,
            DetailTab::Comments => DetailTab::Attachments,
            DetailTab::Attachments => DetailTab::Overview,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            DetailTab::Overview => 0,
            DetailTab::Comments => 1,
            DetailTab::Attachments => 2,
        }
    }
}

/// Modal layer over the browser. Takes every key while open.
#[derive(Debug, Clone, Default)]
pub enum Overlay {
    #[default]
    None,
    Help,
    /// `/` prompt: a loaded case id to jump to, or a keyword to filter by.
    QuickSearch(String),
    Filter(FilterDialog),
}

/// Time-limited status bar message.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub expires_at: Instant,
}

/// A running export.
pub struct ExportJob {
    pub label: String,
    pub progress: Option<ProgressEvent>,
    progress_rx: mpsc::Receiver<ProgressEvent>,
    result_rx: oneshot::Receiver<Result<ExportReport, String>>,
    cancel: CancelToken,
}

impl ExportJob {
    pub fn is_cancelling(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct App {
    /// Cleared by `q`.
    pub running: bool,
    pub session: BrowseSession,
    pub config: Config,
    service: Arc<dyn CaseService>,
    /// What the header shows for the active filter.
    pub filter_label: String,
    pub tab: DetailTab,
    pub status: Option<StatusMessage>,
    pub export: Option<ExportJob>,
    pub overlay: Overlay,
    /// Visible list rows, from the last terminal size.
    pub viewport: usize,
}

impl App {
    pub fn new(
        config: Config,
        service: Arc<dyn CaseService>,
        filter: CaseFilter,
        filter_label: String,
    ) -> Self {
        let settings = BrowseSettings {
            page_size: config.page_size(),
            debounce: config.debounce(),
            timeout: config.interactive_timeout(),
        };
        let mut session = BrowseSession::new(Arc::clone(&service), settings);
        session.load_first_page(filter);
        Self {
            running: true,
            session,
            config,
            service,
            filter_label,
            tab: DetailTab::default(),
            status: None,
            export: None,
            overlay: Overlay::None,
            viewport: 20,
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>, is_error: bool) {
        let ttl = if is_error { ERROR_TTL } else { INFO_TTL };
        self.status = Some(StatusMessage {
            text: text.into(),
            is_error,
            expires_at: Instant::now() + ttl,
        });
    }

    /// Periodic work: expire the status line, fire due fetches, collect
    /// results.
    pub fn tick(&mut self) {
        if let Some(status) = &self.status {
            if status.expires_at <= Instant::now() {
                self.status = None;
            }
        }
        self.pump();
    }

    fn pump(&mut self) {
        let now = tokio::time::Instant::now();
        self.session.tick(now);
        for update in self.session.drain(now) {
            self.apply_update(update);
        }
        self.poll_export();
    }

    fn apply_update(&mut self, update: BrowseUpdate) {
        match update {
            BrowseUpdate::PageLoaded { loaded: 0, .. } => {
                self.set_status("No cases match this filter", false);
            }
            BrowseUpdate::PageLoaded { .. } => {
                // A short first page may not fill the screen.
                self.session.maybe_load_more(self.viewport);
            }
            BrowseUpdate::PageFailed(err) => {
                self.set_status(format!("Loading cases failed: {}", err.short_message()), true);
            }
            BrowseUpdate::DetailShown(_) | BrowseUpdate::DetailCached(_) => {}
            BrowseUpdate::DetailFailed { id, error, current } => {
                if current {
                    self.set_status(format!("{}: {}", id, error.short_message()), true);
                }
            }
        }
    }

    fn poll_export(&mut self) {
        let Some(job) = self.export.as_mut() else {
            return;
        };
        while let Ok(event) = job.progress_rx.try_recv() {
            job.progress = Some(event);
        }
        match job.result_rx.try_recv() {
            Ok(Ok(report)) => {
                self.export = None;
                self.report_export(&report);
            }
            Ok(Err(message)) => {
                self.export = None;
                self.set_status(format!("Export failed: {}", message), true);
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                self.export = None;
                self.set_status("Export stopped unexpectedly", true);
            }
        }
    }

    fn report_export(&mut self, report: &ExportReport) {
        let summary = report.summary_line();
        if report.all_failed() {
            let detail = report
                .partial_error()
                .map(|err| err.to_string())
                .unwrap_or_default();
            self.set_status(format!("Export failed: {}", detail), true);
        } else if report.cancelled {
            self.set_status(format!("Export cancelled: {}", summary), true);
        } else if report.failed() > 0 {
            self.set_status(summary, true);
        } else {
            self.set_status(summary, false);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.quit();
            return;
        }
        if !matches!(self.overlay, Overlay::None) {
            self.handle_overlay_key(key);
            self.pump();
            return;
        }

        let now = tokio::time::Instant::now();
        let page = self.viewport.max(1) as isize;

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Down | KeyCode::Char('j') => self.move_by(1, now),
            KeyCode::Up | KeyCode::Char('k') => self.move_by(-1, now),
            KeyCode::PageDown => self.move_by(page, now),
            KeyCode::PageUp => self.move_by(-page, now),
            KeyCode::Home | KeyCode::Char('g') => self.session.select_index(0, now),
            KeyCode::End | KeyCode::Char('G') => {
                self.session.select_last(now);
                self.session.maybe_load_more(self.viewport);
            }
            KeyCode::Tab => self.tab = self.tab.next(),
            KeyCode::Char('r') => {
                self.session.refresh();
                self.set_status("Refreshing", false);
            }
            KeyCode::Char('s') => {
                let sort = self.session.cycle_sort_field();
                self.set_status(format!("Sorted by {}", sort), false);
            }
            KeyCode::Char('S') => {
                let sort = self.session.toggle_sort_direction();
                self.set_status(format!("Sorted by {}", sort), false);
            }
            KeyCode::Char(digit) if digit.is_ascii_digit() => self.apply_preset(digit),
            KeyCode::Char('c') => {
                let filter = self.config.base_filter();
                self.filter_label = filter.describe();
                self.session.load_first_page(filter);
                self.set_status("Filter cleared", false);
            }
            KeyCode::Char('e') => self.export_selected(),
            KeyCode::Char('E') => self.export_filter(),
            KeyCode::Char('x') => self.cancel_export(),
            KeyCode::Char('?') => self.overlay = Overlay::Help,
            KeyCode::Char('/') => self.overlay = Overlay::QuickSearch(String::new()),
            KeyCode::Char('f') => {
                self.overlay = Overlay::Filter(FilterDialog::new(self.session.list().filter()));
            }
            _ => {}
        }
        self.pump();
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) {
        match std::mem::take(&mut self.overlay) {
            Overlay::None => {}
            Overlay::Help => {
                if !matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                    self.overlay = Overlay::Help;
                }
            }
            Overlay::QuickSearch(mut text) => match handle_text_input(key, &mut text) {
                TextInputResult::Committed => self.quick_search(text.trim()),
                TextInputResult::Cancelled => {}
                TextInputResult::Continue | TextInputResult::NotHandled => {
                    self.overlay = Overlay::QuickSearch(text);
                }
            },
            Overlay::Filter(mut dialog) => match dialog.handle_key(key) {
                DialogAction::Continue => self.overlay = Overlay::Filter(dialog),
                DialogAction::Apply(filter) => self.apply_filter(filter),
                DialogAction::Cancel => {}
            },
        }
    }

    /// Jump to a loaded case with this id, otherwise filter by keyword.
    fn quick_search(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let position = self
            .session
            .list()
            .rows()
            .position(|case| case.id.as_str().eq_ignore_ascii_case(text));
        if let Some(index) = position {
            self.session.select_index(index, tokio::time::Instant::now());
            self.set_status(format!("Jumped to {}", text.to_uppercase()), false);
            return;
        }
        let filter = CaseFilter {
            keyword: Some(text.to_string()),
            ..self.session.list().filter().clone()
        };
        self.apply_filter(filter);
    }

    fn apply_filter(&mut self, filter: CaseFilter) {
        let filter = self.config.resolve(filter);
        self.filter_label = filter.describe();
        info!(filter = %self.filter_label, "Filter applied");
        self.session.load_first_page(filter);
        self.set_status("Filter applied", false);
    }

    fn quit(&mut self) {
        if let Some(job) = &self.export {
            job.cancel.cancel();
        }
        self.running = false;
    }

    fn move_by(&mut self, delta: isize, now: tokio::time::Instant) {
        self.session.move_selection(delta, now);
        self.session.maybe_load_more(self.viewport);
    }

    fn apply_preset(&mut self, digit: char) {
        let slot = digit.to_string();
        match self.config.preset(&slot) {
            Some(filter) => {
                self.filter_label = format!("preset {}: {}", slot, filter.describe());
                self.session.load_first_page(filter);
                self.set_status(format!("Preset {} applied", slot), false);
            }
            None => self.set_status(format!("No preset in slot {}", slot), true),
        }
    }

    fn export_selected(&mut self) {
        let Some(id) = self.session.list().selected_id().cloned() else {
            self.set_status("No case selected", true);
            return;
        };
        let label = format!("case {}", id);
        self.start_export(label, Some(vec![id]), None);
    }

    fn export_filter(&mut self) {
        let filter = self.session.list().filter().clone();
        let label = filter.describe();
        self.start_export(label, None, Some(filter));
    }

    /// Spawn an export of `ids`, or of every case matching `filter`.
    fn start_export(&mut self, label: String, ids: Option<Vec<CaseId>>, filter: Option<CaseFilter>) {
        if self.export.is_some() {
            self.set_status("An export is already running (x to cancel)", true);
            return;
        }
        let engine = match build_engine(
            &self.config,
            Arc::clone(&self.service),
            &ExportFlags::default(),
        ) {
            Ok(engine) => engine,
            Err(err) => {
                self.set_status(format!("Cannot export: {:#}", err), true);
                return;
            }
        };

        let (progress_tx, progress_rx) = progress_channel(self.config.export.progress_capacity);
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = CancelToken::new();
        let service = Arc::clone(&self.service);
        let page_size = self.config.page_size();
        let run_cancel = cancel.clone();

        info!(target = %label, "Starting export from TUI");
        tokio::spawn(async move {
            let ids = match (ids, &filter) {
                (Some(ids), _) => ids,
                (None, Some(filter)) => {
                    match collect_case_ids(service.as_ref(), filter, page_size).await {
                        Ok(ids) => ids,
                        Err(err) => {
                            warn!(error = %err, "Selecting cases for export failed");
                            let _ = result_tx.send(Err(err.short_message()));
                            return;
                        }
                    }
                }
                (None, None) => Vec::new(),
            };
            let result = engine
                .run(ids, filter, Some(progress_tx), run_cancel)
                .await
                .map_err(|err| err.to_string());
            let _ = result_tx.send(result);
        });

        self.set_status(format!("Exporting {}", label), false);
        self.export = Some(ExportJob {
            label,
            progress: None,
            progress_rx,
            result_rx,
            cancel,
        });
    }

    fn cancel_export(&mut self) {
        match &self.export {
            Some(job) if job.cancel.cancel() => {
                self.set_status("Cancelling export", false);
            }
            Some(_) => {}
            None => self.set_status("No export running", false),
        }
    }
}

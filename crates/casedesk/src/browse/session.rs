//! Browse session: the list loader and detail controller wired to a
//! [`CaseService`].
//!
//! The owner (the TUI event loop) calls into the session synchronously and
//! never awaits network I/O. Fetches run on spawned tasks and report back
//! through an unbounded channel that [`BrowseSession::drain`] empties.

use std::sync::Arc;
use std::time::Duration;

use casedesk_api::{
    fetch_bundle, with_deadline, ApiError, ApiResult, CaseBundle, CaseFilter, CaseId, CaseService,
    ListPage, INTERACTIVE_TIMEOUT,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::detail::{Completion, DetailController, FetchTicket, DEFAULT_DEBOUNCE};
use super::pager::{ListLoader, PageOutcome, PageTicket, SortKey};

/// Results coming back from spawned fetches.
#[derive(Debug)]
pub enum BrowseEvent {
    DetailFetched {
        ticket: FetchTicket,
        result: ApiResult<CaseBundle>,
    },
    PageFetched {
        ticket: PageTicket,
        result: ApiResult<ListPage>,
    },
}

/// What applying one event changed, for status messages.
#[derive(Debug, Clone)]
pub enum BrowseUpdate {
    PageLoaded {
        added: usize,
        loaded: usize,
        total: Option<usize>,
    },
    PageFailed(ApiError),
    DetailShown(CaseId),
    /// Arrived after the selection moved on; cached only.
    DetailCached(CaseId),
    DetailFailed {
        id: CaseId,
        error: ApiError,
        current: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BrowseSettings {
    pub page_size: usize,
    pub debounce: Duration,
    /// Deadline for each list or detail fetch.
    pub timeout: Duration,
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            debounce: DEFAULT_DEBOUNCE,
            timeout: INTERACTIVE_TIMEOUT,
        }
    }
}

pub struct BrowseSession {
    service: Arc<dyn CaseService>,
    list: ListLoader,
    detail: DetailController,
    timeout: Duration,
    tx: mpsc::UnboundedSender<BrowseEvent>,
    rx: mpsc::UnboundedReceiver<BrowseEvent>,
}

impl BrowseSession {
    pub fn new(service: Arc<dyn CaseService>, settings: BrowseSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            list: ListLoader::new(settings.page_size),
            detail: DetailController::new(settings.debounce),
            timeout: settings.timeout,
            tx,
            rx,
        }
    }

    pub fn list(&self) -> &ListLoader {
        &self.list
    }

    pub fn detail(&self) -> &DetailController {
        &self.detail
    }

    /// Bundle for the selected case, when it has arrived.
    pub fn displayed(&self) -> Option<Arc<CaseBundle>> {
        self.detail.displayed()
    }

    /// Start over under `filter`. Loaded rows and cached details are dropped.
    pub fn load_first_page(&mut self, filter: CaseFilter) {
        self.detail.clear();
        let ticket = self.list.load_first_page(filter);
        self.spawn_page(ticket);
    }

    pub fn refresh(&mut self) {
        let filter = self.list.filter().clone();
        self.load_first_page(filter);
    }

    /// Fetch the next page if the selection is near the end of the rows.
    pub fn maybe_load_more(&mut self, viewport: usize) {
        let position = self.list.selected_index().unwrap_or(0);
        if let Some(ticket) = self.list.maybe_load_more(position, viewport) {
            self.spawn_page(ticket);
        }
    }

    pub fn move_selection(&mut self, delta: isize, now: Instant) {
        if let Some(id) = self.list.move_selection(delta) {
            self.detail.select(id, now);
        }
    }

    pub fn select_index(&mut self, index: usize, now: Instant) {
        if let Some(id) = self.list.select_index(index) {
            self.detail.select(id, now);
        }
    }

    pub fn select_last(&mut self, now: Instant) {
        if let Some(id) = self.list.select_last() {
            self.detail.select(id, now);
        }
    }

    pub fn cycle_sort_field(&mut self) -> SortKey {
        self.list.cycle_sort_field()
    }

    pub fn toggle_sort_direction(&mut self) -> SortKey {
        self.list.toggle_sort_direction()
    }

    /// Start the detail fetch if the debounce timer is due.
    pub fn tick(&mut self, now: Instant) {
        if let Some(ticket) = self.detail.poll(now) {
            self.spawn_detail(ticket);
        }
    }

    /// Apply every result that has arrived, without waiting.
    pub fn drain(&mut self, now: Instant) -> Vec<BrowseUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if let Some(update) = self.apply(event, now) {
                updates.push(update);
            }
        }
        updates
    }

    /// Wait for the next result that changes something and apply it.
    pub async fn next_update(&mut self) -> Option<BrowseUpdate> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(update) = self.apply(event, Instant::now()) {
                return Some(update);
            }
        }
    }

    fn apply(&mut self, event: BrowseEvent, now: Instant) -> Option<BrowseUpdate> {
        match event {
            BrowseEvent::PageFetched { ticket, result } => {
                match self.list.apply(ticket, result) {
                    PageOutcome::Loaded { added, first } => {
                        if first {
                            if let Some(id) = self.list.selected_id().cloned() {
                                self.detail.select(id, now);
                            }
                        }
                        Some(BrowseUpdate::PageLoaded {
                            added,
                            loaded: self.list.len(),
                            total: self.list.total(),
                        })
                    }
                    PageOutcome::Failed(error) => {
                        warn!(error = %error, "Case page fetch failed");
                        Some(BrowseUpdate::PageFailed(error))
                    }
                    PageOutcome::Discarded => None,
                }
            }
            BrowseEvent::DetailFetched { ticket, result } => {
                let id = ticket.id.clone();
                match self.detail.complete(ticket, result) {
                    Completion::Displayed => Some(BrowseUpdate::DetailShown(id)),
                    Completion::Stale => Some(BrowseUpdate::DetailCached(id)),
                    Completion::Failed { error, current } => {
                        warn!(case = %id, error = %error, "Case detail fetch failed");
                        Some(BrowseUpdate::DetailFailed { id, error, current })
                    }
                    Completion::Discarded => None,
                }
            }
        }
    }

    fn spawn_page(&self, ticket: PageTicket) {
        let service = Arc::clone(&self.service);
        let filter = self.list.filter().clone();
        let tx = self.tx.clone();
        let timeout = self.timeout;
        debug!(offset = ticket.offset, "Spawning page fetch");
        tokio::spawn(async move {
            let result = with_deadline(
                timeout,
                "list cases",
                service.list_cases(&filter, ticket.offset, ticket.limit),
            )
            .await;
            let _ = tx.send(BrowseEvent::PageFetched { ticket, result });
        });
    }

    fn spawn_detail(&self, ticket: FetchTicket) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = with_deadline(
                timeout,
                "fetch case",
                fetch_bundle(service.as_ref(), &ticket.id),
            )
            .await;
            let _ = tx.send(BrowseEvent::DetailFetched { ticket, result });
        });
    }
}

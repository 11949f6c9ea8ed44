//! Detail cache and fetch controller.
//!
//! A small state machine owned by the browse session. It never performs I/O
//! itself: `poll` hands out a [`FetchTicket`] when a fetch should start and
//! `complete` takes the result back. Time is passed in, so tests drive it
//! with a paused tokio clock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use casedesk_api::{ApiError, ApiResult, CaseBundle, CaseId};
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Permission to fetch one bundle. Hand it back to
/// [`DetailController::complete`] with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: CaseId,
    epoch: u64,
}

/// What a selection change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Served from cache; nothing to fetch.
    Cached,
    /// A fetch for this id is already running.
    InFlight,
    /// Debounce timer (re)armed; a fetch starts at `deadline` if the
    /// selection is still the same.
    Armed { deadline: Instant },
    /// Same id as before; nothing changed.
    Unchanged,
}

/// What a finished fetch did.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Cached and shown.
    Displayed,
    /// Cached only; the selection moved on while it was in flight.
    Stale,
    /// Fetch failed. `current` tells whether the failed id is still selected.
    Failed { error: ApiError, current: bool },
    /// Belongs to a working set that has since been cleared.
    Discarded,
}

#[derive(Debug, Clone)]
struct Pending {
    id: CaseId,
    deadline: Instant,
}

/// Owns the detail cache and decides when bundles are fetched.
///
/// The cache is unbounded and only cleared wholesale, when the list's working
/// set changes. Readers get `Arc` snapshots.
#[derive(Debug)]
pub struct DetailController {
    debounce: Duration,
    cache: HashMap<CaseId, Arc<CaseBundle>>,
    selected: Option<CaseId>,
    displayed: Option<Arc<CaseBundle>>,
    pending: Option<Pending>,
    in_flight: HashSet<CaseId>,
    epoch: u64,
    fetches_started: u64,
}

impl DetailController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            cache: HashMap::new(),
            selected: None,
            displayed: None,
            pending: None,
            in_flight: HashSet::new(),
            epoch: 0,
            fetches_started: 0,
        }
    }

    /// The selection moved to `id`.
    pub fn select(&mut self, id: CaseId, now: Instant) -> Selection {
        if let Some(bundle) = self.cache.get(&id) {
            self.displayed = Some(Arc::clone(bundle));
            self.selected = Some(id);
            self.pending = None;
            return Selection::Cached;
        }

        self.displayed = None;
        if self.in_flight.contains(&id) {
            self.selected = Some(id);
            self.pending = None;
            return Selection::InFlight;
        }
        if self.selected.as_ref() == Some(&id) && self.pending.is_some() {
            return Selection::Unchanged;
        }

        let deadline = now + self.debounce;
        self.pending = Some(Pending {
            id: id.clone(),
            deadline,
        });
        self.selected = Some(id);
        Selection::Armed { deadline }
    }

    /// Fire the debounce timer if it is due.
    pub fn poll(&mut self, now: Instant) -> Option<FetchTicket> {
        let due = matches!(&self.pending, Some(pending) if pending.deadline <= now);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        if self.selected.as_ref() != Some(&pending.id)
            || self.cache.contains_key(&pending.id)
            || self.in_flight.contains(&pending.id)
        {
            return None;
        }

        self.in_flight.insert(pending.id.clone());
        self.fetches_started += 1;
        debug!(case = %pending.id, "Starting detail fetch");
        Some(FetchTicket {
            id: pending.id,
            epoch: self.epoch,
        })
    }

    /// Take a fetch result back.
    pub fn complete(&mut self, ticket: FetchTicket, result: ApiResult<CaseBundle>) -> Completion {
        if ticket.epoch != self.epoch {
            debug!(case = %ticket.id, "Discarding detail from a cleared working set");
            return Completion::Discarded;
        }
        self.in_flight.remove(&ticket.id);
        let current = self.selected.as_ref() == Some(&ticket.id);

        match result {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                self.cache.insert(ticket.id, Arc::clone(&bundle));
                if current {
                    self.displayed = Some(bundle);
                    Completion::Displayed
                } else {
                    Completion::Stale
                }
            }
            Err(error) => Completion::Failed { error, current },
        }
    }

    /// Forget everything: new working set.
    ///
    /// Fetches still in flight are discarded when they finish.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
        self.pending = None;
        self.selected = None;
        self.displayed = None;
        self.epoch += 1;
    }

    pub fn selected(&self) -> Option<&CaseId> {
        self.selected.as_ref()
    }

    pub fn displayed(&self) -> Option<Arc<CaseBundle>> {
        self.displayed.clone()
    }

    /// The selected case has no bundle yet but one is on its way.
    pub fn is_loading(&self) -> bool {
        match &self.selected {
            Some(id) => {
                self.displayed.is_none() && (self.pending.is_some() || self.in_flight.contains(id))
            }
            None => false,
        }
    }

    pub fn cached(&self, id: &CaseId) -> Option<Arc<CaseBundle>> {
        self.cache.get(id).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Fetches handed out since creation.
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started
    }
}

impl Default for DetailController {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casedesk_api::Case;

    fn id(s: &str) -> CaseId {
        CaseId::new(s)
    }

    fn bundle(s: &str) -> CaseBundle {
        CaseBundle::complete(
            Case {
                id: id(s),
                summary: format!("summary {}", s),
                ..Default::default()
            },
            Vec::new(),
            Vec::new(),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_selection_fetches_only_last() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("A"), t0);
        detail.select(id("B"), t0 + ms(40));
        detail.select(id("C"), t0 + ms(90));

        // A's and B's timers would have been due here; only C is armed.
        assert!(detail.poll(t0 + ms(520)).is_none());
        let ticket = detail.poll(t0 + ms(590)).unwrap();
        assert_eq!(ticket.id, id("C"));
        assert!(detail.poll(t0 + ms(2000)).is_none());
        assert_eq!(detail.fetches_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_selection_is_synchronous() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("A"), t0);
        let ticket = detail.poll(t0 + ms(500)).unwrap();
        assert!(matches!(detail.complete(ticket, Ok(bundle("A"))), Completion::Displayed));

        detail.select(id("B"), t0 + ms(600));
        assert!(detail.displayed().is_none());

        for _ in 0..3 {
            assert_eq!(detail.select(id("A"), t0 + ms(700)), Selection::Cached);
            assert_eq!(detail.displayed().unwrap().id(), &id("A"));
        }
        assert!(detail.poll(t0 + ms(5000)).is_none());
        assert_eq!(detail.fetches_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_cached_not_displayed() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("X"), t0);
        let x = detail.poll(t0 + ms(500)).unwrap();
        detail.select(id("Y"), t0 + ms(600));
        let y = detail.poll(t0 + ms(1100)).unwrap();

        assert!(matches!(detail.complete(y, Ok(bundle("Y"))), Completion::Displayed));
        assert!(matches!(detail.complete(x, Ok(bundle("X"))), Completion::Stale));

        assert_eq!(detail.displayed().unwrap().id(), &id("Y"));
        assert!(detail.cached(&id("X")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_duplicate_fetch_while_in_flight() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("A"), t0);
        let ticket = detail.poll(t0 + ms(500)).unwrap();

        detail.select(id("B"), t0 + ms(510));
        assert_eq!(detail.select(id("A"), t0 + ms(520)), Selection::InFlight);
        assert!(detail.is_loading());
        assert!(detail.poll(t0 + ms(5000)).is_none());

        assert!(matches!(detail.complete(ticket, Ok(bundle("A"))), Completion::Displayed));
        assert_eq!(detail.fetches_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("A"), t0);
        let ticket = detail.poll(t0 + ms(500)).unwrap();
        let outcome = detail.complete(ticket, Err(ApiError::Transport("reset".into())));
        assert!(matches!(outcome, Completion::Failed { current: true, .. }));
        assert!(detail.cached(&id("A")).is_none());

        // Re-selecting retries.
        detail.select(id("B"), t0 + ms(600));
        assert!(matches!(
            detail.select(id("A"), t0 + ms(700)),
            Selection::Armed { .. }
        ));
        assert!(detail.poll(t0 + ms(1200)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_late_results() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        detail.select(id("A"), t0);
        let ticket = detail.poll(t0 + ms(500)).unwrap();
        detail.clear();

        assert!(matches!(detail.complete(ticket, Ok(bundle("A"))), Completion::Discarded));
        assert_eq!(detail.cache_len(), 0);
        assert!(detail.selected().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselecting_pending_id_keeps_timer() {
        let mut detail = DetailController::default();
        let t0 = Instant::now();

        let first = detail.select(id("A"), t0);
        assert_eq!(detail.select(id("A"), t0 + ms(300)), Selection::Unchanged);
        assert_eq!(first, Selection::Armed { deadline: t0 + ms(500) });
        assert!(detail.poll(t0 + ms(500)).is_some());
    }
}

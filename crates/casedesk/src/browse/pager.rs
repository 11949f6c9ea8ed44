//! Incrementally paginated case list.
//!
//! The loader holds a gap-free prefix of the service's result set. Pages are
//! requested one at a time at `offset = loaded rows`, and appended with
//! duplicates dropped. Sorting is a local view over what has been loaded;
//! it never triggers a request.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use casedesk_api::{ApiError, ApiResult, Case, CaseFilter, CaseId, ListPage};
use tracing::{debug, warn};

/// Permission to fetch one page. Hand it back to [`ListLoader::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub offset: usize,
    pub limit: usize,
    epoch: u64,
}

#[derive(Debug, Clone)]
pub enum PageOutcome {
    Loaded { added: usize, first: bool },
    /// Loaded rows are untouched.
    Failed(ApiError),
    /// The list was reset while this page was in flight.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Order the service returned.
    #[default]
    Service,
    Modified,
    Severity,
    Status,
    Id,
    Summary,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Service => "default",
            SortField::Modified => "modified",
            SortField::Severity => "severity",
            SortField::Status => "status",
            SortField::Id => "id",
            SortField::Summary => "summary",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SortField::Service => SortField::Modified,
            SortField::Modified => SortField::Severity,
            SortField::Severity => SortField::Status,
            SortField::Status => SortField::Id,
            SortField::Id => SortField::Summary,
            SortField::Summary => SortField::Service,
        }
    }

    fn compare(&self, a: &Case, b: &Case) -> Ordering {
        match self {
            SortField::Service => Ordering::Equal,
            SortField::Modified => a.last_modified.cmp(&b.last_modified),
            SortField::Severity => a.severity.cmp(&b.severity),
            SortField::Status => a.status.cmp(&b.status),
            SortField::Id => a.id.cmp(&b.id),
            SortField::Summary => a.summary.to_lowercase().cmp(&b.summary.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "↑",
            SortDirection::Descending => "↓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str(), self.direction.arrow())
    }
}

/// Owns the loaded rows, the known total and the single in-flight page.
#[derive(Debug)]
pub struct ListLoader {
    page_size: usize,
    filter: CaseFilter,
    /// Service order.
    items: Vec<Case>,
    ids: HashSet<CaseId>,
    /// Indices into `items` in display order.
    view: Vec<usize>,
    total: Option<usize>,
    loading: Option<PageTicket>,
    epoch: u64,
    exhausted: bool,
    sort: SortKey,
    selected: Option<CaseId>,
}

impl ListLoader {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            filter: CaseFilter::default(),
            items: Vec::new(),
            ids: HashSet::new(),
            view: Vec::new(),
            total: None,
            loading: None,
            epoch: 0,
            exhausted: false,
            sort: SortKey::default(),
            selected: None,
        }
    }

    /// Drop everything loaded and request offset 0 under `filter`.
    ///
    /// A page still in flight from before is discarded when it arrives.
    pub fn load_first_page(&mut self, filter: CaseFilter) -> PageTicket {
        self.epoch += 1;
        self.filter = filter;
        self.items.clear();
        self.ids.clear();
        self.view.clear();
        self.total = None;
        self.exhausted = false;
        self.selected = None;
        self.request(0)
    }

    /// Start over with the current filter.
    pub fn refresh(&mut self) -> PageTicket {
        let filter = self.filter.clone();
        self.load_first_page(filter)
    }

    /// Request the next page if the cursor is within one viewport of the
    /// end of the loaded rows and more exist.
    pub fn maybe_load_more(&mut self, position: usize, viewport: usize) -> Option<PageTicket> {
        if self.loading.is_some() || !self.has_more() {
            return None;
        }
        if position + viewport.max(1) < self.items.len() {
            return None;
        }
        Some(self.request(self.items.len()))
    }

    fn request(&mut self, offset: usize) -> PageTicket {
        let ticket = PageTicket {
            offset,
            limit: self.page_size,
            epoch: self.epoch,
        };
        debug!(offset, limit = self.page_size, "Requesting case page");
        self.loading = Some(ticket.clone());
        ticket
    }

    /// Take a page result back.
    pub fn apply(&mut self, ticket: PageTicket, result: ApiResult<ListPage>) -> PageOutcome {
        if self.loading.as_ref() != Some(&ticket) {
            debug!(offset = ticket.offset, "Discarding page from a reset list");
            return PageOutcome::Discarded;
        }
        self.loading = None;
        let first = ticket.offset == 0;

        let page = match result {
            Ok(page) => page,
            Err(err) => return PageOutcome::Failed(err),
        };

        let received = page.items.len();
        let mut added = 0;
        for case in page.items {
            if self.ids.insert(case.id.clone()) {
                self.items.push(case);
                added += 1;
            }
        }
        self.total = Some(page.total);
        if added == 0 && !self.is_complete() {
            // The service stopped making progress; don't ask again.
            warn!(
                offset = ticket.offset,
                received,
                total = page.total,
                "Page added no rows, treating the list as complete"
            );
            self.exhausted = true;
        }
        self.rebuild_view();

        if self.selected.is_none() {
            self.selected = self.row(0).map(|case| case.id.clone());
        }
        debug!(added, loaded = self.items.len(), total = page.total, "Page applied");
        PageOutcome::Loaded { added, first }
    }

    fn rebuild_view(&mut self) {
        let mut view: Vec<usize> = (0..self.items.len()).collect();
        let SortKey { field, direction } = self.sort;
        view.sort_by(|&a, &b| {
            let ord = match field {
                SortField::Service => a.cmp(&b),
                _ => field.compare(&self.items[a], &self.items[b]),
            };
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        self.view = view;
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        if self.sort != sort {
            self.sort = sort;
            self.rebuild_view();
        }
    }

    pub fn cycle_sort_field(&mut self) -> SortKey {
        let sort = SortKey {
            field: self.sort.field.next(),
            direction: self.sort.direction,
        };
        self.set_sort(sort);
        sort
    }

    pub fn toggle_sort_direction(&mut self) -> SortKey {
        let sort = SortKey {
            field: self.sort.field,
            direction: self.sort.direction.toggle(),
        };
        self.set_sort(sort);
        sort
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn filter(&self) -> &CaseFilter {
        &self.filter
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total reported by the most recent page.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    fn is_complete(&self) -> bool {
        matches!(self.total, Some(total) if self.items.len() >= total)
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted && matches!(self.total, Some(total) if self.items.len() < total)
    }

    /// Rows in service order, as loaded.
    pub fn loaded(&self) -> &[Case] {
        &self.items
    }

    /// Row at `index` in display order.
    pub fn row(&self, index: usize) -> Option<&Case> {
        self.view.get(index).map(|&i| &self.items[i])
    }

    /// Rows in display order.
    pub fn rows(&self) -> impl Iterator<Item = &Case> {
        self.view.iter().map(move |&i| &self.items[i])
    }

    /// Display position of `id`.
    pub fn position_of(&self, id: &CaseId) -> Option<usize> {
        self.view.iter().position(|&i| &self.items[i].id == id)
    }

    pub fn selected_id(&self) -> Option<&CaseId> {
        self.selected.as_ref()
    }

    /// Display position of the selected row.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected.as_ref().and_then(|id| self.position_of(id))
    }

    /// Select the row at `index`, clamped to the loaded rows.
    pub fn select_index(&mut self, index: usize) -> Option<CaseId> {
        let last = self.view.len().checked_sub(1)?;
        let id = self.row(index.min(last))?.id.clone();
        self.selected = Some(id.clone());
        Some(id)
    }

    /// Move the selection by `delta` rows.
    pub fn move_selection(&mut self, delta: isize) -> Option<CaseId> {
        let current = self.selected_index().unwrap_or(0);
        let target = if delta.is_negative() {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta.unsigned_abs())
        };
        self.select_index(target)
    }

    pub fn select_last(&mut self) -> Option<CaseId> {
        self.select_index(usize::MAX)
    }
}

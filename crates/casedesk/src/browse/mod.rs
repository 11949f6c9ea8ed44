//! Browse core: the detail cache and fetch controller, the paginated list
//! loader, and the session that drives both against a case service.

pub mod detail;
pub mod pager;
pub mod session;

pub use detail::{Completion, DetailController, FetchTicket, Selection, DEFAULT_DEBOUNCE};
pub use pager::{ListLoader, PageOutcome, PageTicket, SortDirection, SortField, SortKey};
pub use session::{BrowseEvent, BrowseSession, BrowseSettings, BrowseUpdate};

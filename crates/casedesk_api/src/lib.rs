//! Client side of the remote case tracker.
//!
//! [`CaseService`] is the seam everything else is written against;
//! [`HttpCaseService`] talks to the real service and
//! `testing::ScriptedCaseService` stands in for it in tests.

pub mod error;
pub mod filter;
pub mod http;
pub mod model;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ApiError, ApiResult};
pub use filter::{split_list, CaseFilter, StatusAliases};
pub use http::HttpCaseService;
pub use model::{
    Attachment, BundleGap, BundlePart, Case, CaseBundle, CaseId, Comment, HitKind, ListPage,
    SearchHit,
};
pub use service::{
    assemble_bundle, fetch_bundle, with_deadline, CaseService, Download, INTERACTIVE_TIMEOUT,
};

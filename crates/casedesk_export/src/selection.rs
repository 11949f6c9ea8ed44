//! Turning a filter into the list of case ids to export.

use std::collections::HashSet;

use casedesk_api::{ApiResult, CaseFilter, CaseId, CaseService};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Page through every case matching `filter`, in service order.
///
/// Stops on a short page or once the reported total is reached. Any list
/// failure fails the whole selection.
pub async fn collect_case_ids(
    service: &dyn CaseService,
    filter: &CaseFilter,
    page_size: usize,
) -> ApiResult<Vec<CaseId>> {
    let page_size = page_size.max(1);
    let mut ids: Vec<CaseId> = Vec::new();
    let mut seen: HashSet<CaseId> = HashSet::new();
    let mut offset = 0;

    loop {
        debug!(offset, limit = page_size, "Listing cases for export");
        let page = service.list_cases(filter, offset, page_size).await?;
        let received = page.items.len();
        for case in page.items {
            if seen.insert(case.id.clone()) {
                ids.push(case.id);
            }
        }
        debug!(received, total = page.total, collected = ids.len(), "Page listed");

        if received < page_size || ids.len() >= page.total {
            break;
        }
        offset += received;
    }
    Ok(ids)
}

//! The remote case service seam.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::filter::CaseFilter;
use crate::model::{
    Attachment, BundlePart, Case, CaseBundle, CaseId, Comment, ListPage, SearchHit,
};

/// Deadline for interactive single-record fetches.
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of streaming one attachment into a writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Download {
    pub bytes: u64,
    /// Filename suggested by the service, if any.
    pub filename: Option<String>,
}

/// Everything casedesk needs from the remote case tracker.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait CaseService: Send + Sync {
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        offset: usize,
        limit: usize,
    ) -> ApiResult<ListPage>;

    async fn get_case(&self, id: &CaseId) -> ApiResult<Case>;

    async fn get_comments(&self, id: &CaseId) -> ApiResult<Vec<Comment>>;

    async fn get_attachments(&self, id: &CaseId) -> ApiResult<Vec<Attachment>>;

    /// Stream attachment content into `sink`.
    async fn download_attachment(
        &self,
        id: &CaseId,
        attachment_id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ApiResult<Download>;

    /// Free-text search over cases, solutions and articles, best match
    /// first. At most `limit` hits.
    async fn search(&self, query: &str, limit: usize) -> ApiResult<Vec<SearchHit>>;
}

/// Fetch a case with its comments and attachments.
///
/// Failing to fetch the case itself is an error. Comment or attachment
/// failures produce a partial bundle with the gap recorded.
pub async fn fetch_bundle(service: &dyn CaseService, id: &CaseId) -> ApiResult<CaseBundle> {
    let case = service.get_case(id).await?;

    let comments = match service.get_comments(id).await {
        Ok(comments) => Ok(comments),
        Err(err) => {
            warn!(case = %id, error = %err, "Failed to fetch comments");
            Err(err)
        }
    };
    let attachments = match service.get_attachments(id).await {
        Ok(attachments) => Ok(attachments),
        Err(err) => {
            warn!(case = %id, error = %err, "Failed to fetch attachments");
            Err(err)
        }
    };

    Ok(assemble_bundle(case, comments, attachments))
}

/// Build a bundle from the three fetch results, recording gaps.
pub fn assemble_bundle(
    case: Case,
    comments: ApiResult<Vec<Comment>>,
    attachments: ApiResult<Vec<Attachment>>,
) -> CaseBundle {
    let mut gaps = Vec::new();
    let comments = comments.unwrap_or_else(|err| {
        gaps.push((BundlePart::Comments, err.to_string()));
        Vec::new()
    });
    let attachments = attachments.unwrap_or_else(|err| {
        gaps.push((BundlePart::Attachments, err.to_string()));
        Vec::new()
    });

    let mut bundle = CaseBundle::complete(case, comments, attachments);
    for (part, reason) in gaps {
        bundle.mark_missing(part, reason);
    }
    debug!(
        case = %bundle.id(),
        comments = bundle.comments.len(),
        attachments = bundle.attachments.len(),
        partial = bundle.is_partial(),
        "Assembled bundle"
    );
    bundle
}

/// Run `fut` with a deadline. Elapsing maps to [`ApiError::Timeout`].
pub async fn with_deadline<T, F>(after: Duration, operation: &'static str, fut: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_bundle_flags_missing_parts() {
        let case = Case {
            id: CaseId::new("42"),
            ..Default::default()
        };
        let bundle = assemble_bundle(
            case,
            Err(ApiError::Transport("connection reset".into())),
            Ok(vec![Attachment::default()]),
        );

        assert!(bundle.is_missing(BundlePart::Comments));
        assert!(!bundle.is_missing(BundlePart::Attachments));
        assert_eq!(bundle.attachments.len(), 1);
        assert!(bundle.gaps[0].reason.contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_times_out() {
        let result: ApiResult<()> = with_deadline(Duration::from_secs(30), "get case", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        match result {
            Err(ApiError::Timeout { operation, after }) => {
                assert_eq!(operation, "get case");
                assert_eq!(after, Duration::from_secs(30));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

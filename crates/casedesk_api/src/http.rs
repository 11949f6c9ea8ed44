//! HTTP implementation of [`CaseService`] over `reqwest`.
//!
//! The service is JSON over REST. List endpoints sometimes return a bare
//! array and sometimes wrap it in an object, and a few field names differ
//! between API versions, so decoding goes through lenient wire structs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::filter::CaseFilter;
use crate::model::{Attachment, Case, CaseId, Comment, HitKind, ListPage, SearchHit};
use crate::service::{CaseService, Download};

const USER_AGENT: &str = concat!("casedesk/", env!("CARGO_PKG_VERSION"));

/// Remote case service reached over HTTPS.
#[derive(Clone)]
pub struct HttpCaseService {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl HttpCaseService {
    /// Build a client for `base_url`. `connect_timeout` bounds connection
    /// setup only; per-call deadlines are applied by callers.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        connect_timeout: Duration,
    ) -> ApiResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidRequest(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        info!(base_url = %base_url, authenticated = token.is_some(), "Case service client ready");
        Ok(Self {
            base_url,
            client,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn case_url(&self, id: &CaseId, suffix: &str) -> ApiResult<String> {
        if id.is_empty() {
            return Err(ApiError::InvalidRequest("case id is empty".to_string()));
        }
        Ok(format!("{}/cases/{}{}", self.base_url, id.as_str(), suffix))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn post(&self, url: &str) -> RequestBuilder {
        let request = self.client.post(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> ApiResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(what, &e))?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> ApiResult<T> {
        debug!(url = %url, "GET");
        let response = self.send(self.get(url), what).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(what, &e))?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(format!("{}: {}", what, e)))
    }
}

fn transport_error(what: &str, err: &reqwest::Error) -> ApiError {
    ApiError::Transport(format!("{}: {}", what, err))
}

async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    let message = body.trim();
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        message.chars().take(200).collect()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
        _ => ApiError::Status {
            code: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl CaseService for HttpCaseService {
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        offset: usize,
        limit: usize,
    ) -> ApiResult<ListPage> {
        let url = format!("{}/cases", self.base_url);
        let mut query = filter.query_pairs();
        query.push(("offset", offset.to_string()));
        query.push(("limit", limit.to_string()));

        debug!(url = %url, offset, limit, "GET list");
        let response = self.send(self.get(&url).query(&query), "list cases").await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error("list cases", &e))?;
        let page = decode_list_page(&body, offset)?;
        debug!(items = page.items.len(), total = page.total, "Page decoded");
        Ok(page)
    }

    async fn get_case(&self, id: &CaseId) -> ApiResult<Case> {
        let url = self.case_url(id, "")?;
        self.get_json(&url, "get case").await
    }

    async fn get_comments(&self, id: &CaseId) -> ApiResult<Vec<Comment>> {
        let url = self.case_url(id, "/comments")?;
        let wire: ListOrWrapped<WireComment> = self.get_json(&url, "get comments").await?;
        Ok(wire.into_items().into_iter().map(Comment::from).collect())
    }

    async fn get_attachments(&self, id: &CaseId) -> ApiResult<Vec<Attachment>> {
        let url = self.case_url(id, "/attachments")?;
        let wire: ListOrWrapped<WireAttachment> = self.get_json(&url, "get attachments").await?;
        Ok(wire
            .into_items()
            .into_iter()
            .map(Attachment::from)
            .collect())
    }

    async fn download_attachment(
        &self,
        id: &CaseId,
        attachment_id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ApiResult<Download> {
        if attachment_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest("attachment id is empty".to_string()));
        }
        let url = self.case_url(id, &format!("/attachments/{}", attachment_id))?;
        debug!(url = %url, "GET attachment");
        let mut response = self.send(self.get(&url), "download attachment").await?;
        let filename = disposition_filename(response.headers());

        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error("download attachment", &e))?
        {
            sink.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Transport(format!("write attachment: {}", e)))?;
            bytes += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| ApiError::Transport(format!("flush attachment: {}", e)))?;

        Ok(Download { bytes, filename })
    }

    async fn search(&self, query: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::InvalidRequest("search query is empty".to_string()));
        }
        let url = format!("{}/search", self.base_url);
        let body = SearchRequest {
            q: query,
            rows: limit.max(1),
        };
        debug!(url = %url, rows = body.rows, "POST search");
        let response = self.send(self.post(&url).json(&body), "search").await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error("search", &e))?;
        let hits = decode_search(&body)?;
        debug!(hits = hits.len(), "Search decoded");
        Ok(hits)
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    rows: usize,
}

/// Search responses come bare, wrapped, or in a `{"response": {"docs": [...]}}`
/// envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchEnvelope {
    List(ListOrWrapped<WireHit>),
    Docs { response: DocsBody },
}

#[derive(Deserialize)]
struct DocsBody {
    docs: Vec<WireHit>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct WireHit {
    #[serde(alias = "caseNumber", alias = "case_number")]
    id: String,
    #[serde(alias = "allTitle", alias = "summary", alias = "case_summary")]
    title: String,
    published_title: Option<String>,
    #[serde(alias = "documentKind", alias = "kind")]
    r#type: Option<String>,
    #[serde(alias = "abstract")]
    snippet: Option<String>,
    #[serde(alias = "view_uri")]
    view_uri: Option<String>,
    uri: Option<String>,
}

impl From<WireHit> for SearchHit {
    fn from(wire: WireHit) -> Self {
        let title = if wire.title.is_empty() {
            wire.published_title.unwrap_or_default()
        } else {
            wire.title
        };
        SearchHit {
            kind: wire.r#type.as_deref().map(HitKind::parse).unwrap_or_default(),
            id: wire.id,
            title,
            snippet: wire.snippet.filter(|s| !s.is_empty()),
            uri: wire.view_uri.or(wire.uri).filter(|u| !u.is_empty()),
        }
    }
}

fn decode_search(body: &[u8]) -> ApiResult<Vec<SearchHit>> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)
        .map_err(|e| ApiError::Decode(format!("search: {}", e)))?;
    let docs = match envelope {
        SearchEnvelope::Docs { response } => response.docs,
        SearchEnvelope::List(list) => list.into_items(),
    };
    Ok(docs.into_iter().map(SearchHit::from).collect())
}

/// `filename="..."` from a Content-Disposition header.
fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    value.split(';').find_map(|part| {
        let part = part.trim();
        let raw = part.strip_prefix("filename=")?;
        let name = raw.trim_matches('"').trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    })
}

/// A list that may arrive bare or wrapped under a well-known key.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrWrapped<T> {
    Bare(Vec<T>),
    Wrapped(Wrapper<T>),
}

#[derive(Deserialize)]
struct Wrapper<T> {
    #[serde(alias = "comments", alias = "attachments", alias = "items", alias = "data")]
    items: Vec<T>,
}

impl<T> ListOrWrapped<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListOrWrapped::Bare(items) => items,
            ListOrWrapped::Wrapped(wrapper) => wrapper.items,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage {
    #[serde(alias = "cases", alias = "data")]
    items: Vec<Case>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default, alias = "totalCount", alias = "numFound")]
    total: Option<usize>,
}

fn decode_list_page(body: &[u8], requested_offset: usize) -> ApiResult<ListPage> {
    if let Ok(items) = serde_json::from_slice::<Vec<Case>>(body) {
        // Bare arrays carry no total; assume nothing lies beyond this page.
        let total = requested_offset + items.len();
        return Ok(ListPage {
            items,
            offset: requested_offset,
            total,
        });
    }
    let wire: WirePage = serde_json::from_slice(body)
        .map_err(|e| ApiError::Decode(format!("list cases: {}", e)))?;
    let offset = wire.offset.unwrap_or(requested_offset);
    let total = wire
        .total
        .unwrap_or(offset + wire.items.len())
        .max(offset + wire.items.len());
    Ok(ListPage {
        items: wire.items,
        offset,
        total,
    })
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct WireComment {
    id: String,
    #[serde(alias = "createdBy")]
    author: String,
    author_email: Option<String>,
    #[serde(alias = "createdDate")]
    created_at: Option<DateTime<Utc>>,
    text: Option<String>,
    comment_body: Option<String>,
    public: Option<bool>,
    is_public: Option<bool>,
    case_public: Option<bool>,
}

impl From<WireComment> for Comment {
    fn from(wire: WireComment) -> Self {
        let text = wire
            .text
            .filter(|t| !t.is_empty())
            .or(wire.comment_body)
            .unwrap_or_default();
        // Absent visibility means public: internal notes are always flagged.
        let public = wire
            .public
            .or(wire.is_public)
            .or(wire.case_public)
            .unwrap_or(true);
        Comment {
            id: wire.id,
            author: wire.author,
            author_email: wire.author_email.filter(|e| !e.is_empty()),
            created_at: wire.created_at,
            text,
            public,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct WireAttachment {
    #[serde(alias = "uuid")]
    id: String,
    #[serde(alias = "fileName")]
    filename: String,
    description: Option<String>,
    length: Option<u64>,
    size: Option<u64>,
    file_size: Option<u64>,
    content_length: Option<u64>,
    #[serde(alias = "mimeType")]
    content_type: Option<String>,
    created_by: Option<String>,
    #[serde(alias = "createdDate")]
    created_at: Option<DateTime<Utc>>,
}

impl From<WireAttachment> for Attachment {
    fn from(wire: WireAttachment) -> Self {
        let size = [wire.length, wire.size, wire.file_size, wire.content_length]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0);
        Attachment {
            id: wire.id,
            filename: wire.filename,
            description: wire.description.filter(|d| !d.is_empty()),
            size,
            mime_type: wire.content_type,
            created_by: wire.created_by,
            created_at: wire.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_new_rejects_bad_base_url() {
        let err = HttpCaseService::new("ftp://example", None, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let service =
            HttpCaseService::new("https://cases.example/api/", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(service.base_url(), "https://cases.example/api");
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(status_error(StatusCode::FORBIDDEN, "nope").is_unauthorized());
        let err = status_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.is_transient());
        match status_error(StatusCode::NOT_FOUND, " no such case ") {
            ApiError::Status { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "no such case");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_comments_decode_bare_and_wrapped() {
        let bare = r#"[{"id": "1", "author": "ann", "text": "hi", "public": false}]"#;
        let wrapped = r#"{"comments": [{"id": "2", "createdBy": "bob", "commentBody": "yo", "isPublic": true}]}"#;

        let bare: ListOrWrapped<WireComment> = serde_json::from_str(bare).unwrap();
        let bare: Vec<Comment> = bare.into_items().into_iter().map(Comment::from).collect();
        assert_eq!(bare[0].text, "hi");
        assert!(!bare[0].public);

        let wrapped: ListOrWrapped<WireComment> = serde_json::from_str(wrapped).unwrap();
        let wrapped: Vec<Comment> = wrapped.into_items().into_iter().map(Comment::from).collect();
        assert_eq!(wrapped[0].author, "bob");
        assert_eq!(wrapped[0].text, "yo");
        assert!(wrapped[0].public);
    }

    #[test]
    fn test_attachment_size_takes_largest_field() {
        let json = r#"{"uuid": "abc", "fileName": "sos.tar.xz", "length": 0, "fileSize": 2048}"#;
        let attachment = Attachment::from(serde_json::from_str::<WireAttachment>(json).unwrap());
        assert_eq!(attachment.id, "abc");
        assert_eq!(attachment.filename, "sos.tar.xz");
        assert_eq!(attachment.size, 2048);
    }

    #[test]
    fn test_list_page_decoding() {
        let wrapped = br#"{"items": [{"id": "1"}, {"id": "2"}], "totalCount": 10}"#;
        let page = decode_list_page(wrapped, 0).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 10);

        let bare = br#"[{"id": "3"}]"#;
        let page = decode_list_page(bare, 100).unwrap();
        assert_eq!(page.offset, 100);
        assert_eq!(page.total, 101);

        assert!(matches!(
            decode_list_page(b"not json", 0),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn test_search_decoding() {
        let docs = br#"{"response": {"numFound": 2, "docs": [
            {"id": "123", "allTitle": "Kernel panic on boot", "documentKind": "Solution", "view_uri": "https://kb/123"},
            {"id": "456", "publishedTitle": "Tuning guide", "documentKind": "Documentation"}
        ]}}"#;
        let hits = decode_search(docs).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, HitKind::Solution);
        assert_eq!(hits[0].uri.as_deref(), Some("https://kb/123"));
        assert_eq!(hits[1].title, "Tuning guide");
        assert_eq!(hits[1].kind, HitKind::Article);

        let bare = br#"[{"caseNumber": "C0001", "summary": "NVMe timeout", "type": "case"}]"#;
        let hits = decode_search(bare).unwrap();
        assert_eq!(hits[0].id, "C0001");
        assert_eq!(hits[0].kind, HitKind::Case);

        assert!(matches!(decode_search(b"42"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_disposition_filename() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"report.pdf\""),
        );
        assert_eq!(disposition_filename(&headers).as_deref(), Some("report.pdf"));
        assert_eq!(disposition_filename(&HeaderMap::new()), None);
    }
}

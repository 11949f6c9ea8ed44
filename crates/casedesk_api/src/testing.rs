//! In-memory [`CaseService`] for tests.
//!
//! Scripted data, per-case delays and failures, gates that hold a call
//! until released, call counters and a gauge of concurrent calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::error::{ApiError, ApiResult};
use crate::filter::CaseFilter;
use crate::model::{Attachment, Case, CaseId, Comment, HitKind, ListPage, SearchHit};
use crate::service::{CaseService, Download};

/// Which per-case call a script entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Case,
    Comments,
    Attachments,
    Download,
}

#[derive(Default)]
struct Script {
    order: Vec<CaseId>,
    cases: HashMap<CaseId, Case>,
    comments: HashMap<CaseId, Vec<Comment>>,
    attachments: HashMap<CaseId, Vec<Attachment>>,
    content: HashMap<(CaseId, String), Vec<u8>>,
    delays: HashMap<CaseId, Duration>,
    list_delay: Duration,
    failures: HashMap<(CaseId, Call), ApiError>,
    list_failures: VecDeque<ApiError>,
    gates: HashMap<CaseId, Arc<Semaphore>>,
    calls: HashMap<(Call, CaseId), usize>,
    list_calls: Vec<(usize, usize)>,
    reported_total: Option<usize>,
    page_overlap: usize,
    search_hits: Vec<SearchHit>,
}

/// Scripted case service. Configure through `&self`, then share in an `Arc`.
#[derive(Default)]
pub struct ScriptedCaseService {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a ScriptedCaseService);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedCaseService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` cases with ids `C0001`, `C0002`, ... and one comment each.
    pub fn with_case_count(count: usize) -> Self {
        let service = Self::new();
        for n in 1..=count {
            let id = format!("C{:04}", n);
            service.add_case(Case {
                id: CaseId::new(&id),
                summary: format!("Case {}", n),
                status: "Open".to_string(),
                severity: "3 (Normal)".to_string(),
                ..Default::default()
            });
            service.add_comment(
                &CaseId::new(&id),
                Comment {
                    id: format!("{}-c1", id),
                    author: "support".to_string(),
                    text: format!("First response on {}", id),
                    public: true,
                    ..Default::default()
                },
            );
        }
        service
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn id(n: usize) -> CaseId {
        CaseId::new(format!("C{:04}", n))
    }

    pub fn add_case(&self, case: Case) {
        let mut script = self.lock();
        if !script.cases.contains_key(&case.id) {
            script.order.push(case.id.clone());
        }
        script.cases.insert(case.id.clone(), case);
    }

    pub fn add_comment(&self, id: &CaseId, comment: Comment) {
        self.lock()
            .comments
            .entry(id.clone())
            .or_default()
            .push(comment);
    }

    pub fn add_attachment(&self, id: &CaseId, attachment: Attachment, content: Vec<u8>) {
        let mut script = self.lock();
        script
            .content
            .insert((id.clone(), attachment.id.clone()), content);
        script
            .attachments
            .entry(id.clone())
            .or_default()
            .push(attachment);
    }

    /// Every per-case call for `id` sleeps for `delay` first.
    pub fn set_delay(&self, id: &CaseId, delay: Duration) {
        self.lock().delays.insert(id.clone(), delay);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.lock().list_delay = delay;
    }

    /// Fail every `call` for `id` with `error`.
    pub fn fail(&self, id: &CaseId, call: Call, error: ApiError) {
        self.lock().failures.insert((id.clone(), call), error);
    }

    pub fn clear_failure(&self, id: &CaseId, call: Call) {
        self.lock().failures.remove(&(id.clone(), call));
    }

    /// Fail the next list call only.
    pub fn fail_next_list(&self, error: ApiError) {
        self.lock().list_failures.push_back(error);
    }

    /// Report this total instead of the real count (server-side growth).
    pub fn set_reported_total(&self, total: usize) {
        self.lock().reported_total = Some(total);
    }

    /// Hold `get_case` for `id` until [`open_gate`](Self::open_gate).
    /// Pages after the first start `rows` early, repeating the tail of the
    /// previous page the way a shifting result set does.
    pub fn set_page_overlap(&self, rows: usize) {
        self.lock().page_overlap = rows;
    }

    /// Knowledge-base hit returned by `search` after matching cases.
    pub fn add_search_hit(&self, hit: SearchHit) {
        self.lock().search_hits.push(hit);
    }

    pub fn gate(&self, id: &CaseId) {
        self.lock()
            .gates
            .insert(id.clone(), Arc::new(Semaphore::new(0)));
    }

    pub fn open_gate(&self, id: &CaseId) {
        if let Some(gate) = self.lock().gates.remove(id) {
            gate.close();
        }
    }

    pub fn calls(&self, call: Call, id: &CaseId) -> usize {
        self.lock()
            .calls
            .get(&(call, id.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self, call: Call) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|((kind, _), _)| *kind == call)
            .map(|(_, count)| *count)
            .sum()
    }

    /// `(offset, limit)` of every list call, in call order.
    pub fn list_calls(&self) -> Vec<(usize, usize)> {
        self.lock().list_calls.clone()
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }

    /// Count the call, then wait out its delay and gate.
    async fn begin(&self, call: Call, id: &CaseId) -> ApiResult<()> {
        let (delay, gate, failure) = {
            let mut script = self.lock();
            *script.calls.entry((call, id.clone())).or_default() += 1;
            let gate = if call == Call::Case {
                script.gates.get(id).cloned()
            } else {
                None
            };
            (
                script.delays.get(id).copied().unwrap_or_default(),
                gate,
                script.failures.get(&(id.clone(), call)).cloned(),
            )
        };
        if let Some(gate) = gate {
            // Closed means open.
            let _ = gate.acquire().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn contains_text(case: &Case, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    case.summary.to_lowercase().contains(&needle)
        || case.description.to_lowercase().contains(&needle)
}

fn matches_filter(filter: &CaseFilter, case: &Case) -> bool {
    (filter.statuses.is_empty() || filter.statuses.contains(&case.status))
        && (filter.accounts.is_empty() || filter.accounts.contains(&case.account_number))
        && filter
            .keyword
            .as_deref()
            .map_or(true, |keyword| contains_text(case, keyword))
}

fn not_found(what: &str, id: &CaseId) -> ApiError {
    ApiError::Status {
        code: 404,
        message: format!("{} {} not found", what, id),
    }
}

#[async_trait]
impl CaseService for ScriptedCaseService {
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        offset: usize,
        limit: usize,
    ) -> ApiResult<ListPage> {
        let _guard = self.enter();
        let (delay, failure) = {
            let mut script = self.lock();
            script.list_calls.push((offset, limit));
            (script.list_delay, script.list_failures.pop_front())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let script = self.lock();
        let matching: Vec<&Case> = script
            .order
            .iter()
            .filter_map(|id| script.cases.get(id))
            .filter(|case| matches_filter(filter, case))
            .collect();
        let start = if offset > 0 {
            offset.saturating_sub(script.page_overlap)
        } else {
            0
        };
        let items = matching
            .iter()
            .skip(start)
            .take(limit)
            .map(|case| (*case).clone())
            .collect();
        Ok(ListPage {
            items,
            offset,
            total: script.reported_total.unwrap_or(matching.len()),
        })
    }

    async fn get_case(&self, id: &CaseId) -> ApiResult<Case> {
        let _guard = self.enter();
        self.begin(Call::Case, id).await?;
        self.lock()
            .cases
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("case", id))
    }

    async fn get_comments(&self, id: &CaseId) -> ApiResult<Vec<Comment>> {
        let _guard = self.enter();
        self.begin(Call::Comments, id).await?;
        Ok(self.lock().comments.get(id).cloned().unwrap_or_default())
    }

    async fn get_attachments(&self, id: &CaseId) -> ApiResult<Vec<Attachment>> {
        let _guard = self.enter();
        self.begin(Call::Attachments, id).await?;
        Ok(self.lock().attachments.get(id).cloned().unwrap_or_default())
    }

    async fn download_attachment(
        &self,
        id: &CaseId,
        attachment_id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ApiResult<Download> {
        let _guard = self.enter();
        self.begin(Call::Download, id).await?;
        let content = self
            .lock()
            .content
            .get(&(id.clone(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| not_found("attachment", id))?;
        sink.write_all(&content)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        sink.flush()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Download {
            bytes: content.len() as u64,
            filename: None,
        })
    }

    async fn search(&self, query: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
        let _guard = self.enter();
        let script = self.lock();
        let cases = script
            .order
            .iter()
            .filter_map(|id| script.cases.get(id))
            .filter(|case| contains_text(case, query))
            .map(|case| SearchHit {
                kind: HitKind::Case,
                id: case.id.to_string(),
                title: case.summary.clone(),
                snippet: None,
                uri: None,
            });
        Ok(cases
            .chain(script.search_hits.iter().cloned())
            .take(limit)
            .collect())
    }
}

//! Bulk export engine.
//!
//! Each case id becomes one task: fetch case, comments and attachments,
//! format, then write (or buffer, in combined mode). At most `concurrency`
//! tasks run at once. Results are folded into a slot table by the
//! coordinating loop alone, one completion at a time, and the manifest is
//! written once when every task is terminal.

use casedesk_api::{
    assemble_bundle, with_deadline, ApiResult, Attachment, CaseBundle, CaseFilter, CaseId,
    CaseService,
};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::format::{short_id, Formatter};
use crate::manifest::{Manifest, ManifestEntry, ManifestError};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::task::{TaskError, TaskStage};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_ATTACHMENTS_DIR: &str = "attachments";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Run-level failures. Per-case failures never end up here.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot create output directory {path}: {source}")]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write manifest: {0}")]
    Manifest(#[from] ManifestError),
}

/// Summary error for a run where some cases failed.
#[derive(Debug, Clone, Error)]
#[error("{failed} of {total} cases failed to export (first: {case}: {message})")]
pub struct PartialExportError {
    pub failed: usize,
    pub total: usize,
    pub case: CaseId,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Combined-mode target; defaults to `<output_dir>/all-cases.<ext>`.
    pub output_file: Option<PathBuf>,
    pub include_attachments: bool,
    pub attachments_dir: String,
    pub combined: bool,
    pub concurrency: usize,
    /// Deadline for each metadata call. Downloads are bounded only by
    /// cancellation.
    pub request_timeout: Option<Duration>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./exports"),
            output_file: None,
            include_attachments: false,
            attachments_dir: DEFAULT_ATTACHMENTS_DIR.to_string(),
            combined: false,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub combined_path: Option<PathBuf>,
    pub cancelled: bool,
    /// Progress events discarded because the consumer lagged.
    pub dropped_progress: usize,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.manifest.total_cases
    }

    pub fn succeeded(&self) -> usize {
        self.manifest.cases.len()
    }

    pub fn failed(&self) -> usize {
        self.manifest.failures.len()
    }

    /// Every requested case failed. An empty run is not a failure.
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "exported {} of {}; see {}",
            self.succeeded(),
            self.total(),
            self.manifest_path.display()
        )
    }

    pub fn partial_error(&self) -> Option<PartialExportError> {
        let first = self.manifest.failures.first()?;
        Some(PartialExportError {
            failed: self.failed(),
            total: self.total(),
            case: first.case_id.clone(),
            message: first.error.clone(),
        })
    }
}

/// Successful task output.
enum TaskOutput {
    Written(ManifestEntry),
    /// Combined mode: the document waits for the single final write.
    Buffered(ManifestEntry, String),
}

type Slot = Option<Result<TaskOutput, TaskError>>;

struct TaskContext {
    service: Arc<dyn CaseService>,
    formatter: Arc<Formatter>,
    options: ExportOptions,
    reporter: Arc<ProgressReporter>,
    cancel: CancelToken,
}

impl TaskContext {
    /// Stop here if cancellation was requested; `stage` is where we stopped.
    fn checkpoint(&self, stage: TaskStage) -> Result<(), TaskError> {
        if self.cancel.is_cancelled() {
            Err(TaskError::Cancelled(stage))
        } else {
            Ok(())
        }
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        match self.options.request_timeout {
            Some(after) => with_deadline(after, operation, fut).await,
            None => fut.await,
        }
    }
}

pub struct ExportEngine {
    service: Arc<dyn CaseService>,
    formatter: Arc<Formatter>,
    options: ExportOptions,
}

impl ExportEngine {
    pub fn new(
        service: Arc<dyn CaseService>,
        formatter: Formatter,
        mut options: ExportOptions,
    ) -> Self {
        if options.concurrency == 0 {
            warn!("Export concurrency of 0 requested; using 1");
            options.concurrency = 1;
        }
        if options.attachments_dir.trim().is_empty() {
            options.attachments_dir = DEFAULT_ATTACHMENTS_DIR.to_string();
        }
        Self {
            service,
            formatter: Arc::new(formatter),
            options,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export `ids`. Per-case failures are recorded in the manifest; only
    /// run-level problems return `Err`.
    pub async fn run(
        &self,
        ids: Vec<CaseId>,
        filters: Option<CaseFilter>,
        progress: Option<mpsc::Sender<ProgressEvent>>,
        cancel: CancelToken,
    ) -> Result<ExportReport, ExportError> {
        let ids = dedup_ids(ids);
        let total = ids.len();
        let options = &self.options;
        // Stamped with the run's start time.
        let mut manifest = Manifest::new(total, filters);

        tokio::fs::create_dir_all(&options.output_dir)
            .await
            .map_err(|source| ExportError::CreateOutput {
                path: options.output_dir.clone(),
                source,
            })?;

        info!(
            cases = total,
            concurrency = options.concurrency,
            combined = options.combined,
            attachments = options.include_attachments,
            format = %self.formatter.format(),
            output = %options.output_dir.display(),
            "Starting export"
        );

        let reporter = Arc::new(ProgressReporter::new(progress, total));
        let context = Arc::new(TaskContext {
            service: self.service.clone(),
            formatter: self.formatter.clone(),
            options: options.clone(),
            reporter: reporter.clone(),
            cancel: cancel.clone(),
        });

        let mut slots: Vec<Slot> = (0..total).map(|_| None).collect();
        let mut spawned = vec![false; total];
        let mut queue = ids.iter().cloned().enumerate();
        let mut running: JoinSet<(usize, Result<TaskOutput, TaskError>)> = JoinSet::new();

        loop {
            while running.len() < options.concurrency && !cancel.is_cancelled() {
                let Some((index, id)) = queue.next() else {
                    break;
                };
                spawned[index] = true;
                let context = context.clone();
                running.spawn(async move {
                    let result = export_case(&context, &id).await;
                    (index, result)
                });
            }

            match running.join_next().await {
                Some(Ok((index, result))) => {
                    let id = &ids[index];
                    match &result {
                        Ok(_) => reporter.task_finished(id.as_str(), "done"),
                        Err(err) if err.is_cancelled() => {
                            reporter.task_finished(id.as_str(), "cancelled")
                        }
                        Err(err) => {
                            warn!(case = %id, error = %err, "Case export failed");
                            reporter.task_finished(id.as_str(), "failed");
                        }
                    }
                    slots[index] = Some(result);
                }
                Some(Err(join_err)) => {
                    // Resolved below: spawned but never reported.
                    warn!(error = %join_err, "Export task aborted");
                }
                None => break,
            }
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            info!("Export cancelled; unstarted cases are recorded as cancelled");
        }
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let (err, outcome) = if spawned[index] {
                (
                    TaskError::Crashed("task ended without a result".to_string()),
                    "failed",
                )
            } else {
                (TaskError::Cancelled(TaskStage::Pending), "cancelled")
            };
            reporter.task_finished(ids[index].as_str(), outcome);
            *slot = Some(Err(err));
        }

        let combined_path = if options.combined {
            self.finish_combined(&ids, slots, &mut manifest).await
        } else {
            for (id, slot) in ids.iter().zip(slots) {
                match slot {
                    Some(Ok(TaskOutput::Written(entry)))
                    | Some(Ok(TaskOutput::Buffered(entry, _))) => manifest.record_success(entry),
                    Some(Err(err)) => manifest.record_failure(id.clone(), &err),
                    None => {}
                }
            }
            None
        };

        let manifest_path = manifest.save(&options.output_dir)?;
        info!(
            succeeded = manifest.cases.len(),
            failed = manifest.failures.len(),
            cancelled,
            dropped_progress = reporter.dropped(),
            manifest = %manifest_path.display(),
            "Export finished"
        );

        Ok(ExportReport {
            manifest,
            manifest_path,
            combined_path,
            cancelled,
            dropped_progress: reporter.dropped(),
        })
    }

    /// Concatenate buffered documents in input order and write them once.
    ///
    /// After cancellation the document holds the cases that finished
    /// before it. If the write fails every buffered case becomes a write
    /// failure.
    async fn finish_combined(
        &self,
        ids: &[CaseId],
        slots: Vec<Slot>,
        manifest: &mut Manifest,
    ) -> Option<PathBuf> {
        let path = self.combined_path();
        let file = relative_to(&path, &self.options.output_dir);

        let mut entries = Vec::new();
        let mut documents = Vec::new();
        for (id, slot) in ids.iter().zip(slots) {
            match slot {
                Some(Ok(TaskOutput::Buffered(mut entry, document))) => {
                    entry.file = file.clone();
                    entries.push(entry);
                    documents.push(document);
                }
                Some(Ok(TaskOutput::Written(entry))) => manifest.record_success(entry),
                Some(Err(err)) => manifest.record_failure(id.clone(), &err),
                None => {}
            }
        }
        if entries.is_empty() {
            return None;
        }

        let content = self.formatter.combine(&documents);
        match write_document(&path, &content).await {
            Ok(()) => {
                info!(path = %path.display(), cases = entries.len(), "Wrote combined export");
                for entry in entries {
                    manifest.record_success(entry);
                }
                Some(path)
            }
            Err(message) => {
                warn!(path = %path.display(), error = %message, "Combined write failed");
                let err = TaskError::Write(message);
                for entry in entries {
                    manifest.record_failure(entry.case_id, &err);
                }
                None
            }
        }
    }

    fn combined_path(&self) -> PathBuf {
        match &self.options.output_file {
            Some(path) => path.clone(),
            None => self
                .options
                .output_dir
                .join(self.formatter.combined_file_name()),
        }
    }
}

/// One case, start to finish. Checks for cancellation between steps.
async fn export_case(ctx: &TaskContext, id: &CaseId) -> Result<TaskOutput, TaskError> {
    let label = id.as_str();
    let service = ctx.service.as_ref();
    ctx.checkpoint(TaskStage::Pending)?;

    ctx.reporter.step(label, "fetching case");
    let case = ctx
        .call("get case", service.get_case(id))
        .await
        .map_err(TaskError::Fetch)?;
    ctx.reporter.step(label, "fetched case");
    ctx.checkpoint(TaskStage::Fetching)?;

    ctx.reporter.step(label, "fetching comments");
    let comments = ctx.call("get comments", service.get_comments(id)).await;
    if let Err(err) = &comments {
        warn!(case = %id, error = %err, "Exporting without comments");
    }
    ctx.reporter.step(label, "fetched comments");
    ctx.checkpoint(TaskStage::Fetching)?;

    ctx.reporter.step(label, "fetching attachments");
    let attachments = ctx
        .call("get attachments", service.get_attachments(id))
        .await;
    if let Err(err) = &attachments {
        warn!(case = %id, error = %err, "Exporting without attachment list");
    }
    ctx.reporter.step(label, "fetched attachments");
    ctx.checkpoint(TaskStage::Fetching)?;

    let bundle = assemble_bundle(case, comments, attachments);
    ctx.reporter.step(label, "formatting");
    let document = ctx.formatter.render(&bundle).map_err(TaskError::Format)?;
    ctx.reporter.step(label, "formatted");
    let mut entry = ManifestEntry {
        case_id: id.clone(),
        summary: bundle.case.summary.clone(),
        file: String::new(),
        attachment_count: bundle.attachments.len(),
        attachments_downloaded: 0,
        missing: bundle
            .gaps
            .iter()
            .map(|gap| gap.part.as_str().to_string())
            .collect(),
    };
    if ctx.options.combined {
        return Ok(TaskOutput::Buffered(entry, document));
    }
    ctx.checkpoint(TaskStage::Formatting)?;

    ctx.reporter.step(label, "writing");
    let dir_name = sanitize_component(id.as_str());
    let case_dir = ctx.options.output_dir.join(&dir_name);
    let file_name = ctx.formatter.case_file_name();
    write_document(&case_dir.join(&file_name), &document)
        .await
        .map_err(TaskError::Write)?;
    ctx.reporter.step(label, "written");
    entry.file = format!("{}/{}", dir_name, file_name);
    debug!(case = %id, file = %entry.file, "Case written");

    if ctx.options.include_attachments && !bundle.attachments.is_empty() {
        entry.attachments_downloaded = download_attachments(ctx, &bundle, &case_dir).await;
    }
    Ok(TaskOutput::Written(entry))
}

/// Best effort: failures are logged and leave the count short.
async fn download_attachments(ctx: &TaskContext, bundle: &CaseBundle, case_dir: &Path) -> usize {
    let id = bundle.id();
    let dir = case_dir.join(sanitize_component(&ctx.options.attachments_dir));
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        warn!(case = %id, dir = %dir.display(), error = %err, "Cannot create attachments directory");
        return 0;
    }

    let mut used = HashSet::new();
    let mut downloaded = 0;
    for attachment in &bundle.attachments {
        if ctx.cancel.is_cancelled() {
            debug!(case = %id, "Cancelled; skipping remaining attachments");
            break;
        }
        let name = attachment_file_name(attachment, &mut used);
        ctx.reporter
            .step(id.as_str(), &format!("downloading {}", name));
        match download_one(ctx, id, attachment, &dir.join(&name)).await {
            Ok(bytes) => {
                debug!(case = %id, file = %name, bytes, "Attachment downloaded");
                downloaded += 1;
            }
            Err(message) => {
                warn!(case = %id, file = %name, error = %message, "Attachment download failed");
            }
        }
    }
    downloaded
}

async fn download_one(
    ctx: &TaskContext,
    id: &CaseId,
    attachment: &Attachment,
    path: &Path,
) -> Result<u64, String> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| format!("create {}: {}", path.display(), e))?;
    match ctx
        .service
        .download_attachment(id, &attachment.id, &mut file)
        .await
    {
        Ok(download) => Ok(download.bytes),
        Err(err) => {
            drop(file);
            let _ = tokio::fs::remove_file(path).await;
            Err(err.to_string())
        }
    }
}

/// Sanitised, unique-within-the-case file name for an attachment.
fn attachment_file_name(attachment: &Attachment, used: &mut HashSet<String>) -> String {
    let base = if attachment.filename.trim().is_empty() {
        sanitize_component(&attachment.id)
    } else {
        sanitize_component(&attachment.filename)
    };
    let name = if used.contains(&base) {
        format!("{}-{}", sanitize_component(&short_id(&attachment.id)), base)
    } else {
        base
    };
    used.insert(name.clone());
    name
}

async fn write_document(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("create {}: {}", parent.display(), e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| format!("write {}: {}", path.display(), e))
}

/// Make `raw` safe as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | ' ') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|ch| ch == '.' || ch == ' ');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Drop blanks and repeats, keeping first-seen order.
fn dedup_ids(ids: Vec<CaseId>) -> Vec<CaseId> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if id.is_empty() {
            warn!("Skipping empty case id");
            continue;
        }
        if seen.insert(id.clone()) {
            out.push(id);
        } else {
            debug!(case = %id, "Skipping duplicate case id");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("01234567"), "01234567");
        assert_eq!(sanitize_component("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("  "), "_");
        assert_eq!(sanitize_component("sos report.tar.xz"), "sos report.tar.xz");
    }

    #[test]
    fn test_attachment_names_are_unique() {
        let mut used = HashSet::new();
        let a = Attachment {
            id: "aaaaaaaa-1111-2222-3333".into(),
            filename: "log.txt".into(),
            ..Default::default()
        };
        let b = Attachment {
            id: "bbbbbbbb-1111-2222-3333".into(),
            filename: "log.txt".into(),
            ..Default::default()
        };
        let nameless = Attachment {
            id: "cafe".into(),
            ..Default::default()
        };
        assert_eq!(attachment_file_name(&a, &mut used), "log.txt");
        assert_eq!(attachment_file_name(&b, &mut used), "bbbbbbbb-log.txt");
        assert_eq!(attachment_file_name(&nameless, &mut used), "cafe");
    }

    #[test]
    fn test_dedup_ids_keeps_first_occurrence() {
        let ids = vec![
            CaseId::new("b"),
            CaseId::new("a"),
            CaseId::new("b"),
            CaseId::new(" "),
        ];
        assert_eq!(dedup_ids(ids), vec![CaseId::new("b"), CaseId::new("a")]);
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/tmp/out");
        assert_eq!(relative_to(&base.join("all-cases.md"), base), "all-cases.md");
        assert_eq!(relative_to(Path::new("/elsewhere/x.md"), base), "/elsewhere/x.md");
    }

    #[test]
    fn test_report_summary() {
        let mut manifest = Manifest::new(3, None);
        manifest.record_failure(CaseId::new("C2"), &TaskError::Write("disk full".into()));
        let report = ExportReport {
            manifest,
            manifest_path: PathBuf::from("out/export-manifest.json"),
            combined_path: None,
            cancelled: false,
            dropped_progress: 0,
        };
        assert_eq!(report.summary_line(), "exported 0 of 3; see out/export-manifest.json");
        assert!(report.all_failed());
        let err = report.partial_error().unwrap();
        assert_eq!(err.failed, 1);
        assert_eq!(err.case, CaseId::new("C2"));
    }
}

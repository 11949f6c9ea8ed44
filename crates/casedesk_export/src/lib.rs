//! Bulk export of cases to markdown or JSON files.

pub mod cancel;
pub mod engine;
pub mod format;
pub mod manifest;
pub mod progress;
pub mod selection;
pub mod task;

pub use cancel::CancelToken;
pub use engine::{
    sanitize_component, ExportEngine, ExportError, ExportOptions, ExportReport,
    PartialExportError, DEFAULT_ATTACHMENTS_DIR, DEFAULT_CONCURRENCY,
};
pub use format::{format_size, format_time, ExportFormat, FormatError, Formatter};
pub use manifest::{Manifest, ManifestEntry, ManifestError, ManifestFailure, MANIFEST_FILE};
pub use progress::{progress_channel, ProgressEvent, ProgressReporter};
pub use selection::{collect_case_ids, DEFAULT_PAGE_SIZE};
pub use task::{TaskError, TaskStage};

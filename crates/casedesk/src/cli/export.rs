//! `casedesk export`: bulk export with a progress bar.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use casedesk::config::Config;
use casedesk_api::{CaseFilter, CaseId, CaseService};
use casedesk_export::{
    collect_case_ids, progress_channel, CancelToken, ExportEngine, ExportFormat, ExportOptions,
    ExportReport, Formatter,
};
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::cli::context::AppContext;
use crate::cli::error::HelpfulError;
use crate::cli::filter::FilterArgs;
use crate::cli::output::{print_table, truncate};

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub target: ExportTarget,
}

#[derive(Debug, Subcommand)]
pub enum ExportTarget {
    /// Export the named cases
    Case {
        /// Case numbers
        #[arg(required = true)]
        ids: Vec<String>,

        #[command(flatten)]
        options: ExportFlags,
    },
    /// Export every case matching a preset and/or filter flags
    Cases {
        /// Preset slot (0-9)
        preset: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        options: ExportFlags,
    },
}

/// Output settings; anything unset comes from `[export]` in the config.
#[derive(Debug, Clone, Default, Args)]
pub struct ExportFlags {
    /// Output directory
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Write all cases into one document
    #[arg(long)]
    pub combined: bool,

    /// Combined document path [default: <output-dir>/all-cases.<ext>]
    #[arg(long, requires = "combined")]
    pub output_file: Option<PathBuf>,

    /// Download attachments next to each case
    #[arg(short = 'a', long)]
    pub attachments: bool,

    /// Cases exported in parallel
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Document format: markdown or json
    #[arg(long)]
    pub format: Option<ExportFormat>,

    /// Custom markdown template file
    #[arg(long)]
    pub template: Option<PathBuf>,
}

/// Build an engine from config overlaid with `flags`.
pub fn build_engine(
    config: &Config,
    service: Arc<dyn CaseService>,
    flags: &ExportFlags,
) -> Result<ExportEngine> {
    let format = flags.format.unwrap_or(config.export.format);
    let template = flags
        .template
        .clone()
        .or_else(|| config.export.template.clone());
    let formatter = match &template {
        Some(path) => Formatter::from_template_file(format, path)
            .with_context(|| format!("Failed to load template {}", path.display()))?,
        None => Formatter::new(format).context("Failed to prepare formatter")?,
    };

    let options = ExportOptions {
        output_dir: flags
            .output_dir
            .clone()
            .unwrap_or_else(|| config.export.output_dir.clone()),
        output_file: flags.output_file.clone(),
        include_attachments: flags.attachments,
        attachments_dir: config.export.attachments_dir.clone(),
        combined: flags.combined,
        concurrency: flags.concurrency.unwrap_or(config.export.concurrency),
        ..Default::default()
    };
    Ok(ExportEngine::new(service, formatter, options))
}

pub async fn run(args: ExportArgs, ctx: &AppContext) -> Result<()> {
    let http = ctx.service()?;
    let service: Arc<dyn CaseService> = http;

    let (ids, filters, flags) = match args.target {
        ExportTarget::Case { ids, options } => {
            let ids: Vec<CaseId> = ids.iter().map(CaseId::new).collect();
            (ids, None, options)
        }
        ExportTarget::Cases {
            preset,
            filter,
            options,
        } => {
            let filter = ctx.filter(preset.as_deref(), &filter)?;
            let ids = select_cases(ctx, service.as_ref(), &filter).await?;
            (ids, Some(filter), options)
        }
    };

    let engine = build_engine(&ctx.config, Arc::clone(&service), &flags)?;
    info!(
        cases = ids.len(),
        output = %engine.options().output_dir.display(),
        "Starting export"
    );
    let report = run_with_progress(&engine, ids, filters, ctx.config.export.progress_capacity)
        .await
        .context("Export failed")?;

    print_report(&report);
    if report.all_failed() {
        let mut err = HelpfulError::new(format!("None of {} cases exported", report.total()))
            .with_suggestion(format!(
                "TRY: Inspect failures in {}",
                report.manifest_path.display()
            ));
        if let Some(partial) = report.partial_error() {
            err = err.with_context(partial.to_string());
        }
        return Err(err.into());
    }
    Ok(())
}

async fn select_cases(
    ctx: &AppContext,
    service: &dyn CaseService,
    filter: &CaseFilter,
) -> Result<Vec<CaseId>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Selecting cases: {}", filter.describe()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = collect_case_ids(service, filter, ctx.config.page_size()).await;
    spinner.finish_and_clear();

    let ids = result.map_err(|err| ctx.explain(err))?;
    println!("Selected {} cases ({})", ids.len(), filter.describe());
    Ok(ids)
}

async fn run_with_progress(
    engine: &ExportEngine,
    ids: Vec<CaseId>,
    filters: Option<CaseFilter>,
    capacity: usize,
) -> Result<ExportReport, casedesk_export::ExportError> {
    let bar = ProgressBar::new(ids.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let (tx, mut rx) = progress_channel(capacity);
    let drawer = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bar.set_length(event.total_tasks as u64);
                bar.set_position(event.completed_tasks as u64);
                bar.set_message(format!("{} {}", event.current_task, event.current_step));
            }
        })
    };

    let cancel = CancelToken::new();
    let on_interrupt = {
        let cancel = cancel.clone();
        let bar = bar.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && cancel.cancel() {
                bar.println("Cancelling: running cases finish their current step...");
            }
        })
    };

    let result = engine.run(ids, filters, Some(tx), cancel).await;
    on_interrupt.abort();
    let _ = drawer.await;
    bar.finish_and_clear();
    result
}

fn print_report(report: &ExportReport) {
    if report.cancelled {
        println!("Export cancelled.");
    }
    if let Some(path) = &report.combined_path {
        println!("Combined document: {}", path.display());
    }
    if !report.manifest.failures.is_empty() {
        let rows = report
            .manifest
            .failures
            .iter()
            .map(|failure| {
                vec![
                    failure.case_id.to_string(),
                    failure.stage.to_string(),
                    truncate(&failure.error, 80),
                ]
            })
            .collect();
        print_table(&["CASE", "STAGE", "ERROR"], rows);
    }
    let partial: Vec<String> = report
        .manifest
        .cases
        .iter()
        .filter(|entry| !entry.missing.is_empty())
        .map(|entry| format!("{} (missing {})", entry.case_id, entry.missing.join(", ")))
        .collect();
    if !partial.is_empty() {
        println!("Exported with gaps: {}", partial.join("; "));
    }
    if report.dropped_progress > 0 {
        debug!(dropped = report.dropped_progress, "Progress events dropped");
    }
    println!("{}", report.summary_line());
}

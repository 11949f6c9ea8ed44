//! `casedesk show`: fetch one case and print it as markdown or JSON.

use anyhow::{Context, Result};
use casedesk_api::{fetch_bundle, with_deadline, CaseId};
use casedesk_export::{ExportFormat, Formatter};
use clap::Args;

use crate::cli::context::AppContext;
use crate::cli::error::HelpfulError;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Case number
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ShowArgs, ctx: &AppContext) -> Result<()> {
    let id = CaseId::new(&args.id);
    if id.is_empty() {
        return Err(HelpfulError::new("Case number is empty")
            .with_suggestion("TRY: casedesk show 01234567")
            .into());
    }
    let service = ctx.service()?;

    let bundle = with_deadline(
        ctx.config.interactive_timeout(),
        "fetch case",
        fetch_bundle(service.as_ref(), &id),
    )
    .await
    .map_err(|err| ctx.explain(err))?;

    for gap in &bundle.gaps {
        eprintln!(
            "WARNING: {} unavailable for {}: {}",
            gap.part.as_str(),
            id,
            gap.reason
        );
    }

    let formatter = if args.json {
        Formatter::new(ExportFormat::Json)
    } else {
        match &ctx.config.export.template {
            Some(path) => Formatter::from_template_file(ExportFormat::Markdown, path),
            None => Formatter::new(ExportFormat::Markdown),
        }
    }
    .context("Failed to prepare formatter")?;

    let document = formatter
        .render(&bundle)
        .with_context(|| format!("Failed to render case {}", id))?;
    println!("{}", document);
    Ok(())
}

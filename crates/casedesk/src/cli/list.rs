//! `casedesk list`: one page of cases as a table or JSON.

use anyhow::Result;
use casedesk_api::{with_deadline, CaseService};
use casedesk_export::format_time;
use clap::Args;

use crate::cli::context::AppContext;
use crate::cli::filter::FilterArgs;
use crate::cli::output::{print_table, truncate};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Start from a configured preset slot (0-9)
    #[arg(long)]
    pub preset: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Rows to fetch
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Rows to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ListArgs, ctx: &AppContext) -> Result<()> {
    let service = ctx.service()?;
    let filter = ctx.filter(args.preset.as_deref(), &args.filter)?;
    let limit = args.limit.max(1);

    let page = with_deadline(
        ctx.config.interactive_timeout(),
        "list cases",
        service.list_cases(&filter, args.offset, limit),
    )
    .await
    .map_err(|err| ctx.explain(err))?;

    if args.json {
        let output = serde_json::json!({
            "filter": filter,
            "offset": page.offset,
            "total": page.total,
            "cases": page.items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No cases match {}", filter.describe());
        return Ok(());
    }

    let first = page.offset + 1;
    let last = page.offset + page.items.len();
    let rows = page
        .items
        .iter()
        .map(|case| {
            vec![
                case.id.to_string(),
                case.severity.clone(),
                case.status.clone(),
                truncate(&case.product_line(), 24),
                format_time(case.last_modified),
                truncate(&case.summary, 60),
            ]
        })
        .collect();
    print_table(
        &["CASE", "SEVERITY", "STATUS", "PRODUCT", "MODIFIED", "SUMMARY"],
        rows,
    );
    println!();
    println!(
        "Showing {}-{} of {} ({})",
        first,
        last,
        page.total,
        filter.describe()
    );
    if last < page.total {
        println!("Next page: --offset {}", last);
    }
    Ok(())
}

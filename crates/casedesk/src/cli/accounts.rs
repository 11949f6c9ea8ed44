//! `casedesk accounts`: the accounts visible through accessible cases.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use casedesk_api::{with_deadline, ApiResult, CaseFilter, CaseService};
use clap::Args;
use tracing::debug;

use crate::cli::context::AppContext;
use crate::cli::output::print_table;

#[derive(Debug, Args)]
pub struct AccountsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AccountsArgs, ctx: &AppContext) -> Result<()> {
    let service = ctx.service()?;
    let accounts = collect_accounts(
        service.as_ref(),
        ctx.config.page_size(),
        ctx.config.interactive_timeout(),
    )
    .await
    .map_err(|err| ctx.explain(err))?;

    if args.json {
        let list: Vec<_> = accounts
            .iter()
            .map(|(number, name)| serde_json::json!({ "number": number, "name": name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts found in accessible cases.");
        return Ok(());
    }
    let count = accounts.len();
    let rows = accounts
        .into_iter()
        .map(|(number, name)| vec![number, if name.is_empty() { "-".to_string() } else { name }])
        .collect();
    print_table(&["ACCOUNT NUMBER", "ACCOUNT NAME"], rows);
    println!();
    println!("Found {} account(s). Filter cases with: casedesk list --account <number>", count);
    Ok(())
}

/// Account number to name across every case, closed ones included.
/// Each page gets its own deadline.
pub async fn collect_accounts(
    service: &dyn CaseService,
    page_size: usize,
    per_page: Duration,
) -> ApiResult<BTreeMap<String, String>> {
    let filter = CaseFilter {
        include_closed: true,
        ..Default::default()
    };
    let page_size = page_size.max(1);
    let mut accounts: BTreeMap<String, String> = BTreeMap::new();
    let mut offset = 0;

    loop {
        let page = with_deadline(
            per_page,
            "list cases",
            service.list_cases(&filter, offset, page_size),
        )
        .await?;
        let received = page.items.len();
        for case in page.items {
            if case.account_number.is_empty() {
                continue;
            }
            let name = accounts.entry(case.account_number).or_default();
            if name.is_empty() {
                *name = case.account_name;
            }
        }
        offset += received;
        debug!(offset, total = page.total, accounts = accounts.len(), "Scanned cases for accounts");
        if received < page_size || offset >= page.total {
            break;
        }
    }
    Ok(accounts)
}

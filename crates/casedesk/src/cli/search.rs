//! `casedesk search`: free-text search across cases and the knowledge base.

use anyhow::{bail, Result};
use casedesk_api::{with_deadline, CaseService, HitKind, SearchHit};
use clap::Args;

use crate::cli::context::AppContext;
use crate::cli::output::truncate;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Words to search for
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Maximum results
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SearchArgs, ctx: &AppContext) -> Result<()> {
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("Search query is empty");
    }
    let service = ctx.service()?;
    let hits = with_deadline(
        ctx.config.interactive_timeout(),
        "search",
        service.search(&query, args.limit.max(1)),
    )
    .await
    .map_err(|err| ctx.explain(err))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print!("{}", render_hits(&query, &hits));
    }
    Ok(())
}

fn heading(kind: HitKind) -> (&'static str, &'static str) {
    match kind {
        HitKind::Case => ("CASES", "[C]"),
        HitKind::Solution => ("SOLUTIONS", "[S]"),
        HitKind::Article => ("ARTICLES", "[A]"),
    }
}

/// Hits grouped by kind, cases first, each group in ranking order.
fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.\n".to_string();
    }
    let mut out = format!("Found {} results for '{}':\n", hits.len(), query);
    for kind in [HitKind::Case, HitKind::Solution, HitKind::Article] {
        let group: Vec<&SearchHit> = hits.iter().filter(|h| h.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        let (title, prefix) = heading(kind);
        out.push_str(&format!("\n{}\n", title));
        for hit in group {
            out.push_str(&format!("  {} {}  {}\n", prefix, hit.id, truncate(&hit.title, 60)));
            if let Some(uri) = &hit.uri {
                out.push_str(&format!("      {}\n", uri));
            }
        }
    }
    out
}

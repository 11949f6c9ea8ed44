//! `casedesk config`: resolved paths and effective settings.

use casedesk::config::casedesk_home;
use casedesk_logging::logs_dir;
use clap::Args;

use crate::cli::context::AppContext;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the config command - shows paths and effective settings
pub fn run(args: ConfigArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let home = casedesk_home();
    let logs = logs_dir();
    let config = &ctx.config;
    let presets: Vec<(String, String)> = config
        .presets
        .keys()
        .filter_map(|slot| config.preset(slot).map(|f| (slot.clone(), f.describe())))
        .collect();
    let aliases: Vec<&str> = config.statuses.words().collect();

    if args.json {
        let output = serde_json::json!({
            "home": home.to_string_lossy(),
            "logs": logs.to_string_lossy(),
            "config_file": {
                "path": ctx.config_path.to_string_lossy(),
                "exists": ctx.config_path.exists(),
            },
            "api": {
                "base_url": ctx.base_url,
                "base_url_source": ctx.base_url_source.as_str(),
                "token": ctx.token_source.as_str(),
                "timeout_secs": config.interactive_timeout().as_secs(),
            },
            "ui": config.ui,
            "export": config.export,
            "presets": presets
                .iter()
                .map(|(slot, desc)| (slot.clone(), serde_json::Value::String(desc.clone())))
                .collect::<serde_json::Map<_, _>>(),
            "status_aliases": aliases,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("CASEDESK CONFIGURATION");
    println!("======================");
    println!();
    println!("Home:     {}", home.display());
    println!("Logs:     {}", logs.display());
    println!(
        "Config:   {} ({})",
        ctx.config_path.display(),
        if ctx.config_path.exists() { "exists" } else { "not found, using defaults" }
    );
    println!();
    println!(
        "Service:  {} [{}]",
        ctx.base_url.as_deref().unwrap_or("(not set)"),
        ctx.base_url_source.as_str()
    );
    println!("Token:    {}", ctx.token_source.as_str());
    println!("Timeout:  {}s", config.interactive_timeout().as_secs());
    println!();
    println!(
        "Browse:   page size {}, debounce {}ms",
        config.page_size(),
        config.ui.debounce_ms
    );
    println!(
        "Export:   {} ({}, concurrency {}, attachments in '{}')",
        config.export.output_dir.display(),
        config.export.format,
        config.export.concurrency,
        config.export.attachments_dir
    );
    if let Some(template) = &config.export.template {
        println!("Template: {}", template.display());
    }
    println!();
    if presets.is_empty() {
        println!("Presets:  none");
    } else {
        println!("Presets:");
        for (slot, desc) in &presets {
            println!("  {}  {}", slot, desc);
        }
    }
    if !aliases.is_empty() {
        println!("Status words: {}", aliases.join(", "));
    }
    Ok(())
}

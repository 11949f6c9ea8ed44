//! casedesk: browse and export support cases from the terminal.
//!
//! Running without a subcommand opens the TUI.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use casedesk_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::accounts::AccountsArgs;
use crate::cli::config::ConfigArgs;
use crate::cli::context::{AppContext, GlobalArgs};
use crate::cli::error::HelpfulError;
use crate::cli::export::ExportArgs;
use crate::cli::list::ListArgs;
use crate::cli::search::SearchArgs;
use crate::cli::show::ShowArgs;
use crate::cli::tui::TuiArgs;

#[derive(Parser, Debug)]
#[command(name = "casedesk", version, about = "Browse and export support cases")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive case browser (default)
    Tui(TuiArgs),
    /// List cases matching a preset or filter flags
    List(ListArgs),
    /// Show one case with comments and attachments
    Show(ShowArgs),
    /// Search cases, solutions and articles
    Search(SearchArgs),
    /// List accounts seen on accessible cases
    Accounts(AccountsArgs),
    /// Export cases to markdown or JSON files
    Export(ExportArgs),
    /// Show resolved configuration
    Config(ConfigArgs),
}

async fn dispatch(command: Commands, ctx: AppContext) -> Result<()> {
    match command {
        Commands::Tui(args) => cli::tui::run(args, &ctx).await,
        Commands::List(args) => cli::list::run(args, &ctx).await,
        Commands::Show(args) => cli::show::run(args, &ctx).await,
        Commands::Search(args) => cli::search::run(args, &ctx).await,
        Commands::Accounts(args) => cli::accounts::run(args, &ctx).await,
        Commands::Export(args) => cli::export::run(args, &ctx).await,
        Commands::Config(args) => cli::config::run(args, &ctx),
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Commands::Tui(TuiArgs::default()));
    let ctx = AppContext::load(&cli.global)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(dispatch(command, ctx))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The TUI owns the terminal; console logs would corrupt it.
    let tui_mode = matches!(cli.command, None | Some(Commands::Tui(_)));
    match init_logging(LogConfig {
        app_name: "casedesk",
        verbose: cli.verbose,
        tui_mode,
        log_dir: None,
    }) {
        Ok(path) => debug!(log = %path.display(), "Logging initialized"),
        Err(err) => eprintln!("Warning: failed to initialize logging: {}", err),
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<HelpfulError>() {
                Some(helpful) => eprintln!("{}", helpful),
                None => eprintln!("{:?}", err),
            }
            ExitCode::from(1)
        }
    }
}

//! Terminal user interface: browse cases, read details, start exports.

pub mod app;
pub mod dialog;
pub mod event;
pub mod ui;

use std::io::stdout;
use std::sync::Arc;

use anyhow::Result;
use casedesk_api::CaseService;
use clap::Args;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, prelude::*, Terminal};
use tracing::info;

use crate::cli::context::AppContext;
use crate::cli::filter::FilterArgs;
use crate::cli::tui::app::App;
use crate::cli::tui::event::{Event, EventHandler};

/// TUI command arguments
#[derive(Debug, Clone, Default, Args)]
pub struct TuiArgs {
    /// Start with the preset in this slot (0-9)
    #[arg(long)]
    pub preset: Option<String>,
}

/// Run the TUI
pub async fn run(args: TuiArgs, ctx: &AppContext) -> Result<()> {
    // Connection problems surface before the screen is taken over.
    let http = ctx.service()?;
    let service: Arc<dyn CaseService> = http;
    let filter = ctx.filter(args.preset.as_deref(), &FilterArgs::default())?;
    let label = match &args.preset {
        Some(slot) => format!("preset {}: {}", slot, filter.describe()),
        None => filter.describe(),
    };
    info!(filter = %label, "Starting TUI");

    let mut app = App::new(ctx.config.clone(), service, filter, label);
    let mut events = EventHandler::new(ctx.config.tick_rate());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Run the application loop
async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut EventHandler,
) -> Result<()> {
    while app.running {
        // Header, borders, table header and footer take six rows.
        let size = terminal.size()?;
        app.viewport = size.height.saturating_sub(6).max(1) as usize;

        terminal.draw(|frame| ui::draw(frame, app))?;

        match events.next().await {
            Event::Key(key) => app.handle_key(key),
            Event::Tick => app.tick(),
            Event::Resize(_, _) => {} // Ratatui handles resize
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tui::app::DetailTab;
    use casedesk::config::Config;
    use casedesk_api::testing::ScriptedCaseService;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;

    fn test_app(cases: usize) -> App {
        let config = Config::default();
        let filter = config.base_filter();
        App::new(
            config,
            Arc::new(ScriptedCaseService::with_case_count(cases)),
            filter,
            "all cases".to_string(),
        )
    }

    fn render(app: &App) -> String {
        let backend = TestBackend::new(100, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| ui::draw(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    async fn settle(app: &mut App) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
            app.tick();
        }
    }

    #[tokio::test]
    async fn test_renders_before_data_arrives() {
        let app = test_app(3);
        let screen = render(&app);
        assert!(screen.contains("Loading cases"));
        assert!(screen.contains("all cases"));
    }

    #[tokio::test]
    async fn test_renders_loaded_rows() {
        let mut app = test_app(3);
        settle(&mut app).await;
        let screen = render(&app);
        assert!(screen.contains("C0001"));
        assert!(screen.contains("C0003"));
        assert!(screen.contains("Overview"));
    }

    #[tokio::test]
    async fn test_tab_cycles_detail_views() {
        let mut app = test_app(1);
        assert_eq!(app.tab, DetailTab::Overview);
        for expected in [DetailTab::Comments, DetailTab::Attachments, DetailTab::Overview] {
            app.handle_key(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE));
            assert_eq!(app.tab, expected);
        }
    }

    #[tokio::test]
    async fn test_error_status_is_rendered() {
        let mut app = test_app(1);
        app.handle_key(KeyEvent::new(KeyCode::Char('7'), KeyModifiers::NONE));
        let screen = render(&app);
        assert!(screen.contains("No preset in slot 7"));
    }

    #[tokio::test]
    async fn test_overlays_are_drawn_over_the_list() {
        let mut app = test_app(3);
        settle(&mut app).await;

        app.handle_key(KeyEvent::new(KeyCode::Char('?'), KeyModifiers::NONE));
        let screen = render(&app);
        assert!(screen.contains("Keys"));
        assert!(screen.contains("Toggle this help"));
        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));

        app.handle_key(KeyEvent::new(KeyCode::Char('f'), KeyModifiers::NONE));
        let screen = render(&app);
        assert!(screen.contains("Filter"));
        assert!(screen.contains("Include closed"));
        assert!(screen.contains("[ ]"));
        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));

        app.handle_key(KeyEvent::new(KeyCode::Char('/'), KeyModifiers::NONE));
        app.handle_key(KeyEvent::new(KeyCode::Char('z'), KeyModifiers::NONE));
        let screen = render(&app);
        assert!(screen.contains("Search"));
        assert!(screen.contains("z_"));
    }

    #[tokio::test]
    async fn test_run_app_stops_on_quit() {
        let mut app = test_app(1);
        app.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let mut events = EventHandler::new(std::time::Duration::from_millis(10));
        // The loop exits before polling the terminal.
        run_app(&mut terminal, &mut app, &mut events).await.unwrap();
        assert!(!app.running);
    }
}

//! Terminal input for the browser loop: key presses, resizes, and a tick
//! whenever nothing arrives within the tick interval.

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    /// Nothing arrived within the tick interval.
    Tick,
    Resize(u16, u16),
}

/// Maps a raw terminal event onto what the app reacts to. Key releases
/// (reported on Windows) and mouse or focus events become ticks.
fn translate(raw: CrosstermEvent) -> Event {
    match raw {
        CrosstermEvent::Key(key) if key.kind != KeyEventKind::Release => Event::Key(key),
        CrosstermEvent::Resize(w, h) => Event::Resize(w, h),
        _ => Event::Tick,
    }
}

/// Polls the terminal, at most one tick interval per call.
pub struct EventHandler {
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self { tick_rate }
    }

    /// Waits up to one tick for input. Read errors count as a tick.
    pub async fn next(&self) -> Event {
        // Terminal polling blocks; keep it off the async workers.
        let tick_rate = self.tick_rate;

        tokio::task::spawn_blocking(move || match event::poll(tick_rate) {
            Ok(true) => event::read().map(translate).unwrap_or(Event::Tick),
            _ => Event::Tick,
        })
        .await
        .unwrap_or(Event::Tick)
    }
}

//! Raw mode and the alternate screen for the dashboard's lifetime

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use nodekeeper_core::{NodeError, Result};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

fn step_failed(step: &'static str) -> impl FnOnce(io::Error) -> NodeError {
    move |e| NodeError::Dashboard(format!("terminal {}: {}", step, e))
}

/// Switch stdout to the full-screen dashboard
pub fn init() -> Result<Tui> {
    enable_raw_mode().map_err(step_failed("raw mode"))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(step_failed("alternate screen"))?;
    Terminal::new(CrosstermBackend::new(stdout)).map_err(step_failed("backend"))
}

/// Give the shell its screen back
pub fn restore() -> Result<()> {
    execute!(io::stdout(), LeaveAlternateScreen).map_err(step_failed("main screen"))?;
    disable_raw_mode().map_err(step_failed("cooked mode"))
}

/// Held by the composition root so shutdown messages printed after the
/// dashboard ends, including after a panic, land on a usable terminal.
#[derive(Default)]
pub struct TerminalGuard {
    restored: bool,
}

impl TerminalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore now; later calls and the drop do nothing
    pub fn restore(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.restored, true) {
            return Ok(());
        }
        restore()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(error = %e, "Terminal left in dashboard mode");
        }
    }
}

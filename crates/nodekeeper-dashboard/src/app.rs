//! Dashboard application state and input handling

use crate::layout::DashboardLayout;
use crate::widgets::LogHighlighter;
use crate::DashboardState;
use nodekeeper_core::{InstanceRole, Result, ShutdownRequester};
use ratatui::layout::Rect;
use std::sync::Arc;
use tracing::{info, warn};

/// What ending the dashboard means for this instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitAction {
    /// The primary: the supervisor stops the clients, then the process exits
    RequestSupervisedShutdown,
    /// A secondary: only this process ends, the clients keep running
    ExitLocal,
}

pub fn quit_action(role: InstanceRole) -> QuitAction {
    match role {
        InstanceRole::Primary => QuitAction::RequestSupervisedShutdown,
        InstanceRole::Secondary => QuitAction::ExitLocal,
    }
}

pub struct App {
    pub state: DashboardState,
    pub layout: DashboardLayout,
    pub highlighter: LogHighlighter,
    requester: Option<Arc<dyn ShutdownRequester>>,
    shutdown_requested: bool,
    pub should_quit: bool,
}

impl App {
    /// `requester` is only consulted on a primary
    pub fn new(
        state: DashboardState,
        area: Rect,
        requester: Option<Arc<dyn ShutdownRequester>>,
    ) -> Result<Self> {
        Ok(Self {
            state,
            layout: DashboardLayout::for_area(area),
            highlighter: LogHighlighter::new()?,
            requester,
            shutdown_requested: false,
            should_quit: false,
        })
    }

    /// Handle the quit key
    ///
    /// A primary asks the supervisor to shut down (once); a secondary never
    /// signals anything. Either way the dashboard stops.
    pub fn on_quit(&mut self) -> QuitAction {
        let action = quit_action(self.state.role);
        if action == QuitAction::RequestSupervisedShutdown && !self.shutdown_requested {
            self.shutdown_requested = true;
            match &self.requester {
                Some(requester) => {
                    info!("Quit key pressed, requesting supervised shutdown");
                    if let Err(e) = requester.request_shutdown("quit key") {
                        warn!("Failed to request supervised shutdown: {}", e);
                    }
                }
                None => warn!("Quit on primary without a shutdown requester"),
            }
        }
        self.should_quit = true;
        action
    }

    /// Repair region geometry for a new terminal size
    pub fn on_resize(&mut self, area: Rect) -> bool {
        self.layout.resize(area)
    }
}

//! # nodekeeper-dashboard
//!
//! Terminal dashboard for a supervised execution/consensus client pair.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ NODEKEEPER  Clients running  Geth + Lighthouse       [q]uit  │
//! ├───────────────────────────────────────────────┬──────────────┤
//! │ Geth                                          │ Sync Progress│
//! │ INFO Imported new potential chain segment ... │ HEADERS      │
//! │                                               │ [████  ] 71% │
//! ├───────────────────────────────────────────────┼──────────────┤
//! │ Lighthouse                                    │ Peer Count   │
//! │ INFO Synced slot: 912 peers: 57 ...           │ GETH All     │
//! │                                               │ [██    ] 42  │
//! └───────────────────────────────────────────────┴──────────────┘
//! ```
//!
//! The same dashboard runs on the primary and on secondaries; only the
//! meaning of the quit key differs (see [`QuitAction`]).

mod app;
mod event;
mod layout;
mod log_source;
mod run;
mod state;
pub mod terminal;
mod ui;
mod widgets;

pub use app::{quit_action, App, QuitAction};
pub use event::{is_quit_event, AppEvent, EventSource};
pub use layout::{DashboardLayout, Region};
pub use log_source::{strip_ansi, LogCursor, LogLocator};
pub use run::{run, Dashboard, DashboardContext, RunIntervals, LOG_BACKLOG_BYTES};
pub use state::{DashboardState, PRIMARY_HEADER, SECONDARY_HEADER};
pub use ui::draw;
pub use widgets::{
    HeaderWidget, LogHighlighter, LogPanelWidget, PeerGaugeWidget, SyncGaugeWidget,
    PEER_GAUGE_MAX,
};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::DashboardState;
    use nodekeeper_core::{ClientKind, ClientPair, InstanceRole};
    use ratatui::buffer::Buffer;

    pub fn state() -> DashboardState {
        let clients = ClientPair::new(ClientKind::Geth, ClientKind::Lighthouse).unwrap();
        DashboardState::new(clients, InstanceRole::Primary, 100)
    }

    /// Buffer contents, one string per row
    pub fn buffer_text(buf: &Buffer) -> Vec<String> {
        let area = buf.area;
        (area.y..area.bottom())
            .map(|y| {
                (area.x..area.right())
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect()
            })
            .collect()
    }
}

//! Dashboard widgets
//!
//! Each widget renders one layout region from [`crate::DashboardState`].

use ratatui::{prelude::*, text::Span};

mod header;
mod log_panel;
mod peer_gauge;
mod sync_gauge;

pub use header::HeaderWidget;
pub use log_panel::{LogHighlighter, LogPanelWidget};
pub use peer_gauge::{PeerGaugeWidget, PEER_GAUGE_MAX};
pub use sync_gauge::SyncGaugeWidget;

/// Number of filled cells for `fraction` of `width`, rounded down
pub fn filled_cells(width: u16, fraction: f64) -> u16 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (f64::from(width) * fraction).floor() as u16
}

/// One gauge row: `[bar] value`, the bar taking what the value leaves
pub fn bar_line(width: u16, fraction: f64, value: &str, color: Color) -> Line<'static> {
    let reserved = value.chars().count() as u16 + 3;
    let bar_width = width.saturating_sub(reserved);
    let filled = filled_cells(bar_width, fraction);
    let empty = bar_width - filled;
    let style = Style::default().fg(color);

    Line::from(vec![
        Span::styled("[", style),
        Span::styled("█".repeat(filled as usize), style),
        Span::styled(" ".repeat(empty as usize), style),
        Span::styled(format!("] {}", value), style.bold()),
    ])
}

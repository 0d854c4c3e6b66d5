//! Peer count gauge
//!
//! Four rows: execution all/background, consensus all/background. Bars are
//! scaled to a fixed ceiling; a count that could not be collected shows as 0.

use crate::DashboardState;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

use super::bar_line;

/// Peer count at which a bar is full
pub const PEER_GAUGE_MAX: u32 = 130;

pub struct PeerGaugeWidget;

impl PeerGaugeWidget {
    pub fn render(state: &DashboardState, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Peer Count ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);

        let names = Self::gauge_names(state);
        let colors = [Color::Cyan, Color::Cyan, Color::Green, Color::Green];
        let width = inner.width;

        let mut lines = Vec::with_capacity(8);
        for ((name, count), color) in names
            .iter()
            .zip(state.snapshot.peer_counts())
            .zip(colors)
        {
            let shown = count.unwrap_or(0);
            let fraction = f64::from(shown.min(PEER_GAUGE_MAX)) / f64::from(PEER_GAUGE_MAX);
            lines.push(Line::styled(name.clone(), Style::default().fg(color)));
            lines.push(bar_line(width, fraction, &shown.to_string(), color));
        }

        Paragraph::new(lines).render(inner, buf);
    }

    fn gauge_names(state: &DashboardState) -> [String; 4] {
        let execution = state.clients.execution.as_str().to_uppercase();
        let consensus = state.clients.consensus.as_str().to_uppercase();
        [
            format!("{} All", execution),
            format!("{} BG", execution),
            format!("{} All", consensus),
            format!("{} BG", consensus),
        ]
    }
}

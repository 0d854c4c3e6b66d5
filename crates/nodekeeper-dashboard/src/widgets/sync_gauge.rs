//! Sync stage gauge for the execution client

use crate::DashboardState;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

use super::bar_line;

pub struct SyncGaugeWidget;

impl SyncGaugeWidget {
    pub fn render(state: &DashboardState, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(format!(" Sync Progress ({}) ", state.clients.execution.label()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);

        let names = state.stage_names();
        if names.is_empty() {
            buf.set_string(
                inner.x,
                inner.y,
                "No sync stages",
                Style::default().fg(Color::DarkGray),
            );
            return;
        }

        let mut lines = Vec::with_capacity(names.len() * 2);
        for (index, name) in names.iter().enumerate() {
            // Stages not reported yet count as not started
            let fraction = state.snapshot.sync_stages.get(index).copied().unwrap_or(0.0);
            lines.push(Line::styled(*name, Style::default().fg(Color::White)));
            lines.push(bar_line(
                inner.width,
                fraction,
                &Self::percent(fraction),
                Color::Cyan,
            ));
        }

        Paragraph::new(lines).render(inner, buf);
    }

    /// Whole percent, rounded down so 99.9% never shows as done
    pub fn percent(fraction: f64) -> String {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        format!("{}%", (fraction * 100.0).floor() as u32)
    }
}

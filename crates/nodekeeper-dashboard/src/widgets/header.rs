//! Header bar: instance status, client pair and key hints

use crate::DashboardState;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

pub struct HeaderWidget;

impl HeaderWidget {
    pub fn render(state: &DashboardState, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner = block.inner(area);
        block.render(area, buf);

        let updated = state
            .last_updated
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());

        let status = Line::from(vec![
            Span::styled(
                "NODEKEEPER",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                state.header_message.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!(
                    "{} + {}",
                    state.clients.execution.label(),
                    state.clients.consensus.label()
                ),
                Style::default().fg(Color::White),
            ),
            Span::raw("  "),
            Span::styled(format!("updated {}", updated), Style::default().fg(Color::Gray)),
        ]);

        let keys = Line::from(vec![
            Span::styled("[q]", Style::default().fg(Color::Yellow)),
            Span::raw("uit"),
        ])
        .alignment(Alignment::Right);

        Paragraph::new(vec![status, keys]).render(inner, buf);
    }
}

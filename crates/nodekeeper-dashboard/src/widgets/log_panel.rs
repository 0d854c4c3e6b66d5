//! Streaming log panel with keyword highlighting

use crate::DashboardState;
use nodekeeper_core::{ClientRole, NodeError, Result};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use regex::Regex;

/// Styles log lines for display
///
/// Level words and a few status words are colored, `key=` keys are green,
/// ` label: ` labels are blue, and long space runs collapse to two spaces.
pub struct LogHighlighter {
    words: Vec<(Regex, Style)>,
    assignment_key: Regex,
    label: Regex,
    spaces: Regex,
}

impl LogHighlighter {
    pub fn new() -> Result<Self> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let words = [
            ("INFO", bold.fg(Color::Green)),
            ("WARN", bold.fg(Color::Yellow)),
            ("ERROR", bold.fg(Color::Red)),
            ("updated", bold.fg(Color::Yellow)),
            ("latestProcessedSlot", bold.fg(Color::Green)),
        ]
        .into_iter()
        .map(|(word, style)| Ok((compile(word)?, style)))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            words,
            assignment_key: compile(r"\b(\w+)=")?,
            label: compile(r"\s(\w+:)\s")?,
            spaces: compile(r"\s{3,}")?,
        })
    }

    pub fn highlight(&self, raw: &str) -> Line<'static> {
        let line = self.spaces.replace_all(raw, "  ").into_owned();
        let bold = Style::default().add_modifier(Modifier::BOLD);

        // Candidate (start, end, style) ranges, earlier rules win on overlap
        let mut ranges: Vec<(usize, usize, Style)> = Vec::new();
        for (pattern, style) in &self.words {
            for m in pattern.find_iter(&line) {
                ranges.push((m.start(), m.end(), *style));
            }
        }
        for caps in self.assignment_key.captures_iter(&line) {
            if let Some(key) = caps.get(1) {
                ranges.push((key.start(), key.end(), bold.fg(Color::Green)));
            }
        }
        for caps in self.label.captures_iter(&line) {
            if let Some(label) = caps.get(1) {
                ranges.push((label.start(), label.end(), bold.fg(Color::Blue)));
            }
        }

        let mut accepted: Vec<(usize, usize, Style)> = Vec::new();
        for range in ranges {
            if accepted.iter().all(|a| range.1 <= a.0 || range.0 >= a.1) {
                accepted.push(range);
            }
        }
        accepted.sort_by_key(|r| r.0);

        let mut spans = Vec::with_capacity(accepted.len() * 2 + 1);
        let mut pos = 0;
        for (start, end, style) in accepted {
            if start > pos {
                spans.push(Span::raw(line[pos..start].to_string()));
            }
            spans.push(Span::styled(line[start..end].to_string(), style));
            pos = end;
        }
        if pos < line.len() {
            spans.push(Span::raw(line[pos..].to_string()));
        }

        Line::from(spans)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| NodeError::Dashboard(format!("Invalid highlight pattern {}: {}", pattern, e)))
}

pub struct LogPanelWidget;

impl LogPanelWidget {
    /// Render the newest lines of one client's log that fit in `area`
    pub fn render(
        state: &DashboardState,
        role: ClientRole,
        highlighter: &LogHighlighter,
        area: Rect,
        buf: &mut Buffer,
    ) {
        let color = match role {
            ClientRole::Execution => Color::Cyan,
            ClientRole::Consensus => Color::Green,
        };
        let block = Block::default()
            .title(format!(" {} ", state.kind(role).label()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color));

        let inner = block.inner(area);
        block.render(area, buf);

        let log = state.log(role);
        if log.is_empty() {
            buf.set_string(
                inner.x,
                inner.y,
                "Waiting for log output...",
                Style::default().fg(Color::DarkGray),
            );
            return;
        }

        let visible = inner.height as usize;
        let lines: Vec<Line> = log
            .iter()
            .skip(log.len().saturating_sub(visible))
            .map(|line| highlighter.highlight(line))
            .collect();

        Paragraph::new(lines).render(inner, buf);
    }
}

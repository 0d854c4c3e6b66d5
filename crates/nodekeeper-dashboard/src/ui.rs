//! Frame rendering
//!
//! Each layout region is drawn by its widget; geometry comes from the
//! repaired [`DashboardLayout`](crate::layout::DashboardLayout).

use crate::{
    app::App,
    layout::Region,
    widgets::{HeaderWidget, LogPanelWidget, PeerGaugeWidget, SyncGaugeWidget},
};
use nodekeeper_core::ClientRole;
use ratatui::{prelude::*, Frame};

/// Draw the whole dashboard
pub fn draw(frame: &mut Frame, app: &mut App) {
    // Resize events can race the draw; trust the frame's area
    app.on_resize(frame.area());

    let app = &*app;
    for region in Region::ALL {
        let rect = app.layout.rect(region);
        frame.render_widget(RegionView { region, app }, rect);
    }
}

/// One region of the dashboard bound to the state it shows
struct RegionView<'a> {
    region: Region,
    app: &'a App,
}

impl Widget for RegionView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = &self.app.state;
        match self.region {
            Region::Header => HeaderWidget::render(state, area, buf),
            Region::ExecutionLog => LogPanelWidget::render(
                state,
                ClientRole::Execution,
                &self.app.highlighter,
                area,
                buf,
            ),
            Region::ConsensusLog => LogPanelWidget::render(
                state,
                ClientRole::Consensus,
                &self.app.highlighter,
                area,
                buf,
            ),
            Region::StageGauge => SyncGaugeWidget::render(state, area, buf),
            Region::PeerGauge => PeerGaugeWidget::render(state, area, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{buffer_text, state};
    use nodekeeper_metrics::MetricsSnapshot;
    use ratatui::backend::TestBackend;

    #[test]
    fn test_draw_fills_every_region() {
        let mut app = App::new(state(), Rect::new(0, 0, 120, 36), None).unwrap();
        app.state.push_log_line(ClientRole::Execution, "INFO Imported block".into());
        app.state.apply_snapshot(MetricsSnapshot {
            execution_peers_total: Some(25),
            sync_stages: vec![1.0, 0.3, 0.0],
            ..Default::default()
        });

        let mut terminal = Terminal::new(TestBackend::new(120, 36)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();
        let text = buffer_text(terminal.backend().buffer()).join("\n");

        assert!(text.contains("NODEKEEPER"));
        assert!(text.contains("INFO Imported block"));
        assert!(text.contains("Waiting for log output"));
        assert!(text.contains("Sync Progress (Geth)"));
        assert!(text.contains("] 30%"));
        assert!(text.contains("GETH All"));
        assert!(text.contains("] 25"));
    }

    #[test]
    fn test_draw_follows_terminal_size() {
        let mut app = App::new(state(), Rect::new(0, 0, 80, 24), None).unwrap();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();
        assert_eq!(app.layout.area(), Rect::new(0, 0, 100, 30));
    }
}

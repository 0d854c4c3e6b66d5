//! Dashboard geometry
//!
//! Regions are placed on a 9x9 grid. Integer cell sizes leave leftover
//! columns and rows at the right and bottom, so after placement every
//! region is stretched to meet its right and lower neighbours or the
//! screen edge. The result tiles the screen with no gaps or overlaps.

use ratatui::layout::Rect;

const GRID_ROWS: u16 = 9;
const GRID_COLS: u16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Header,
    ExecutionLog,
    ConsensusLog,
    StageGauge,
    PeerGauge,
}

/// Grid placement: row, column, row span, column span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridCell {
    row: u16,
    col: u16,
    rows: u16,
    cols: u16,
}

impl GridCell {
    fn row_end(&self) -> u16 {
        self.row + self.rows
    }

    fn col_end(&self) -> u16 {
        self.col + self.cols
    }

    fn shares_rows(&self, other: &GridCell) -> bool {
        self.row < other.row_end() && other.row < self.row_end()
    }

    fn shares_cols(&self, other: &GridCell) -> bool {
        self.col < other.col_end() && other.col < self.col_end()
    }
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Header,
        Region::ExecutionLog,
        Region::ConsensusLog,
        Region::StageGauge,
        Region::PeerGauge,
    ];

    fn grid(&self) -> GridCell {
        let (row, col, rows, cols) = match self {
            Region::Header => (0, 0, 1, 9),
            Region::ExecutionLog => (1, 0, 4, 7),
            Region::ConsensusLog => (5, 0, 4, 7),
            Region::StageGauge => (1, 7, 4, 2),
            Region::PeerGauge => (5, 7, 4, 2),
        };
        GridCell {
            row,
            col,
            rows,
            cols,
        }
    }
}

/// Screen rectangle of every region for one terminal size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardLayout {
    area: Rect,
    rects: [Rect; 5],
}

impl DashboardLayout {
    pub fn for_area(area: Rect) -> Self {
        let mut layout = Self {
            area,
            rects: [Rect::default(); 5],
        };
        layout.place();
        layout.repair();
        layout
    }

    /// Terminal area this layout was computed for
    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn rect(&self, region: Region) -> Rect {
        self.rects[Self::index(region)]
    }

    /// Recompute for a new terminal size; returns whether anything moved
    pub fn resize(&mut self, area: Rect) -> bool {
        if area == self.area {
            return false;
        }
        *self = Self::for_area(area);
        true
    }

    fn index(region: Region) -> usize {
        match region {
            Region::Header => 0,
            Region::ExecutionLog => 1,
            Region::ConsensusLog => 2,
            Region::StageGauge => 3,
            Region::PeerGauge => 4,
        }
    }

    fn place(&mut self) {
        let cell_width = self.area.width / GRID_COLS;
        let cell_height = self.area.height / GRID_ROWS;

        for region in Region::ALL {
            let cell = region.grid();
            self.rects[Self::index(region)] = Rect::new(
                self.area.x + cell.col * cell_width,
                self.area.y + cell.row * cell_height,
                cell.cols * cell_width,
                cell.rows * cell_height,
            );
        }
    }

    /// Stretch each region to the nearest region on its right (sharing a
    /// grid row) and below it (sharing a grid column), or to the screen edge
    fn repair(&mut self) {
        let placed = self.rects;
        let screen_right = self.area.right();
        let screen_bottom = self.area.bottom();

        for region in Region::ALL {
            let cell = region.grid();
            let rect = placed[Self::index(region)];

            let right = Region::ALL
                .iter()
                .filter(|other| {
                    let o = other.grid();
                    o.col >= cell.col_end() && o.shares_rows(&cell)
                })
                .map(|other| placed[Self::index(*other)].x)
                .min()
                .unwrap_or(screen_right);

            let bottom = Region::ALL
                .iter()
                .filter(|other| {
                    let o = other.grid();
                    o.row >= cell.row_end() && o.shares_cols(&cell)
                })
                .map(|other| placed[Self::index(*other)].y)
                .min()
                .unwrap_or(screen_bottom);

            self.rects[Self::index(region)] = Rect::new(
                rect.x,
                rect.y,
                right.saturating_sub(rect.x),
                bottom.saturating_sub(rect.y),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(area: Rect) {
        let layout = DashboardLayout::for_area(area);
        let rects: Vec<Rect> = Region::ALL.iter().map(|r| layout.rect(*r)).collect();

        let covered: u32 = rects.iter().map(|r| r.width as u32 * r.height as u32).sum();
        assert_eq!(
            covered,
            area.width as u32 * area.height as u32,
            "gap in {:?}: {:?}",
            area,
            rects
        );

        for (i, a) in rects.iter().enumerate() {
            assert!(a.x >= area.x && a.right() <= area.right(), "{:?} escapes {:?}", a, area);
            assert!(a.y >= area.y && a.bottom() <= area.bottom(), "{:?} escapes {:?}", a, area);
            for b in rects.iter().skip(i + 1) {
                assert!(
                    a.intersection(*b).area() == 0,
                    "{:?} overlaps {:?} in {:?}",
                    a,
                    b,
                    area
                );
            }
        }
    }

    #[test]
    fn test_layout_tiles_common_sizes() {
        for (w, h) in [(80, 24), (120, 40), (81, 27), (200, 60), (100, 31)] {
            assert_tiles(Rect::new(0, 0, w, h));
        }
    }

    #[test]
    fn test_layout_tiles_every_small_size() {
        for w in 9..60 {
            for h in 9..40 {
                assert_tiles(Rect::new(0, 0, w, h));
            }
        }
    }

    #[test]
    fn test_layout_respects_offset() {
        assert_tiles(Rect::new(3, 2, 77, 23));
    }

    #[test]
    fn test_leftover_goes_to_right_and_bottom_regions() {
        // 85 / 9 = 9 wide cells, 4 columns left over; 23 / 9 = 2 high cells, 5 rows left over
        let layout = DashboardLayout::for_area(Rect::new(0, 0, 85, 23));

        assert_eq!(layout.rect(Region::Header), Rect::new(0, 0, 85, 2));
        assert_eq!(layout.rect(Region::ExecutionLog), Rect::new(0, 2, 63, 8));
        assert_eq!(layout.rect(Region::StageGauge), Rect::new(63, 2, 22, 8));
        assert_eq!(layout.rect(Region::ConsensusLog), Rect::new(0, 10, 63, 13));
        assert_eq!(layout.rect(Region::PeerGauge), Rect::new(63, 10, 22, 13));
    }

    #[test]
    fn test_resize_reports_change() {
        let mut layout = DashboardLayout::for_area(Rect::new(0, 0, 80, 24));
        assert!(!layout.resize(Rect::new(0, 0, 80, 24)));
        assert!(layout.resize(Rect::new(0, 0, 100, 30)));
        assert_eq!(layout.area(), Rect::new(0, 0, 100, 30));
        assert_eq!(layout.rect(Region::PeerGauge).right(), 100);
    }
}

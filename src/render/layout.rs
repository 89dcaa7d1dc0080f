//! Vertical page layout and current-page tracking
//!
//! Pages are stacked top to bottom with a fixed gap. The current page is the
//! one whose vertical midpoint is nearest the midpoint of the visible area.
//! Midpoints are strictly increasing, so the lookup is a binary search and is
//! cheap enough to run on every scroll event.

use serde::Serialize;

/// Gap between stacked pages, in CSS pixels
pub const PAGE_GAP: f32 = 16.0;

/// Placement of one page in the scroll container
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBox {
    pub top: f32,
    pub height: f32,
}

impl PageBox {
    pub fn midpoint(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Stacked page layout
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pages: Vec<PageBox>,
    total_height: f32,
}

impl PageLayout {
    /// Stack pages of the given heights separated by `gap`
    pub fn from_heights<I>(heights: I, gap: f32) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let mut pages = Vec::new();
        let mut top = 0.0_f32;

        for height in heights {
            let height = height.max(0.0);
            if !pages.is_empty() {
                top += gap;
            }
            pages.push(PageBox { top, height });
            top += height;
        }

        Self {
            pages,
            total_height: top,
        }
    }

    pub fn pages(&self) -> &[PageBox] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    /// 1-based page nearest the middle of the visible area, `None` when empty
    pub fn current_page(&self, scroll_top: f32, viewport_height: f32) -> Option<usize> {
        if self.pages.is_empty() {
            return None;
        }

        let target = scroll_top + viewport_height.max(0.0) / 2.0;
        let after = self.pages.partition_point(|page| page.midpoint() < target);

        let index = if after == 0 {
            0
        } else if after == self.pages.len() {
            after - 1
        } else {
            let below = target - self.pages[after - 1].midpoint();
            let above = self.pages[after].midpoint() - target;
            if below <= above {
                after - 1
            } else {
                after
            }
        };

        Some(index + 1)
    }

    /// Scroll offset that centers the given 1-based page in the viewport
    pub fn scroll_top_for(&self, page: usize, viewport_height: f32) -> Option<f32> {
        let index = page.checked_sub(1)?;
        let page = self.pages.get(index)?;
        Some((page.midpoint() - viewport_height / 2.0).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> PageLayout {
        // tops at 0, 116, 232
        PageLayout::from_heights([100.0, 100.0, 100.0], PAGE_GAP)
    }

    #[test]
    fn test_stacking_with_gap() {
        let layout = three_pages();
        let tops: Vec<f32> = layout.pages().iter().map(|p| p.top).collect();
        assert_eq!(tops, vec![0.0, 116.0, 232.0]);
        assert_eq!(layout.total_height(), 332.0);
    }

    #[test]
    fn test_current_page_at_page_midpoint() {
        let layout = three_pages();
        // viewport midpoint lands on page 2's midpoint (166)
        assert_eq!(layout.current_page(116.0, 100.0), Some(2));
        assert_eq!(layout.current_page(0.0, 100.0), Some(1));
        assert_eq!(layout.current_page(232.0, 100.0), Some(3));
    }

    #[test]
    fn test_current_page_clamps_past_ends() {
        let layout = three_pages();
        assert_eq!(layout.current_page(-500.0, 100.0), Some(1));
        assert_eq!(layout.current_page(10_000.0, 100.0), Some(3));
    }

    #[test]
    fn test_current_page_nearest_midpoint_wins() {
        let layout = three_pages();
        // target 100: page 1 mid 50 (distance 50), page 2 mid 166 (distance 66)
        assert_eq!(layout.current_page(50.0, 100.0), Some(1));
        // target 120: page 1 distance 70, page 2 distance 46
        assert_eq!(layout.current_page(70.0, 100.0), Some(2));
    }

    #[test]
    fn test_empty_layout() {
        let layout = PageLayout::default();
        assert_eq!(layout.current_page(0.0, 100.0), None);
        assert_eq!(layout.scroll_top_for(1, 100.0), None);
    }

    #[test]
    fn test_scroll_top_for_page() {
        let layout = three_pages();
        assert_eq!(layout.scroll_top_for(2, 100.0), Some(116.0));
        assert_eq!(layout.scroll_top_for(1, 400.0), Some(0.0));
        assert_eq!(layout.scroll_top_for(4, 100.0), None);
    }
}

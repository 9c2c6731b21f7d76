use crate::window::PixelWindow;
use log::debug;

/// Per-axis buffer in pixels, converted from a CRS distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPixels {
    pub x: usize,
    pub y: usize,
}

/// Actual expansion applied on each side after clamping to the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

/// Expand an inner window by the buffer on all four sides, clamped to
/// `[0, raster_width] x [0, raster_height]`.
pub fn outer_window(
    inner: &PixelWindow,
    buffer: BufferPixels,
    raster_width: usize,
    raster_height: usize,
) -> PixelWindow {
    let outer = PixelWindow::new(
        inner.x_min.saturating_sub(buffer.x),
        inner.y_min.saturating_sub(buffer.y),
        (inner.x_max + buffer.x).min(raster_width),
        (inner.y_max + buffer.y).min(raster_height),
    );

    let pad = padding(inner, &outer);
    debug!(
        "Buffered {} by {}x{} px -> {} (padding l={} r={} t={} b={})",
        inner, buffer.x, buffer.y, outer, pad.left, pad.right, pad.top, pad.bottom
    );
    outer
}

/// Padding between an inner window and its outer window (may be less than the
/// buffer at raster edges).
pub fn padding(inner: &PixelWindow, outer: &PixelWindow) -> Padding {
    Padding {
        left: inner.x_min - outer.x_min,
        right: outer.x_max - inner.x_max,
        top: inner.y_min - outer.y_min,
        bottom: outer.y_max - inner.y_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileGrid;

    #[test]
    fn test_interior_tile_full_buffer() {
        let inner = PixelWindow::new(500, 500, 1000, 1000);
        let outer = outer_window(&inner, BufferPixels { x: 5, y: 5 }, 2000, 2000);
        assert_eq!(outer, PixelWindow::new(495, 495, 1005, 1005));
        assert_eq!(outer.width(), inner.width() + 10);
        assert_eq!(outer.height(), inner.height() + 10);
    }

    #[test]
    fn test_clamped_at_raster_edges() {
        // Top-left tile of a 1000x1000 raster: cannot pad left/top
        let inner = PixelWindow::new(0, 0, 500, 500);
        let outer = outer_window(&inner, BufferPixels { x: 5, y: 5 }, 1000, 1000);
        assert_eq!(outer, PixelWindow::new(0, 0, 505, 505));
        let pad = padding(&inner, &outer);
        assert_eq!(pad.left, 0);
        assert_eq!(pad.top, 0);
        assert_eq!(pad.right, 5);
        assert_eq!(pad.bottom, 5);

        // Bottom-right tile: cannot pad right/bottom
        let inner = PixelWindow::new(500, 500, 1000, 1000);
        let outer = outer_window(&inner, BufferPixels { x: 5, y: 5 }, 1000, 1000);
        assert_eq!(outer, PixelWindow::new(495, 495, 1000, 1000));
    }

    #[test]
    fn test_per_axis_buffer() {
        let inner = PixelWindow::new(100, 100, 200, 200);
        let outer = outer_window(&inner, BufferPixels { x: 50, y: 10 }, 1000, 1000);
        assert_eq!(outer, PixelWindow::new(50, 90, 250, 210));
    }

    #[test]
    fn test_inner_within_outer_within_raster() {
        let grid = TileGrid::new(PixelWindow::new(3, 7, 997, 640), 128, 128);
        let buffer = BufferPixels { x: 16, y: 9 };
        for (_, _, inner) in grid.iter() {
            let outer = outer_window(&inner, buffer, 1000, 650);
            assert!(outer.contains(&inner));
            assert!(PixelWindow::full(1000, 650).contains(&outer));
        }
    }

    #[test]
    fn test_adjacent_outer_overlap_twice_buffer() {
        let grid = TileGrid::new(PixelWindow::full(1000, 1000), 512, 512);
        let buffer = BufferPixels { x: 5, y: 5 };
        let left = outer_window(&grid.inner_window(0, 0), buffer, 1000, 1000);
        let right = outer_window(&grid.inner_window(0, 1), buffer, 1000, 1000);
        let overlap = left.intersection(&right).unwrap();
        assert_eq!(overlap.width(), 10);
    }
}

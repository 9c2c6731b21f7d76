use crate::error::{Result, TilerError};
use crate::geotransform::GeoTransform;
use crate::window::PixelWindow;
use geo::Rect;
use log::debug;

// Pixel positions closer than this to an integer are treated as that integer
// before rounding outward.
const SNAP_TOLERANCE: f64 = 1e-6;

/// Pixel bounding box of an AOI extent, rounded outward to whole pixels and
/// clipped to the raster.
pub fn aoi_pixel_bbox(
    aoi_id: &str,
    extent: &Rect<f64>,
    gt: &GeoTransform,
    raster_width: usize,
    raster_height: usize,
) -> Result<PixelWindow> {
    let corners = [
        (extent.min().x, extent.min().y),
        (extent.min().x, extent.max().y),
        (extent.max().x, extent.min().y),
        (extent.max().x, extent.max().y),
    ];

    let mut row_min = f64::INFINITY;
    let mut row_max = f64::NEG_INFINITY;
    let mut col_min = f64::INFINITY;
    let mut col_max = f64::NEG_INFINITY;
    for &(x, y) in &corners {
        let (row, col) = gt.crs_to_pixel(x, y);
        row_min = row_min.min(row);
        row_max = row_max.max(row);
        col_min = col_min.min(col);
        col_max = col_max.max(col);
    }

    let (col_min, col_max) = (snap_floor(col_min), snap_ceil(col_max));
    let (row_min, row_max) = (snap_floor(row_min), snap_ceil(row_max));

    let width = raster_width as f64;
    let height = raster_height as f64;
    if !overlaps(col_min, col_max, width) || !overlaps(row_min, row_max, height) {
        return Err(TilerError::AoiOutsideRaster(aoi_id.to_string()));
    }

    let bbox = PixelWindow::new(
        col_min.clamp(0.0, width) as usize,
        row_min.clamp(0.0, height) as usize,
        col_max.clamp(0.0, width) as usize,
        row_max.clamp(0.0, height) as usize,
    );

    debug!(
        "AOI {}: pixel bbox {} (raster {}x{})",
        aoi_id, bbox, raster_width, raster_height
    );
    Ok(bbox)
}

// A degenerate interval counts when it lies strictly inside the raster.
fn overlaps(min: f64, max: f64, extent: f64) -> bool {
    if min == max {
        min > 0.0 && min < extent
    } else {
        max > 0.0 && min < extent
    }
}

fn snap_floor(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_TOLERANCE {
        r
    } else {
        v.floor()
    }
}

fn snap_ceil(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_TOLERANCE {
        r
    } else {
        v.ceil()
    }
}

/// Row/column partition of one AOI's pixel bounding box into inner tiles no
/// larger than the requested maximum.
#[derive(Debug, Clone)]
pub struct TileGrid {
    bbox: PixelWindow,
    pub rows: usize,
    pub cols: usize,
    pub tile_width: f64,
    pub tile_height: f64,
    pub total_tiles: usize,
}

impl TileGrid {
    pub fn new(bbox: PixelWindow, max_tile_width: usize, max_tile_height: usize) -> Self {
        debug_assert!(max_tile_width > 0 && max_tile_height > 0);

        let cols = bbox.width().div_ceil(max_tile_width).max(1);
        let rows = bbox.height().div_ceil(max_tile_height).max(1);
        let tile_width = bbox.width() as f64 / cols as f64;
        let tile_height = bbox.height() as f64 / rows as f64;
        let total_tiles = rows * cols;

        debug!(
            "TileGrid: bbox {}, max {}x{} -> {} rows x {} cols of {:.2}x{:.2} px ({} total)",
            bbox, max_tile_width, max_tile_height, rows, cols, tile_width, tile_height, total_tiles
        );

        Self {
            bbox,
            rows,
            cols,
            tile_width,
            tile_height,
            total_tiles,
        }
    }

    pub fn bbox(&self) -> PixelWindow {
        self.bbox
    }

    /// Left edge of column `col`; `col == cols` gives the right edge of the grid.
    pub fn col_boundary(&self, col: usize) -> usize {
        if col >= self.cols {
            return self.bbox.x_max;
        }
        self.bbox.x_min + (col as f64 * self.tile_width).round() as usize
    }

    /// Top edge of row `row`; `row == rows` gives the bottom edge of the grid.
    pub fn row_boundary(&self, row: usize) -> usize {
        if row >= self.rows {
            return self.bbox.y_max;
        }
        self.bbox.y_min + (row as f64 * self.tile_height).round() as usize
    }

    pub fn inner_window(&self, row: usize, col: usize) -> PixelWindow {
        PixelWindow::new(
            self.col_boundary(col),
            self.row_boundary(row),
            self.col_boundary(col + 1),
            self.row_boundary(row + 1),
        )
    }

    pub fn iter(&self) -> TileWindowIterator<'_> {
        TileWindowIterator::new(self)
    }
}

pub struct TileWindowIterator<'a> {
    grid: &'a TileGrid,
    current_idx: usize,
}

impl<'a> TileWindowIterator<'a> {
    fn new(grid: &'a TileGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for TileWindowIterator<'a> {
    /// (row, col, inner window)
    type Item = (usize, usize, PixelWindow);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_tiles {
            let row = self.current_idx / self.grid.cols;
            let col = self.current_idx % self.grid.cols;
            self.current_idx += 1;
            Some((row, col, self.grid.inner_window(row, col)))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total_tiles - self.current_idx;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for TileWindowIterator<'a> {}

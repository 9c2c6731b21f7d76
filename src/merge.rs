use crate::detection::{
    read_detection_file, to_geo_detection, DetectionShape, GeoDetection, TileFrame,
};
use crate::error::Result;
use crate::io::RasterReference;
use crate::layers::InnerTile;
use geo::{Contains, Intersects, MultiPolygon, Point};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// Fraction of a pixel the centroid is moved along +col and +row before the
/// containment test. Makes ownership half-open: left/top edges belong to a
/// tile, right/bottom edges to its neighbour. Tiles in the last column or row
/// have no neighbour there, so they are not nudged along that axis and own
/// their outer edge.
pub const OWNERSHIP_NUDGE_PX: f64 = 1e-3;

/// Whether a tile sits in the last column and/or last row of its AOI grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridEdges {
    pub last_col: bool,
    pub last_row: bool,
}

/// Centroid ownership test for one tile's inner region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ownership {
    nudge: (f64, f64),
    inclusive: bool,
}

impl Ownership {
    pub fn new(frame: &TileFrame, edges: GridEdges) -> Self {
        let gt = frame.geotransform.coeffs();
        let along_col = if edges.last_col { 0.0 } else { OWNERSHIP_NUDGE_PX };
        let along_row = if edges.last_row { 0.0 } else { OWNERSHIP_NUDGE_PX };
        Self {
            nudge: (
                gt[1] * along_col + gt[2] * along_row,
                gt[4] * along_col + gt[5] * along_row,
            ),
            inclusive: edges.last_col || edges.last_row,
        }
    }

    /// Does the inner region own a centroid?
    pub fn owns(&self, region: &MultiPolygon<f64>, centroid: &Point<f64>) -> bool {
        let probe = Point::new(centroid.x() + self.nudge.0, centroid.y() + self.nudge.1);
        if self.inclusive {
            region.intersects(&probe)
        } else {
            region.contains(&probe)
        }
    }
}

/// Keep detections whose centroid the inner region owns; returns the survivors
/// and the number discarded.
pub fn retain_owned(
    detections: Vec<GeoDetection>,
    region: &MultiPolygon<f64>,
    ownership: &Ownership,
) -> (Vec<GeoDetection>, usize) {
    let before = detections.len();
    let kept: Vec<GeoDetection> = detections
        .into_iter()
        .filter(|d| ownership.owns(region, &d.centroid))
        .collect();
    let discarded = before - kept.len();
    (kept, discarded)
}

/// Last row and column index of every AOI grid present in the tile layer.
fn grid_extents(tiles: &[InnerTile]) -> HashMap<&str, (usize, usize)> {
    let mut extents: HashMap<&str, (usize, usize)> = HashMap::new();
    for tile in tiles {
        let entry = extents.entry(tile.id.aoi_id.as_str()).or_insert((0, 0));
        entry.0 = entry.0.max(tile.id.row);
        entry.1 = entry.1.max(tile.id.col);
    }
    extents
}

/// What one tile contributes to the merged layer.
#[derive(Debug, Default)]
pub struct TileContribution {
    pub kept: Vec<GeoDetection>,
    pub discarded: usize,
}

/// Convert and filter one tile's detections. `Ok(None)` means the tile has no
/// image or no detector output, which is not an error.
pub fn process_tile(
    tile: &InnerTile,
    images_dir: &Path,
    labels_dir: &Path,
    shape: DetectionShape,
    edges: GridEdges,
) -> Result<Option<TileContribution>> {
    let image_path = images_dir.join(tile.id.image_file_name());
    let labels_path = labels_dir.join(tile.id.label_file_name());
    if !image_path.exists() {
        debug!("Tile {}: no image at {}, skipping", tile.id, image_path.display());
        return Ok(None);
    }
    if !labels_path.exists() {
        debug!("Tile {}: no detector output, skipping", tile.id);
        return Ok(None);
    }

    let image = RasterReference::open(&image_path)?;
    let frame = TileFrame {
        geotransform: image.geotransform,
        width: image.width,
        height: image.height,
    };

    let detections = read_detection_file(&labels_path)?;
    let candidates: Vec<GeoDetection> = detections
        .iter()
        .map(|d| to_geo_detection(d, &frame, shape))
        .collect();

    let ownership = Ownership::new(&frame, edges);
    let (kept, discarded) = retain_owned(candidates, &tile.region, &ownership);
    debug!(
        "Tile {}: kept {} of {} detection(s)",
        tile.id,
        kept.len(),
        kept.len() + discarded
    );
    Ok(Some(TileContribution { kept, discarded }))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub tiles_merged: usize,
    pub tiles_without_output: usize,
    pub tiles_failed: usize,
    pub detections_kept: usize,
    pub detections_discarded: usize,
}

impl MergeSummary {
    fn combine(mut self, other: MergeSummary) -> MergeSummary {
        self.tiles_merged += other.tiles_merged;
        self.tiles_without_output += other.tiles_without_output;
        self.tiles_failed += other.tiles_failed;
        self.detections_kept += other.detections_kept;
        self.detections_discarded += other.detections_discarded;
        self
    }
}

/// Process every tile in parallel and union the survivors. A tile that fails
/// contributes nothing and is counted in the summary.
pub fn merge_tiles(
    tiles: &[InnerTile],
    images_dir: &Path,
    labels_dir: &Path,
    shape: DetectionShape,
) -> (Vec<GeoDetection>, MergeSummary) {
    info!("Merging detections from {} tile(s) as {}", tiles.len(), shape.as_str());
    let extents = grid_extents(tiles);

    let (detections, summary) = tiles
        .par_iter()
        .map(|tile| {
            let mut summary = MergeSummary::default();
            let edges = extents
                .get(tile.id.aoi_id.as_str())
                .map(|&(last_row, last_col)| GridEdges {
                    last_col: tile.id.col == last_col,
                    last_row: tile.id.row == last_row,
                })
                .unwrap_or_default();
            let kept = match process_tile(tile, images_dir, labels_dir, shape, edges) {
                Ok(Some(contribution)) => {
                    summary.tiles_merged = 1;
                    summary.detections_kept = contribution.kept.len();
                    summary.detections_discarded = contribution.discarded;
                    contribution.kept
                }
                Ok(None) => {
                    summary.tiles_without_output = 1;
                    Vec::new()
                }
                Err(e) => {
                    warn!("Tile {} skipped: {}", tile.id, e);
                    summary.tiles_failed = 1;
                    Vec::new()
                }
            };
            (kept, summary)
        })
        .reduce(
            || (Vec::new(), MergeSummary::default()),
            |(mut a, sa), (b, sb)| {
                a.extend(b);
                (a, sa.combine(sb))
            },
        );

    info!(
        "Merged {} tile(s): {} detection(s) kept, {} discarded at seams; {} tile(s) without output, {} failed",
        summary.tiles_merged,
        summary.detections_kept,
        summary.detections_discarded,
        summary.tiles_without_output,
        summary.tiles_failed
    );
    (detections, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, NormalizedBox};
    use crate::geotransform::GeoTransform;
    use crate::window::PixelWindow;

    fn gt() -> GeoTransform {
        GeoTransform::new([0.0, 1.0, 0.0, 1000.0, 0.0, -1.0]).unwrap()
    }

    fn inner_region(window: PixelWindow) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![window.to_polygon(&gt())])
    }

    fn frame_for(outer: PixelWindow) -> TileFrame {
        TileFrame {
            geotransform: gt().for_window(outer.y_min, outer.x_min),
            width: outer.width(),
            height: outer.height(),
        }
    }

    /// Detection on `outer` centred on source pixel (col, row) with a size in pixels.
    fn detection_at(outer: PixelWindow, col: f64, row: f64, size: f64) -> Detection {
        Detection {
            class_id: 1,
            bbox: NormalizedBox {
                cx: (col - outer.x_min as f64) / outer.width() as f64,
                cy: (row - outer.y_min as f64) / outer.height() as f64,
                width: size / outer.width() as f64,
                height: size / outer.height() as f64,
            },
            confidence: None,
        }
    }

    fn interior() -> Ownership {
        Ownership::new(&frame_for(PixelWindow::full(1000, 1000)), GridEdges::default())
    }

    fn with_edges(last_col: bool, last_row: bool) -> Ownership {
        Ownership::new(
            &frame_for(PixelWindow::full(1000, 1000)),
            GridEdges { last_col, last_row },
        )
    }

    #[test]
    fn test_centroid_on_shared_edge_owned_once() {
        let left = inner_region(PixelWindow::new(0, 0, 500, 500));
        let right = inner_region(PixelWindow::new(500, 0, 1000, 500));

        // Exactly on the vertical seam x = 500
        let p = Point::new(500.0, 750.0);
        assert!(!interior().owns(&left, &p));
        assert!(with_edges(true, false).owns(&right, &p));

        // Exactly on a horizontal seam (row 500 -> y = 500)
        let top = inner_region(PixelWindow::new(0, 0, 500, 500));
        let bottom = inner_region(PixelWindow::new(0, 500, 500, 1000));
        let p = Point::new(250.0, 500.0);
        assert!(!interior().owns(&top, &p));
        assert!(with_edges(false, true).owns(&bottom, &p));
    }

    #[test]
    fn test_four_corner_point_owned_once() {
        let p = Point::new(500.0, 500.0);
        let owners = [
            (PixelWindow::new(0, 0, 500, 500), false, false),
            (PixelWindow::new(500, 0, 1000, 500), true, false),
            (PixelWindow::new(0, 500, 500, 1000), false, true),
            (PixelWindow::new(500, 500, 1000, 1000), true, true),
        ]
        .iter()
        .filter(|(w, last_col, last_row)| {
            with_edges(*last_col, *last_row).owns(&inner_region(*w), &p)
        })
        .count();
        assert_eq!(owners, 1);
    }

    #[test]
    fn test_outer_grid_edges_owned() {
        // 2x2 grid over 1000x1000: r1_c1 is last in both axes
        let last = inner_region(PixelWindow::new(500, 500, 1000, 1000));
        let right_edge = Point::new(1000.0, 250.0); // row 750
        let bottom_edge = Point::new(750.0, 0.0); // row 1000
        let corner = Point::new(1000.0, 0.0);
        for p in [right_edge, bottom_edge, corner] {
            assert!(with_edges(true, true).owns(&last, &p));
        }

        // r0_c1: right edge owned, bottom edge left to r1_c1
        let upper_right = inner_region(PixelWindow::new(500, 0, 1000, 500));
        let ownership = with_edges(true, false);
        assert!(ownership.owns(&upper_right, &Point::new(1000.0, 750.0)));
        assert!(!ownership.owns(&upper_right, &Point::new(750.0, 500.0)));

        // Interior tiles still leave their right/bottom edges to neighbours
        let first = inner_region(PixelWindow::new(0, 0, 500, 500));
        assert!(!interior().owns(&first, &Point::new(500.0, 750.0)));
        assert!(interior().owns(&first, &Point::new(0.0, 1000.0)));
    }

    #[test]
    fn test_grid_extents() {
        let region = MultiPolygon::new(vec![]);
        let tiles: Vec<InnerTile> = [("a", 0, 0), ("a", 2, 1), ("b", 0, 3)]
            .iter()
            .map(|&(aoi, row, col)| InnerTile {
                id: crate::tile::TileId::new(aoi, row, col),
                region: region.clone(),
            })
            .collect();
        let extents = grid_extents(&tiles);
        assert_eq!(extents["a"], (2, 1));
        assert_eq!(extents["b"], (0, 3));
    }

    #[test]
    fn test_same_object_from_two_tiles_kept_once() {
        let left_inner = PixelWindow::new(0, 0, 500, 1000);
        let right_inner = PixelWindow::new(500, 0, 1000, 1000);
        let left_outer = PixelWindow::new(0, 0, 520, 1000);
        let right_outer = PixelWindow::new(480, 0, 1000, 1000);

        // Object centred at col 495 (inside the left inner tile), seen by both
        let mut merged = Vec::new();
        for (inner, outer, last_col) in [
            (left_inner, left_outer, false),
            (right_inner, right_outer, true),
        ] {
            let frame = frame_for(outer);
            let det = detection_at(outer, 495.0, 300.0, 12.0);
            let det = to_geo_detection(&det, &frame, DetectionShape::Rectangle);
            let ownership = Ownership::new(&frame, GridEdges { last_col, last_row: true });
            let (kept, _) = retain_owned(vec![det], &inner_region(inner), &ownership);
            merged.extend(kept);
        }
        assert_eq!(merged.len(), 1);
        assert!((merged[0].centroid.x() - 495.0).abs() < 1e-6);
    }

    #[test]
    fn test_retain_owned_counts() {
        let inner = PixelWindow::new(100, 100, 200, 200);
        let outer = PixelWindow::new(90, 90, 210, 210);
        let frame = frame_for(outer);
        let dets: Vec<_> = [(150.0, 150.0), (95.0, 150.0), (205.0, 205.0), (100.0, 100.0)]
            .iter()
            .map(|&(c, r)| {
                let det = detection_at(outer, c, r, 4.0);
                to_geo_detection(&det, &frame, DetectionShape::Oval)
            })
            .collect();
        let ownership = Ownership::new(&frame, GridEdges::default());
        let (kept, discarded) = retain_owned(dets, &inner_region(inner), &ownership);
        assert_eq!(kept.len(), 2);
        assert_eq!(discarded, 2);
    }
}

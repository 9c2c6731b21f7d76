use crate::aoi::AreaOfInterest;
use crate::buffer::{outer_window, BufferPixels};
use crate::geotransform::GeoTransform;
use crate::grid::TileGrid;
use crate::window::PixelWindow;
use geo::{BooleanOps, MultiPolygon, Polygon};
use std::fmt;
use std::str::FromStr;

const TILE_FILE_PREFIX: &str = "tile_";

/// (AOI id, row, col). Its display form is the key shared by tile rasters,
/// detector label files and both tile layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub aoi_id: String,
    pub row: usize,
    pub col: usize,
}

impl TileId {
    pub fn new(aoi_id: &str, row: usize, col: usize) -> Self {
        Self {
            aoi_id: sanitize_aoi_id(aoi_id),
            row,
            col,
        }
    }

    pub fn file_stem(&self) -> String {
        format!("{}{}", TILE_FILE_PREFIX, self)
    }

    pub fn image_file_name(&self) -> String {
        format!("{}.tif", self.file_stem())
    }

    pub fn label_file_name(&self) -> String {
        format!("{}.txt", self.file_stem())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_r{}_c{}", self.aoi_id, self.row, self.col)
    }
}

impl FromStr for TileId {
    type Err = String;

    /// Accepts `<aoi>_r<row>_c<col>`, optionally with the `tile_` file prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix(TILE_FILE_PREFIX).unwrap_or(s);
        let (rest, col) = s
            .rsplit_once("_c")
            .ok_or_else(|| format!("missing column in tile id '{s}'"))?;
        let (aoi_id, row) = rest
            .rsplit_once("_r")
            .ok_or_else(|| format!("missing row in tile id '{s}'"))?;
        if aoi_id.is_empty() {
            return Err(format!("missing AOI id in tile id '{s}'"));
        }
        let row = row
            .parse()
            .map_err(|e| format!("row parse error in '{s}': {e}"))?;
        let col = col
            .parse()
            .map_err(|e| format!("col parse error in '{s}': {e}"))?;
        Ok(TileId {
            aoi_id: aoi_id.to_string(),
            row,
            col,
        })
    }
}

/// Keep AOI ids usable inside file names.
fn sanitize_aoi_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// One cell of an AOI's tile grid with its inner (exact) and outer (buffered)
/// extents in both pixel and CRS space.
#[derive(Debug, Clone)]
pub struct Tile {
    pub id: TileId,
    /// Index of the owning AOI in the run's AOI list.
    pub aoi_index: usize,
    pub inner: PixelWindow,
    pub outer: PixelWindow,
    pub inner_polygon: MultiPolygon<f64>,
    pub outer_polygon: Polygon<f64>,
}

/// Grid, buffer and project every tile of one AOI.
pub fn tiles_for_grid(
    aoi: &AreaOfInterest,
    aoi_index: usize,
    grid: &TileGrid,
    buffer: BufferPixels,
    gt: &GeoTransform,
    raster_size: (usize, usize),
    clip_to_aoi: bool,
) -> Vec<Tile> {
    let (raster_width, raster_height) = raster_size;

    grid.iter()
        .map(|(row, col, inner)| {
            let outer = outer_window(&inner, buffer, raster_width, raster_height);
            let inner_rect = inner.to_polygon(gt);
            let inner_polygon = if clip_to_aoi {
                MultiPolygon::new(vec![inner_rect]).intersection(&aoi.geometry)
            } else {
                MultiPolygon::new(vec![inner_rect])
            };

            Tile {
                id: TileId::new(&aoi.id, row, col),
                aoi_index,
                inner,
                outer,
                inner_polygon,
                outer_polygon: outer.to_polygon(gt),
            }
        })
        .collect()
}

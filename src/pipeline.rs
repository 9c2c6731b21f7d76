use crate::aoi::{read_aois, AreaOfInterest};
use crate::buffer::BufferPixels;
use crate::config::{MergeConfig, TilingConfig};
use crate::crs::{buffer_distance_suspicious, detect_buffer_units, raster_spatial_ref};
use crate::error::{Result, TilerError};
use crate::grid::{aoi_pixel_bbox, TileGrid};
use crate::io::{
    creation_options, is_supported_data_type, materialize_tile, MaterializeOptions,
    RasterReference,
};
use crate::layers::{
    layer_spatial_ref, read_inner_tiles, write_detection_layer, write_tile_layer, TileExtent,
};
use crate::merge::{merge_tiles, MergeSummary};
use crate::tile::{tiles_for_grid, Tile};
use crate::window::PixelWindow;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TilingSummary {
    pub aois_processed: usize,
    pub aois_skipped: usize,
    pub tiles_written: usize,
    pub tiles_failed: usize,
}

/// Partition the raster per AOI, write one GeoTIFF per outer tile and the
/// inner/outer tile layers.
pub fn run_tiling(config: &TilingConfig) -> Result<TilingSummary> {
    config.validate()?;

    let raster = RasterReference::open(&config.raster)?;
    raster.log_summary();
    if !is_supported_data_type(raster.data_type) {
        return Err(TilerError::UnsupportedDataType(format!("{:?}", raster.data_type)));
    }
    let units = detect_buffer_units(&raster.projection);
    if buffer_distance_suspicious(units, config.buffer_distance) {
        warn!(
            "Buffer distance {} on a geographic raster is read as degrees",
            config.buffer_distance
        );
    }

    let (buffer_x, buffer_y) = raster.geotransform.distance_to_pixels(config.buffer_distance);
    let buffer = BufferPixels { x: buffer_x, y: buffer_y };
    let (max_w, max_h) = config.inner_tile_max(buffer)?;
    info!(
        "Buffer {} CRS units = {}x{} px; inner tiles at most {}x{} px",
        config.buffer_distance, buffer.x, buffer.y, max_w, max_h
    );

    prepare_output_dir(&config.out_dir, config.replace_output)?;
    std::fs::create_dir_all(config.images_dir())?;
    std::fs::create_dir_all(config.tiles_dir())?;

    let raster_srs = raster_spatial_ref(&raster.projection);
    let candidates = match &config.aoi {
        Some(path) => read_aois(path, raster_srs.as_ref())?,
        None => {
            info!("No AOI layer given, tiling the full raster extent");
            let extent =
                PixelWindow::full(raster.width, raster.height).to_polygon(&raster.geotransform);
            vec![Ok(AreaOfInterest::from_polygon("0", extent))]
        }
    };

    let mut summary = TilingSummary::default();
    let mut aois: Vec<AreaOfInterest> = Vec::new();
    let mut tiles: Vec<Tile> = Vec::new();

    for candidate in candidates {
        let aoi = match candidate {
            Ok(aoi) => aoi,
            Err(e) => {
                warn!("Skipping AOI: {}", e);
                summary.aois_skipped += 1;
                continue;
            }
        };

        match tiles_for_aoi(&aoi, aois.len(), &raster, buffer, (max_w, max_h), config.clip_to_aoi) {
            Ok(aoi_tiles) => {
                info!("AOI {}: {} tile(s)", aoi.id, aoi_tiles.len());
                tiles.extend(aoi_tiles);
                aois.push(aoi);
                summary.aois_processed += 1;
            }
            Err(e) => {
                warn!("Skipping AOI {}: {}", aoi.id, e);
                summary.aois_skipped += 1;
            }
        }
    }

    let options = MaterializeOptions {
        flatten_alpha: config.flatten_alpha,
        creation_options: creation_options(&config.compression),
    };
    let images_dir = config.images_dir();

    let attempted = tiles.len();
    info!("Writing {} tile raster(s) to {}", attempted, images_dir.display());
    let written: Vec<Tile> = tiles
        .into_par_iter()
        .filter_map(|tile| {
            let out_path = images_dir.join(tile.id.image_file_name());
            debug!(
                "Tile {}: inner {}, outer {}",
                tile.id, tile.inner, tile.outer
            );
            match materialize_tile(&raster, &tile.outer, &out_path, &options) {
                Ok(()) => Some(tile),
                Err(e) => {
                    warn!("Tile {} skipped: {}", tile.id, e);
                    None
                }
            }
        })
        .collect();

    summary.tiles_written = written.len();
    summary.tiles_failed = attempted - written.len();

    let srs = raster_srs.as_ref();
    write_tile_layer(&config.inner_layer_path(), TileExtent::Inner, &written, &aois, srs)?;
    write_tile_layer(&config.outer_layer_path(), TileExtent::Outer, &written, &aois, srs)?;

    info!(
        "Tiling done: {} AOI(s) processed, {} skipped; {} tile(s) written, {} failed",
        summary.aois_processed, summary.aois_skipped, summary.tiles_written, summary.tiles_failed
    );
    Ok(summary)
}

fn tiles_for_aoi(
    aoi: &AreaOfInterest,
    aoi_index: usize,
    raster: &RasterReference,
    buffer: BufferPixels,
    max_tile: (usize, usize),
    clip_to_aoi: bool,
) -> Result<Vec<Tile>> {
    let extent = aoi.extent().ok_or_else(|| TilerError::EmptyAoi(aoi.id.clone()))?;
    let bbox = aoi_pixel_bbox(&aoi.id, &extent, &raster.geotransform, raster.width, raster.height)?;
    let grid = TileGrid::new(bbox, max_tile.0, max_tile.1);

    let tiles = tiles_for_grid(
        aoi,
        aoi_index,
        &grid,
        buffer,
        &raster.geotransform,
        raster.size(),
        clip_to_aoi,
    );

    // Degenerate AOIs can produce zero-area windows; nothing to read there.
    let (tiles, empty): (Vec<Tile>, Vec<Tile>) =
        tiles.into_iter().partition(|t| !t.outer.is_empty());
    if !empty.is_empty() {
        warn!("AOI {}: dropping {} zero-area tile(s)", aoi.id, empty.len());
    }
    Ok(tiles)
}

fn prepare_output_dir(out_dir: &Path, replace: bool) -> Result<()> {
    if replace && out_dir.exists() {
        if out_dir.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("output path is a file: {}", out_dir.display()),
            )
            .into());
        }
        info!("Replacing output directory {}", out_dir.display());
        std::fs::remove_dir_all(out_dir)?;
    }
    std::fs::create_dir_all(out_dir)?;
    Ok(())
}

/// Convert every tile's detector output to CRS geometry, drop detections owned
/// by a neighbouring tile and write the union as one layer.
pub fn run_merge(config: &MergeConfig) -> Result<MergeSummary> {
    config.validate()?;

    let inner_tiles = read_inner_tiles(&config.tiles)?;
    let srs = layer_spatial_ref(&config.tiles)?;

    let (detections, summary) =
        merge_tiles(&inner_tiles, &config.images_dir, &config.labels_dir, config.shape);

    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_detection_layer(&config.output, &detections, srs.as_ref())?;
    Ok(summary)
}

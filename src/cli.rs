use crate::config::{MergeConfig, TileSizeTarget, TilingConfig};
use crate::detection::DetectionShape;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ortho-tiler")]
#[command(about = "Tile georeferenced rasters for object detection and merge the detections back")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a raster into overlapping tiles per area of interest
    Tile(TileArgs),
    /// Merge per-tile detector output into one deduplicated layer
    Merge(MergeArgs),
}

#[derive(clap::Args, Debug)]
pub struct TileArgs {
    /// Input georeferenced raster (e.g. orthophoto GeoTIFF)
    #[arg(short, long, value_name = "FILE")]
    pub raster: PathBuf,

    /// Polygon layer of areas of interest (default: whole raster)
    #[arg(short, long, value_name = "FILE")]
    pub aoi: Option<PathBuf>,

    /// Output directory for tile images and tile layers
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Maximum tile side length in pixels
    #[arg(short, long, value_name = "PX")]
    pub max_tile_size: usize,

    /// Overlap buffer around each tile, in CRS units (e.g. metres)
    #[arg(short, long, value_name = "DISTANCE", default_value_t = 0.0)]
    pub buffer_distance: f64,

    /// Which tile extent the maximum size applies to
    #[arg(long, value_enum, default_value_t = TileSizeTarget::Inner)]
    pub tile_size_target: TileSizeTarget,

    /// Intersect inner tiles with their AOI polygon
    #[arg(long)]
    pub clip_to_aoi: bool,

    /// Replace transparent pixels of RGBA tiles with white and drop alpha
    #[arg(long)]
    pub flatten_alpha: bool,

    /// Tile GeoTIFF compression (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compress: String,

    /// Delete the output directory before writing
    #[arg(long)]
    pub replace_output: bool,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Inner tile layer written by `tile`
    #[arg(long, value_name = "FILE")]
    pub tiles: PathBuf,

    /// Directory holding the tile images
    #[arg(long, value_name = "DIR")]
    pub images_dir: PathBuf,

    /// Directory holding detector output, one .txt per tile image
    #[arg(long, value_name = "DIR")]
    pub labels_dir: PathBuf,

    /// Output detection layer (.gpkg, .shp or .geojson)
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Geometry drawn for each detection
    #[arg(long, value_enum, default_value_t = DetectionShape::Rectangle)]
    pub shape: DetectionShape,
}

impl From<TileArgs> for TilingConfig {
    fn from(args: TileArgs) -> Self {
        TilingConfig {
            raster: args.raster,
            aoi: args.aoi,
            out_dir: args.out_dir,
            max_tile_size: args.max_tile_size,
            buffer_distance: args.buffer_distance,
            tile_size_target: args.tile_size_target,
            clip_to_aoi: args.clip_to_aoi,
            flatten_alpha: args.flatten_alpha,
            compression: args.compress.to_ascii_uppercase(),
            replace_output: args.replace_output,
        }
    }
}

impl From<MergeArgs> for MergeConfig {
    fn from(args: MergeArgs) -> Self {
        MergeConfig {
            tiles: args.tiles,
            images_dir: args.images_dir,
            labels_dir: args.labels_dir,
            output: args.output,
            shape: args.shape,
        }
    }
}

use crate::buffer::BufferPixels;
use crate::detection::DetectionShape;
use crate::error::{Result, TilerError};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

pub const VALID_COMPRESSIONS: [&str; 4] = ["DEFLATE", "LZW", "ZSTD", "NONE"];

pub const IMAGES_DIR: &str = "images";
pub const TILES_DIR: &str = "tiles";
pub const INNER_LAYER_FILE: &str = "tiles_inner.gpkg";
pub const OUTER_LAYER_FILE: &str = "tiles_outer.gpkg";

/// Which tile extent `max_tile_size` limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TileSizeTarget {
    /// Inner tiles are at most `max_tile_size`; outer tiles grow by the buffer.
    #[default]
    Inner,
    /// Outer tiles (inner plus buffer on both sides) are at most `max_tile_size`.
    Outer,
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    if !VALID_COMPRESSIONS.contains(&compression) {
        return Err(TilerError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TilingConfig {
    pub raster: PathBuf,
    /// Polygon layer of areas of interest; the raster extent when absent.
    pub aoi: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub max_tile_size: usize,
    /// Buffer in CRS units.
    pub buffer_distance: f64,
    pub tile_size_target: TileSizeTarget,
    pub clip_to_aoi: bool,
    pub flatten_alpha: bool,
    pub compression: String,
    pub replace_output: bool,
}

impl TilingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tile_size == 0 {
            return Err(TilerError::InvalidMaxTileSize(self.max_tile_size));
        }
        if !self.buffer_distance.is_finite() || self.buffer_distance < 0.0 {
            return Err(TilerError::InvalidBufferDistance(self.buffer_distance));
        }
        validate_compression(&self.compression)
    }

    /// Maximum inner tile width and height for a buffer already in pixels.
    pub fn inner_tile_max(&self, buffer: BufferPixels) -> Result<(usize, usize)> {
        match self.tile_size_target {
            TileSizeTarget::Inner => Ok((self.max_tile_size, self.max_tile_size)),
            TileSizeTarget::Outer => {
                let shrink = |buffer_px: usize| {
                    self.max_tile_size
                        .checked_sub(2 * buffer_px)
                        .filter(|&m| m > 0)
                        .ok_or(TilerError::BufferExceedsTile {
                            max_tile_size: self.max_tile_size,
                            buffer_px,
                        })
                };
                Ok((shrink(buffer.x)?, shrink(buffer.y)?))
            }
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.out_dir.join(IMAGES_DIR)
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.out_dir.join(TILES_DIR)
    }

    pub fn inner_layer_path(&self) -> PathBuf {
        self.tiles_dir().join(INNER_LAYER_FILE)
    }

    pub fn outer_layer_path(&self) -> PathBuf {
        self.tiles_dir().join(OUTER_LAYER_FILE)
    }
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Inner tile layer written by the tiling stage.
    pub tiles: PathBuf,
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
    pub output: PathBuf,
    pub shape: DetectionShape,
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        for dir in [&self.images_dir, &self.labels_dir] {
            ensure_dir(dir)?;
        }
        if !self.tiles.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("tile layer not found: {}", self.tiles.display()),
            )
            .into());
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("directory not found: {}", dir.display()),
        )
        .into())
    }
}

// Library exports for testing and reuse

pub mod aoi;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod crs;
pub mod detection;
pub mod error;
pub mod geotransform;
pub mod grid;
pub mod io;
pub mod layers;
pub mod merge;
pub mod pipeline;
pub mod tile;
pub mod window;

// Re-export commonly used types
pub use error::{ErrorKind, Result, TilerError};
pub use geotransform::GeoTransform;
pub use grid::TileGrid;
pub use pipeline::{run_merge, run_tiling};
pub use tile::{Tile, TileId};
pub use window::PixelWindow;

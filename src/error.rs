use thiserror::Error;

/// Coarse classification used to decide whether a failure aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Geometry,
    Io,
    DetectionParse,
}

#[derive(Error, Debug)]
pub enum TilerError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Invalid max tile size: {0} pixels (must be positive)")]
    InvalidMaxTileSize(usize),

    #[error("Invalid buffer distance: {0} (must be finite and non-negative)")]
    InvalidBufferDistance(f64),

    #[error("Max tile size {max_tile_size}px leaves no inner tile after a {buffer_px}px buffer on each side")]
    BufferExceedsTile { max_tile_size: usize, buffer_px: usize },

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid thread count: {0} (must be positive)")]
    InvalidThreadCount(usize),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Geotransform is not invertible: {0:?}")]
    SingularGeotransform([f64; 6]),

    #[error("Raster data type {0} cannot be copied to tile rasters without conversion")]
    UnsupportedDataType(String),

    #[error("Raster has no bands: {0}")]
    NoBands(String),

    #[error("AOI {0} has an empty geometry")]
    EmptyAoi(String),

    #[error("AOI {0} has a self-intersecting polygon that could not be repaired")]
    InvalidAoi(String),

    #[error("AOI {0} has an unsupported geometry type (expected polygon or multipolygon)")]
    UnsupportedAoiGeometry(String),

    #[error("AOI {0} lies entirely outside the raster extent")]
    AoiOutsideRaster(String),

    #[error("Vector layer {0} has no layers")]
    NoLayer(String),

    #[error("Tile layer feature is missing field {0}")]
    MissingField(String),

    #[error("Malformed detection file {path} line {line}: {reason}")]
    DetectionParse {
        path: String,
        line: usize,
        reason: String,
    },
}

impl TilerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TilerError::InvalidMaxTileSize(_)
            | TilerError::InvalidBufferDistance(_)
            | TilerError::BufferExceedsTile { .. }
            | TilerError::InvalidCompression(_)
            | TilerError::InvalidThreadCount(_) => ErrorKind::Configuration,

            TilerError::EmptyAoi(_)
            | TilerError::InvalidAoi(_)
            | TilerError::UnsupportedAoiGeometry(_)
            | TilerError::AoiOutsideRaster(_) => ErrorKind::Geometry,

            TilerError::DetectionParse { .. } => ErrorKind::DetectionParse,

            TilerError::Gdal(_)
            | TilerError::Io(_)
            | TilerError::ShapeError(_)
            | TilerError::InvalidDimensions(..)
            | TilerError::InvalidPixelSize(_)
            | TilerError::SingularGeotransform(_)
            | TilerError::UnsupportedDataType(_)
            | TilerError::NoBands(_)
            | TilerError::NoLayer(_)
            | TilerError::MissingField(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, TilerError>;

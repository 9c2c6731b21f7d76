use crate::error::{Result, TilerError};
use crate::geotransform::GeoTransform;
use crate::window::PixelWindow;
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager};
use log::{debug, info, warn};
use ndarray::{s, Array3, Axis};
use std::path::{Path, PathBuf};

/// Pixel grid, georeferencing and band layout of a raster, without its pixels.
#[derive(Debug, Clone)]
pub struct RasterReference {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: GeoTransform,
    pub projection: String,
    pub nodata: Option<f64>,
    pub data_type: GdalDataType,
}

impl RasterReference {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening raster: {}", path.display());
        let dataset = Dataset::open(path)?;
        Self::from_dataset(&dataset, path)
    }

    /// Extract metadata from a dataset without reading pixel data
    pub fn from_dataset(dataset: &Dataset, path: &Path) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        if width == 0 || height == 0 {
            return Err(TilerError::InvalidDimensions(width, height));
        }

        let band_count = dataset.raster_count() as usize;
        if band_count == 0 {
            return Err(TilerError::NoBands(path.display().to_string()));
        }

        let coeffs = dataset.geo_transform()?;
        let geotransform = GeoTransform::new(coeffs)?;
        if geotransform.pixel_width() <= 0.0 {
            return Err(TilerError::InvalidPixelSize(geotransform.pixel_width()));
        }
        if geotransform.pixel_height() <= 0.0 {
            return Err(TilerError::InvalidPixelSize(geotransform.pixel_height()));
        }

        let band = dataset.rasterband(1)?;

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            band_count,
            geotransform,
            projection: dataset.projection(),
            nodata: band.no_data_value(),
            data_type: band.band_type(),
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn log_summary(&self) {
        let gt = self.geotransform.coeffs();
        info!(
            "Raster {}: {}x{} px, {} band(s) of {:?}",
            self.path.display(),
            self.width,
            self.height,
            self.band_count,
            self.data_type
        );
        info!(
            "Geotransform: origin=({:.6}, {:.6}), pixel_size=({:.6}, {:.6})",
            gt[0], gt[3], gt[1], gt[5]
        );
        if !self.geotransform.is_north_up() {
            warn!(
                "Raster has rotation (gt[2]={:.6}, gt[4]={:.6}); tiles stay aligned to the pixel grid",
                gt[2], gt[4]
            );
        }
    }
}

/// How tile rasters are written.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    pub flatten_alpha: bool,
    pub creation_options: Vec<String>,
}

/// GeoTIFF creation options for tile rasters
pub fn creation_options(compression: &str) -> Vec<String> {
    if compression == "NONE" {
        Vec::new()
    } else {
        vec![format!("COMPRESS={}", compression)]
    }
}

/// Copy the pixels of `window` from the source raster into a new GeoTIFF at
/// `output`, georeferenced at the window's top-left corner.
pub fn materialize_tile(
    source: &RasterReference,
    window: &PixelWindow,
    output: &Path,
    options: &MaterializeOptions,
) -> Result<()> {
    if window.is_empty() {
        return Err(TilerError::InvalidDimensions(window.width(), window.height()));
    }

    // One handle per call: datasets are not shared across worker threads.
    let dataset = Dataset::open(&source.path)?;
    let tile_gt = source.geotransform.for_window(window.y_min, window.x_min);

    match source.data_type {
        GdalDataType::UInt8 => {
            let mut data = read_window::<u8>(&dataset, window)?;
            if options.flatten_alpha {
                data = flatten_alpha(data);
            }
            write_tile(output, &data, &tile_gt, source, &options.creation_options)
        }
        GdalDataType::UInt16 => {
            copy_window::<u16>(&dataset, window, output, &tile_gt, source, options)
        }
        GdalDataType::Int16 => {
            copy_window::<i16>(&dataset, window, output, &tile_gt, source, options)
        }
        GdalDataType::UInt32 => {
            copy_window::<u32>(&dataset, window, output, &tile_gt, source, options)
        }
        GdalDataType::Int32 => {
            copy_window::<i32>(&dataset, window, output, &tile_gt, source, options)
        }
        GdalDataType::Float32 => {
            copy_window::<f32>(&dataset, window, output, &tile_gt, source, options)
        }
        GdalDataType::Float64 => {
            copy_window::<f64>(&dataset, window, output, &tile_gt, source, options)
        }
        other => Err(TilerError::UnsupportedDataType(format!("{:?}", other))),
    }
}

/// Tile data types copied without conversion.
pub fn is_supported_data_type(data_type: GdalDataType) -> bool {
    matches!(
        data_type,
        GdalDataType::UInt8
            | GdalDataType::UInt16
            | GdalDataType::Int16
            | GdalDataType::UInt32
            | GdalDataType::Int32
            | GdalDataType::Float32
            | GdalDataType::Float64
    )
}

fn copy_window<T: GdalType + Copy>(
    dataset: &Dataset,
    window: &PixelWindow,
    output: &Path,
    tile_gt: &GeoTransform,
    source: &RasterReference,
    options: &MaterializeOptions,
) -> Result<()> {
    warn_alpha_unsupported(options, source);
    let data = read_window::<T>(dataset, window)?;
    write_tile(output, &data, tile_gt, source, &options.creation_options)
}

fn warn_alpha_unsupported(options: &MaterializeOptions, source: &RasterReference) {
    if options.flatten_alpha && source.band_count == 4 {
        warn!(
            "Alpha flattening only applies to 8-bit rasters, copying {:?} bands unchanged",
            source.data_type
        );
    }
}

/// Read all bands of a window into a (band, row, col) array
pub fn read_window<T: GdalType + Copy>(
    dataset: &Dataset,
    window: &PixelWindow,
) -> Result<Array3<T>> {
    let bands = dataset.raster_count() as usize;
    let (w, h) = window.size();

    debug!(
        "Reading window: offset=({},{}), size=({},{}), {} band(s)",
        window.x_min, window.y_min, w, h, bands
    );

    let mut data_vec: Vec<T> = Vec::with_capacity(bands * w * h);
    for b in 1..=bands {
        let band = dataset.rasterband(b)?;
        let buffer = band.read_as::<T>(window.offset(), (w, h), (w, h), None)?;
        data_vec.extend(buffer.into_iter());
    }

    Ok(Array3::from_shape_vec((bands, h, w), data_vec)?)
}

/// Replace fully transparent pixels by white and drop the alpha band.
/// Only 4-band data is altered; 3-band data and other layouts pass through.
pub fn flatten_alpha(data: Array3<u8>) -> Array3<u8> {
    if data.len_of(Axis(0)) != 4 {
        return data;
    }

    let alpha = data.index_axis(Axis(0), 3).to_owned();
    let mut rgb = data.slice(s![0..3, .., ..]).to_owned();
    for mut band in rgb.outer_iter_mut() {
        band.zip_mut_with(&alpha, |value, &a| {
            if a == 0 {
                *value = u8::MAX;
            }
        });
    }
    rgb
}

fn write_tile<T: GdalType + Copy>(
    path: &Path,
    data: &Array3<T>,
    gt: &GeoTransform,
    source: &RasterReference,
    options: &[String],
) -> Result<()> {
    let (bands, h, w) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut gdal_options = CslStringList::new();
    for opt in options {
        gdal_options.add_string(opt)?;
    }
    let mut dataset =
        driver.create_with_band_type_with_options::<T, _>(path, w, h, bands, &gdal_options)?;

    dataset.set_geo_transform(&gt.coeffs())?;
    if !source.projection.is_empty() {
        dataset.set_projection(&source.projection)?;
    }

    for (i, band_data) in data.outer_iter().enumerate() {
        let mut raster_band = dataset.rasterband(i + 1)?;
        let mut buffer = Buffer::new((w, h), band_data.iter().copied().collect());
        raster_band.write((0, 0), (w, h), &mut buffer)?;
        if let Some(nd) = source.nodata {
            raster_band.set_no_data_value(Some(nd))?;
        }
    }

    debug!("Wrote {} ({}x{}, {} band(s))", path.display(), w, h, bands);
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;

    /// Scratch directory under the system temp dir, removed on drop.
    pub struct ScratchDir(pub PathBuf);

    impl ScratchDir {
        pub fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "ortho-tiler-{}-{}",
                name,
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            ScratchDir(dir)
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    /// Write a `bands`-band 8-bit GeoTIFF whose value at (band, row, col) is
    /// `(row + col + band) % 256`.
    pub fn write_test_raster(
        path: &Path,
        width: usize,
        height: usize,
        bands: usize,
        gt: [f64; 6],
    ) {
        write_test_raster_with_crs(path, width, height, bands, gt, "");
    }

    /// Same as `write_test_raster`, with the given projection WKT.
    pub fn write_test_raster_with_crs(
        path: &Path,
        width: usize,
        height: usize,
        bands: usize,
        gt: [f64; 6],
        projection: &str,
    ) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut ds = driver
            .create_with_band_type::<u8, _>(path, width, height, bands)
            .unwrap();
        ds.set_geo_transform(&gt).unwrap();
        if !projection.is_empty() {
            ds.set_projection(projection).unwrap();
        }
        for b in 0..bands {
            let values: Vec<u8> = (0..height)
                .flat_map(|r| (0..width).map(move |c| ((r + c + b) % 256) as u8))
                .collect();
            let mut buffer = Buffer::new((width, height), values);
            ds.rasterband(b + 1)
                .unwrap()
                .write((0, 0), (width, height), &mut buffer)
                .unwrap();
        }
    }

    /// Single-band GeoTIFF of any GDAL type, row-major `values`.
    pub fn write_band_raster<T: GdalType + Copy>(
        path: &Path,
        width: usize,
        height: usize,
        gt: [f64; 6],
        values: Vec<T>,
    ) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut ds = driver
            .create_with_band_type::<T, _>(path, width, height, 1)
            .unwrap();
        ds.set_geo_transform(&gt).unwrap();
        let mut buffer = Buffer::new((width, height), values);
        ds.rasterband(1)
            .unwrap()
            .write((0, 0), (width, height), &mut buffer)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_flatten_alpha() {
        let mut data = Array3::<u8>::from_elem((4, 2, 2), 10);
        data[[3, 0, 0]] = 0;
        data[[3, 1, 1]] = 255;
        let rgb = flatten_alpha(data);
        assert_eq!(rgb.dim(), (3, 2, 2));
        for b in 0..3 {
            assert_eq!(rgb[[b, 0, 0]], 255);
            assert_eq!(rgb[[b, 1, 1]], 10);
            assert_eq!(rgb[[b, 0, 1]], 10);
        }
    }

    #[test]
    fn test_flatten_alpha_rgb_untouched() {
        let data = Array3::<u8>::from_elem((3, 2, 2), 7);
        assert_eq!(flatten_alpha(data.clone()), data);
    }

    #[test]
    fn test_creation_options() {
        assert!(creation_options("NONE").is_empty());
        assert_eq!(creation_options("DEFLATE"), vec!["COMPRESS=DEFLATE".to_string()]);
    }

    #[test]
    fn test_materialize_tile_window_and_georef() {
        let scratch = ScratchDir::new("materialize");
        let src = scratch.path().join("src.tif");
        write_test_raster(&src, 40, 30, 3, [1000.0, 0.5, 0.0, 2000.0, 0.0, -0.5]);

        let reference = RasterReference::open(&src).unwrap();
        assert_eq!(reference.size(), (40, 30));
        assert_eq!(reference.band_count, 3);

        let window = PixelWindow::new(10, 5, 25, 20);
        let out = scratch.path().join("tile.tif");
        let options = MaterializeOptions {
            flatten_alpha: false,
            creation_options: creation_options("DEFLATE"),
        };
        materialize_tile(&reference, &window, &out, &options).unwrap();

        let tile = RasterReference::open(&out).unwrap();
        assert_eq!(tile.size(), (15, 15));
        let gt = tile.geotransform.coeffs();
        assert_eq!(gt[0], 1005.0);
        assert_eq!(gt[3], 1997.5);
        assert_eq!(gt[1], 0.5);

        let ds = Dataset::open(&out).unwrap();
        let data = read_window::<u8>(&ds, &PixelWindow::full(15, 15)).unwrap();
        // Source value at (band 1, row 5, col 10)
        assert_eq!(data[[1, 0, 0]], 16);
    }

    #[test]
    fn test_wide_integer_and_double_tiles_keep_values() {
        let scratch = ScratchDir::new("materialize-types");
        let gt = [0.0, 1.0, 0.0, 4.0, 0.0, -1.0];
        let options = MaterializeOptions {
            flatten_alpha: false,
            creation_options: creation_options("NONE"),
        };
        let window = PixelWindow::new(1, 1, 3, 3);

        // 16_777_217 has no exact f32 representation
        let ints: Vec<i32> = (0..16).map(|i| 16_777_212 + i).collect();
        let src = scratch.path().join("int32.tif");
        write_band_raster(&src, 4, 4, gt, ints);
        let reference = RasterReference::open(&src).unwrap();
        assert_eq!(reference.data_type, GdalDataType::Int32);
        let out = scratch.path().join("int32_tile.tif");
        materialize_tile(&reference, &window, &out, &options).unwrap();
        let tile = RasterReference::open(&out).unwrap();
        assert_eq!(tile.data_type, GdalDataType::Int32);
        let data = read_window::<i32>(&Dataset::open(&out).unwrap(), &PixelWindow::full(2, 2))
            .unwrap();
        // Source (row 1, col 1) is index 5
        assert_eq!(data[[0, 0, 0]], 16_777_217);
        assert_eq!(data[[0, 0, 1]], 16_777_218);
        assert_eq!(data[[0, 1, 0]], 16_777_221);
        assert_eq!(data[[0, 1, 1]], 16_777_222);

        let doubles: Vec<f64> = (0..16).map(|i| 1.0 + i as f64 * 1e-12).collect();
        let src = scratch.path().join("float64.tif");
        write_band_raster(&src, 4, 4, gt, doubles.clone());
        let reference = RasterReference::open(&src).unwrap();
        let out = scratch.path().join("float64_tile.tif");
        materialize_tile(&reference, &window, &out, &options).unwrap();
        assert_eq!(RasterReference::open(&out).unwrap().data_type, GdalDataType::Float64);
        let data = read_window::<f64>(&Dataset::open(&out).unwrap(), &PixelWindow::full(2, 2))
            .unwrap();
        assert_eq!(data[[0, 0, 0]], doubles[5]);
        assert_eq!(data[[0, 1, 1]], doubles[10]);
    }

    #[test]
    fn test_supported_data_types() {
        assert!(is_supported_data_type(GdalDataType::UInt32));
        assert!(is_supported_data_type(GdalDataType::Float64));
        assert!(!is_supported_data_type(GdalDataType::Unknown));
    }
}

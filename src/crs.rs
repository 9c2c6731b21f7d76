use crate::error::Result;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferUnits {
    /// Projected CRS; the value is the size of one unit in metres.
    Linear(f64),
    /// Geographic CRS; the buffer is read as degrees.
    Degrees,
    Unknown,
}

/// Report what a CRS-unit buffer distance means for this raster.
pub fn detect_buffer_units(projection_wkt: &str) -> BufferUnits {
    if projection_wkt.trim().is_empty() {
        warn!("Raster has no CRS, buffer distance is interpreted in geotransform units");
        return BufferUnits::Unknown;
    }

    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse projection WKT: {}", e);
            return BufferUnits::Unknown;
        }
    };

    if spatial_ref.is_geographic() {
        warn!("Geographic CRS detected (lat/lon), buffer distance is in DEGREES");
        return BufferUnits::Degrees;
    }

    if spatial_ref.is_projected() {
        let linear_units = spatial_ref.linear_units();
        info!(
            "Projected CRS detected, buffer distance unit = {:.6} m",
            linear_units
        );
        return BufferUnits::Linear(linear_units);
    }

    warn!("Unknown CRS type, buffer distance is interpreted in geotransform units");
    BufferUnits::Unknown
}

/// A buffer above one degree on a geographic raster was almost certainly
/// meant in metres.
pub fn buffer_distance_suspicious(units: BufferUnits, buffer_distance: f64) -> bool {
    units == BufferUnits::Degrees && buffer_distance > 1.0
}

/// Spatial reference of a raster, if it declares one.
pub fn raster_spatial_ref(projection_wkt: &str) -> Option<SpatialRef> {
    if projection_wkt.trim().is_empty() {
        return None;
    }
    match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => Some(sr),
        Err(e) => {
            warn!("Ignoring unparsable raster CRS: {}", e);
            None
        }
    }
}

/// Transform from `source` to `target`, or `None` when they are the same CRS.
/// Both sides use x=easting/lon, y=northing/lat ordering.
pub fn transform_between(
    source: &SpatialRef,
    target: &SpatialRef,
) -> Result<Option<CoordTransform>> {
    if source == target {
        return Ok(None);
    }

    let mut source = source.clone();
    let mut target = target.clone();
    source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    info!(
        "Reprojecting AOIs from {} to {}",
        describe(&source),
        describe(&target)
    );
    Ok(Some(CoordTransform::new(&source, &target)?))
}

fn describe(srs: &SpatialRef) -> String {
    match srs.auth_code() {
        Ok(code) => format!("EPSG:{}", code),
        Err(_) => "custom CRS".to_string(),
    }
}

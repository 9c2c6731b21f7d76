use crate::crs::transform_between;
use crate::error::{Result, TilerError};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{FieldValue, Geometry, LayerAccess};
use gdal::Dataset;
use geo::{BoundingRect, MultiPolygon, Polygon, Rect};
use log::{debug, info, warn};
use std::path::Path;

/// Scalar AOI attribute carried through to the tile layers.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::IntegerValue(v) => Some(AttributeValue::Integer(v as i64)),
            FieldValue::Integer64Value(v) => Some(AttributeValue::Integer(v)),
            FieldValue::RealValue(v) => Some(AttributeValue::Real(v)),
            FieldValue::StringValue(v) => Some(AttributeValue::Text(v)),
            other => other.into_string().map(AttributeValue::Text),
        }
    }

    pub fn to_field(&self) -> FieldValue {
        match self {
            AttributeValue::Integer(v) => FieldValue::Integer64Value(*v),
            AttributeValue::Real(v) => FieldValue::RealValue(*v),
            AttributeValue::Text(v) => FieldValue::StringValue(v.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    pub id: String,
    /// Polygon(s) in the raster CRS.
    pub geometry: MultiPolygon<f64>,
    pub attributes: Vec<(String, AttributeValue)>,
}

impl AreaOfInterest {
    pub fn from_polygon(id: &str, polygon: Polygon<f64>) -> Self {
        Self {
            id: id.to_string(),
            geometry: MultiPolygon::new(vec![polygon]),
            attributes: Vec::new(),
        }
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Read every feature of the first layer of `path` as an AOI in the raster CRS.
///
/// The outer `Result` fails only when the layer itself cannot be read. Each
/// inner `Result` is one feature, so a bad polygon skips only that AOI.
pub fn read_aois(
    path: &Path,
    raster_srs: Option<&SpatialRef>,
) -> Result<Vec<Result<AreaOfInterest>>> {
    info!("Opening AOI layer: {}", path.display());
    let dataset = Dataset::open(path)?;
    let mut layer = dataset
        .layers()
        .next()
        .ok_or_else(|| TilerError::NoLayer(path.display().to_string()))?;

    let transform = match (layer.spatial_ref(), raster_srs) {
        (Some(layer_srs), Some(raster_srs)) => transform_between(&layer_srs, raster_srs)?,
        (None, Some(_)) => {
            warn!("AOI layer has no CRS, assuming it matches the raster");
            None
        }
        _ => None,
    };

    let mut aois = Vec::new();
    for (index, feature) in layer.features().enumerate() {
        let id = feature
            .fid()
            .map(|fid| fid.to_string())
            .unwrap_or_else(|| index.to_string());

        let attributes: Vec<(String, AttributeValue)> = feature
            .fields()
            .filter_map(|(name, value)| {
                value
                    .and_then(AttributeValue::from_field)
                    .map(|v| (name, v))
            })
            .collect();

        let aoi = match feature.geometry() {
            Some(geometry) => aoi_geometry(&id, geometry, transform.as_ref()).map(|geometry| {
                AreaOfInterest {
                    id: id.clone(),
                    geometry,
                    attributes,
                }
            }),
            None => Err(TilerError::EmptyAoi(id.clone())),
        };

        if let Ok(aoi) = &aoi {
            debug!(
                "AOI {}: {} polygon(s), extent {:?}",
                aoi.id,
                aoi.geometry.0.len(),
                aoi.extent()
            );
        }
        aois.push(aoi);
    }

    info!("Read {} AOI feature(s)", aois.len());
    Ok(aois)
}

fn aoi_geometry(
    id: &str,
    geometry: &Geometry,
    transform: Option<&CoordTransform>,
) -> Result<MultiPolygon<f64>> {
    if geometry.is_empty() {
        return Err(TilerError::EmptyAoi(id.to_string()));
    }

    let geometry = match transform {
        Some(ct) => geometry.transform(ct)?,
        None => geometry.clone(),
    };

    // Zero-width buffer is the usual repair for self-intersections.
    let geometry = if geometry.is_valid() {
        geometry
    } else {
        warn!("AOI {} has an invalid polygon, attempting repair", id);
        let repaired = geometry.buffer(0.0, 8)?;
        if !repaired.is_valid() || repaired.is_empty() {
            return Err(TilerError::InvalidAoi(id.to_string()));
        }
        repaired
    };

    let multi = match geometry.to_geo()? {
        geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
        geo::Geometry::MultiPolygon(mp) => mp,
        _ => return Err(TilerError::UnsupportedAoiGeometry(id.to_string())),
    };

    if multi.0.is_empty() {
        return Err(TilerError::EmptyAoi(id.to_string()));
    }
    Ok(multi)
}

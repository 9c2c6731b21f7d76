//! Vector layers exchanged between the two stages: inner/outer tile layers
//! written at tiling time, read back at merge time, and the final detection
//! layer.

use crate::aoi::{AreaOfInterest, AttributeValue};
use crate::detection::GeoDetection;
use crate::error::{Result, TilerError};
use crate::tile::{Tile, TileId};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    FieldValue, Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType, ToGdal,
};
use gdal::{Dataset, DriverManager};
use geo::MultiPolygon;
use log::{debug, info};
use std::path::Path;

pub const FIELD_TILE_ID: &str = "tile_id";
pub const FIELD_AOI_ID: &str = "aoi_id";
pub const FIELD_ROW: &str = "row";
pub const FIELD_COL: &str = "col";
pub const FIELD_CLASS: &str = "class";
pub const FIELD_SHAPE: &str = "shape";

const RESERVED_FIELDS: [&str; 4] = [FIELD_TILE_ID, FIELD_AOI_ID, FIELD_ROW, FIELD_COL];
const SHAPEFILE_SIDECARS: [&str; 5] = ["shx", "dbf", "prj", "cpg", "qix"];

/// Which of a tile's two extents a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileExtent {
    Inner,
    Outer,
}

/// OGR driver chosen from the output file extension
pub fn vector_driver_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("shp") => "ESRI Shapefile",
        Some("geojson") | Some("json") => "GeoJSON",
        _ => "GPKG",
    }
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string()
}

/// Remove a previous output so the driver can create it again.
fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Replacing existing {}", path.display());
        std::fs::remove_file(path)?;
    }
    if vector_driver_for(path) == "ESRI Shapefile" {
        for ext in SHAPEFILE_SIDECARS {
            let sidecar = path.with_extension(ext);
            if sidecar.exists() {
                std::fs::remove_file(sidecar)?;
            }
        }
    }
    Ok(())
}

fn create_dataset(path: &Path) -> Result<Dataset> {
    remove_existing(path)?;
    let driver = DriverManager::get_driver_by_name(vector_driver_for(path))?;
    Ok(driver.create_vector_only(path)?)
}

/// AOI attribute columns shared by all tiles, typed by the first value seen.
fn attribute_schema(aois: &[AreaOfInterest]) -> Vec<(String, OGRFieldType::Type)> {
    let mut schema: Vec<(String, OGRFieldType::Type)> = Vec::new();
    for aoi in aois {
        for (name, value) in &aoi.attributes {
            let name = output_attribute_name(name);
            if schema.iter().any(|(n, _)| *n == name) {
                continue;
            }
            let ty = match value {
                AttributeValue::Integer(_) => OGRFieldType::OFTInteger64,
                AttributeValue::Real(_) => OGRFieldType::OFTReal,
                AttributeValue::Text(_) => OGRFieldType::OFTString,
            };
            schema.push((name, ty));
        }
    }
    schema
}

// AOI columns that collide with the tile key columns get an `aoi_` prefix.
fn output_attribute_name(name: &str) -> String {
    if RESERVED_FIELDS.contains(&name) {
        format!("aoi_{}", name)
    } else {
        name.to_string()
    }
}

/// Write one feature per tile, keyed by tile id, with AOI attributes propagated.
pub fn write_tile_layer(
    path: &Path,
    extent: TileExtent,
    tiles: &[Tile],
    aois: &[AreaOfInterest],
    srs: Option<&SpatialRef>,
) -> Result<()> {
    info!("Writing {:?} tile layer: {}", extent, path.display());

    let mut dataset = create_dataset(path)?;
    let geometry_type = match extent {
        TileExtent::Inner => OGRwkbGeometryType::wkbMultiPolygon,
        TileExtent::Outer => OGRwkbGeometryType::wkbPolygon,
    };
    let name = layer_name(path);
    let mut layer = dataset.create_layer(LayerOptions {
        name: &name,
        srs,
        ty: geometry_type,
        ..Default::default()
    })?;

    let schema = attribute_schema(aois);
    let mut fields: Vec<(&str, OGRFieldType::Type)> = vec![
        (FIELD_TILE_ID, OGRFieldType::OFTString),
        (FIELD_AOI_ID, OGRFieldType::OFTString),
        (FIELD_ROW, OGRFieldType::OFTInteger),
        (FIELD_COL, OGRFieldType::OFTInteger),
    ];
    fields.extend(schema.iter().map(|(n, t)| (n.as_str(), *t)));
    layer.create_defn_fields(&fields)?;

    for tile in tiles {
        let geometry: Geometry = match extent {
            TileExtent::Inner => tile.inner_polygon.to_gdal()?,
            TileExtent::Outer => tile.outer_polygon.to_gdal()?,
        };

        let attributes: Vec<(String, FieldValue)> = aois
            .get(tile.aoi_index)
            .map(|aoi| {
                aoi.attributes
                    .iter()
                    .map(|(n, v)| (output_attribute_name(n), v.to_field()))
                    .collect()
            })
            .unwrap_or_default();

        let mut names: Vec<&str> = RESERVED_FIELDS.to_vec();
        let mut values = vec![
            FieldValue::StringValue(tile.id.to_string()),
            FieldValue::StringValue(tile.id.aoi_id.clone()),
            FieldValue::IntegerValue(tile.id.row as i32),
            FieldValue::IntegerValue(tile.id.col as i32),
        ];
        for (n, v) in &attributes {
            names.push(n.as_str());
            values.push(v.clone());
        }

        layer.create_feature_fields(geometry, &names, &values)?;
    }

    info!("Wrote {} tile feature(s) to {}", tiles.len(), path.display());
    Ok(())
}

/// Inner tile region as persisted at tiling time.
#[derive(Debug, Clone)]
pub struct InnerTile {
    pub id: TileId,
    pub region: MultiPolygon<f64>,
}

/// Read the inner tile layer back, keyed by tile id.
pub fn read_inner_tiles(path: &Path) -> Result<Vec<InnerTile>> {
    info!("Reading inner tile layer: {}", path.display());
    let dataset = Dataset::open(path)?;
    let mut layer = dataset
        .layers()
        .next()
        .ok_or_else(|| TilerError::NoLayer(path.display().to_string()))?;

    let mut tiles = Vec::new();
    for feature in layer.features() {
        let id_text = feature
            .fields()
            .find(|(name, _)| name == FIELD_TILE_ID)
            .and_then(|(_, value)| value)
            .and_then(|value| value.into_string())
            .ok_or_else(|| TilerError::MissingField(FIELD_TILE_ID.to_string()))?;
        let id: TileId = id_text.parse().map_err(|_| {
            TilerError::MissingField(format!("{} (unparsable '{}')", FIELD_TILE_ID, id_text))
        })?;

        let region = match feature.geometry() {
            Some(geometry) => match geometry.to_geo()? {
                geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                geo::Geometry::MultiPolygon(mp) => mp,
                _ => MultiPolygon::new(vec![]),
            },
            None => MultiPolygon::new(vec![]),
        };
        tiles.push(InnerTile { id, region });
    }

    info!("Read {} inner tile(s)", tiles.len());
    Ok(tiles)
}

/// Spatial reference declared by a layer file, if any.
pub fn layer_spatial_ref(path: &Path) -> Result<Option<SpatialRef>> {
    let dataset = Dataset::open(path)?;
    let layer = dataset
        .layers()
        .next()
        .ok_or_else(|| TilerError::NoLayer(path.display().to_string()))?;
    Ok(layer.spatial_ref())
}

/// Write the merged detections with their class and shape.
pub fn write_detection_layer(
    path: &Path,
    detections: &[GeoDetection],
    srs: Option<&SpatialRef>,
) -> Result<()> {
    info!("Writing detection layer: {}", path.display());

    let mut dataset = create_dataset(path)?;
    let name = layer_name(path);
    let mut layer = dataset.create_layer(LayerOptions {
        name: &name,
        srs,
        ty: OGRwkbGeometryType::wkbPolygon,
        ..Default::default()
    })?;
    layer.create_defn_fields(&[
        (FIELD_CLASS, OGRFieldType::OFTInteger64),
        (FIELD_SHAPE, OGRFieldType::OFTString),
    ])?;

    for detection in detections {
        layer.create_feature_fields(
            detection.geometry.to_gdal()?,
            &[FIELD_CLASS, FIELD_SHAPE],
            &[
                FieldValue::Integer64Value(detection.class_id),
                FieldValue::StringValue(detection.shape.as_str().to_string()),
            ],
        )?;
    }

    info!("Wrote {} detection(s) to {}", detections.len(), path.display());
    Ok(())
}

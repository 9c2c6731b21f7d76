use crate::error::{Result, TilerError};
use crate::geotransform::GeoTransform;
use clap::ValueEnum;
use geo::{Centroid, Coord, LineString, MapCoords, Point, Polygon};
use log::debug;
use std::f64::consts::PI;
use std::path::Path;

/// Vertices used to approximate an oval outline.
pub const OVAL_VERTICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DetectionShape {
    #[default]
    Rectangle,
    Oval,
}

impl DetectionShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionShape::Rectangle => "rectangle",
            DetectionShape::Oval => "oval",
        }
    }
}

/// Box in image-relative coordinates: centre, width and height as fractions of
/// the tile image size, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

/// One detector output line.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: i64,
    pub bbox: NormalizedBox,
    pub confidence: Option<f64>,
}

/// Parse one `class cx cy w h [confidence]` line. Blank lines yield `None`.
pub fn parse_detection_line(line: &str) -> std::result::Result<Option<Detection>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(None);
    }
    if parts.len() != 5 && parts.len() != 6 {
        return Err(format!("expected 5 or 6 columns, found {}", parts.len()));
    }

    let class_id: i64 = parts[0]
        .parse()
        .map_err(|e| format!("class parse error: {e}"))?;

    let mut values = [0.0_f64; 4];
    for (slot, (name, text)) in values
        .iter_mut()
        .zip(["cx", "cy", "width", "height"].iter().zip(&parts[1..5]))
    {
        let v: f64 = text.parse().map_err(|e| format!("{name} parse error: {e}"))?;
        if !v.is_finite() || !(0.0..=1.0).contains(&v) {
            return Err(format!("{name} = {v} is outside [0, 1]"));
        }
        *slot = v;
    }

    let confidence = match parts.get(5) {
        Some(text) => Some(
            text.parse::<f64>()
                .map_err(|e| format!("confidence parse error: {e}"))?,
        ),
        None => None,
    };

    Ok(Some(Detection {
        class_id,
        bbox: NormalizedBox {
            cx: values[0],
            cy: values[1],
            width: values[2],
            height: values[3],
        },
        confidence,
    }))
}

/// Parse a whole detector output file's contents.
pub fn parse_detections(contents: &str, source: &str) -> Result<Vec<Detection>> {
    let mut detections = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        match parse_detection_line(line) {
            Ok(Some(det)) => detections.push(det),
            Ok(None) => {}
            Err(reason) => {
                return Err(TilerError::DetectionParse {
                    path: source.to_string(),
                    line: i + 1,
                    reason,
                })
            }
        }
    }
    Ok(detections)
}

pub fn read_detection_file(path: &Path) -> Result<Vec<Detection>> {
    let contents = std::fs::read_to_string(path)?;
    let detections = parse_detections(&contents, &path.display().to_string())?;
    debug!("{}: {} detection(s)", path.display(), detections.len());
    Ok(detections)
}

/// Pixel frame of an outer tile image: its geotransform and size.
#[derive(Debug, Clone, Copy)]
pub struct TileFrame {
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// A detection placed in CRS space.
#[derive(Debug, Clone)]
pub struct GeoDetection {
    pub class_id: i64,
    pub shape: DetectionShape,
    pub geometry: Polygon<f64>,
    pub centroid: Point<f64>,
}

/// Outline of a normalised box in tile-pixel space (x = column, y = row).
pub fn pixel_outline(
    bbox: &NormalizedBox,
    shape: DetectionShape,
    width: usize,
    height: usize,
) -> Polygon<f64> {
    let cx = bbox.cx * width as f64;
    let cy = bbox.cy * height as f64;
    let half_w = bbox.width * width as f64 / 2.0;
    let half_h = bbox.height * height as f64 / 2.0;

    let ring: Vec<Coord<f64>> = match shape {
        DetectionShape::Rectangle => vec![
            Coord { x: cx - half_w, y: cy - half_h },
            Coord { x: cx + half_w, y: cy - half_h },
            Coord { x: cx + half_w, y: cy + half_h },
            Coord { x: cx - half_w, y: cy + half_h },
        ],
        DetectionShape::Oval => (0..OVAL_VERTICES)
            .map(|i| {
                let theta = 2.0 * PI * i as f64 / OVAL_VERTICES as f64;
                Coord {
                    x: cx + half_w * theta.cos(),
                    y: cy + half_h * theta.sin(),
                }
            })
            .collect(),
    };

    // LineString -> Polygon closes the ring.
    Polygon::new(LineString::new(ring), vec![])
}

/// Convert a detection on an outer tile image to CRS geometry.
pub fn to_geo_detection(
    detection: &Detection,
    frame: &TileFrame,
    shape: DetectionShape,
) -> GeoDetection {
    let outline = pixel_outline(&detection.bbox, shape, frame.width, frame.height);
    let geometry = outline.map_coords(|c| {
        let (x, y) = frame.geotransform.pixel_to_crs(c.y, c.x);
        Coord { x, y }
    });

    // Zero-area boxes have no polygon centroid; fall back to the box centre.
    let centroid = geometry.centroid().unwrap_or_else(|| {
        let (x, y) = frame.geotransform.pixel_to_crs(
            detection.bbox.cy * frame.height as f64,
            detection.bbox.cx * frame.width as f64,
        );
        Point::new(x, y)
    });

    GeoDetection {
        class_id: detection.class_id,
        shape,
        geometry,
        centroid,
    }
}

//! Region of interest: a validated (multi)polygon in a known CRS

use crate::types::{BoundingBox, Crs, LandCoverError, LcResult};
use geo::{
    Area, BoundingRect, ChamberlainDuquetteArea, Contains, Coord, Intersects, Line, LineString,
    MultiPolygon, Point, Polygon,
};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A ring of (x, y) = (lon, lat) positions; first and last must be equal
pub type Ring = Vec<(f64, f64)>;

/// Polygonal area used to clip classification bands
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    geometry: MultiPolygon<f64>,
    crs: Crs,
    bbox: BoundingBox,
    fingerprint: u64,
}

impl RegionOfInterest {
    /// Build from polygons given as rings (exterior first, then holes).
    ///
    /// Fails with `Geometry` when there are no polygons, a ring has fewer
    /// than four positions, is not closed, contains non-finite coordinates,
    /// intersects itself, or a polygon has zero area.
    pub fn new(polygons: Vec<Vec<Ring>>, crs: Crs) -> LcResult<Self> {
        if polygons.is_empty() {
            return Err(LandCoverError::Geometry("Region has no polygons".to_string()));
        }

        let mut built = Vec::with_capacity(polygons.len());
        for (p, rings) in polygons.into_iter().enumerate() {
            if rings.is_empty() {
                return Err(LandCoverError::Geometry(format!("Polygon {} has no rings", p)));
            }

            let mut line_strings = Vec::with_capacity(rings.len());
            for (r, ring) in rings.into_iter().enumerate() {
                let ring = validate_ring(ring, p, r)?;
                line_strings.push(LineString::from(ring));
            }

            let mut line_strings = line_strings.into_iter();
            let exterior = line_strings.next().ok_or_else(|| {
                LandCoverError::Geometry(format!("Polygon {} has no exterior ring", p))
            })?;
            let polygon = Polygon::new(exterior, line_strings.collect());
            if polygon.unsigned_area() <= 0.0 {
                return Err(LandCoverError::Geometry(format!("Polygon {} has zero area", p)));
            }
            built.push(polygon);
        }

        let geometry = MultiPolygon::new(built);
        let rect = geometry
            .bounding_rect()
            .ok_or_else(|| LandCoverError::Geometry("Region is empty".to_string()))?;
        let bbox = BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        };
        let fingerprint = fingerprint_of(&geometry, crs);

        log::debug!(
            "Region of interest: {} polygon(s) in {}, bbox {:?}",
            geometry.0.len(),
            crs,
            bbox
        );

        Ok(Self { geometry, crs, bbox, fingerprint })
    }

    /// Single polygon with optional holes
    pub fn from_polygon(rings: Vec<Ring>, crs: Crs) -> LcResult<Self> {
        Self::new(vec![rings], crs)
    }

    /// Axis-aligned rectangle
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> LcResult<Self> {
        if !(min_x < max_x && min_y < max_y) {
            return Err(LandCoverError::Geometry(format!(
                "Invalid rectangle [{}, {}, {}, {}]",
                min_x, min_y, max_x, max_y
            )));
        }
        let ring = vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ];
        Self::from_polygon(vec![ring], crs)
    }

    /// Parse a GeoJSON `Polygon`, `MultiPolygon`, `Feature` or the first
    /// feature of a `FeatureCollection`
    pub fn from_geojson(json: &str, crs: Crs) -> LcResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| LandCoverError::Geometry(format!("Invalid GeoJSON: {}", e)))?;
        let polygons = polygons_from_geojson(&value)?;
        Self::new(polygons, crs)
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Stable identity of the geometry and CRS, used as a cache key
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        if x < self.bbox.min_x || x > self.bbox.max_x || y < self.bbox.min_y || y > self.bbox.max_y {
            return false;
        }
        self.geometry.contains(&Point::new(x, y))
    }

    /// Area of the region in m² (spherical for geographic CRSs)
    pub fn area_m2(&self) -> f64 {
        if self.crs.is_geographic() {
            self.geometry.chamberlain_duquette_unsigned_area()
        } else {
            self.geometry.unsigned_area()
        }
    }

    /// Inside intervals `[x0, x1)` of the horizontal line at `y`, one set per
    /// polygon (even-odd within a polygon, so holes are excluded)
    pub(crate) fn scanline_intervals(&self, y: f64) -> Vec<(f64, f64)> {
        let mut intervals = Vec::new();
        if y < self.bbox.min_y || y > self.bbox.max_y {
            return intervals;
        }

        for polygon in &self.geometry.0 {
            let mut crossings = Vec::new();
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                for line in ring.lines() {
                    let (a, b) = (line.start, line.end);
                    if (a.y <= y) != (b.y <= y) {
                        let t = (y - a.y) / (b.y - a.y);
                        crossings.push(a.x + t * (b.x - a.x));
                    }
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            intervals.extend(crossings.chunks_exact(2).map(|pair| (pair[0], pair[1])));
        }

        intervals
    }
}

fn validate_ring(mut ring: Ring, polygon: usize, index: usize) -> LcResult<Vec<Coord<f64>>> {
    let label = format!("Ring {} of polygon {}", index, polygon);

    if ring.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(LandCoverError::Geometry(format!("{} has non-finite coordinates", label)));
    }
    if ring.len() >= 2 && ring.first() != ring.last() {
        return Err(LandCoverError::Geometry(format!("{} is not closed", label)));
    }

    ring.dedup();
    if ring.len() < 4 {
        return Err(LandCoverError::Geometry(format!(
            "{} needs at least 4 positions, got {}",
            label,
            ring.len()
        )));
    }

    let coords: Vec<Coord<f64>> = ring.iter().map(|&(x, y)| Coord { x, y }).collect();
    if let Some((i, j)) = first_self_intersection(&coords) {
        return Err(LandCoverError::Geometry(format!(
            "{} intersects itself (segments {} and {})",
            label, i, j
        )));
    }

    Ok(coords)
}

/// First pair of non-adjacent ring segments that touch or cross
fn first_self_intersection(coords: &[Coord<f64>]) -> Option<(usize, usize)> {
    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (a, b) = (&segments[i], &segments[j]);
            let disjoint_boxes = a.start.x.max(a.end.x) < b.start.x.min(b.end.x)
                || b.start.x.max(b.end.x) < a.start.x.min(a.end.x)
                || a.start.y.max(a.end.y) < b.start.y.min(b.end.y)
                || b.start.y.max(b.end.y) < a.start.y.min(a.end.y);
            if !disjoint_boxes && a.intersects(b) {
                return Some((i, j));
            }
        }
    }
    None
}

fn fingerprint_of(geometry: &MultiPolygon<f64>, crs: Crs) -> u64 {
    let mut hasher = DefaultHasher::new();
    crs.hash(&mut hasher);
    for polygon in &geometry.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            ring.0.len().hash(&mut hasher);
            for coord in &ring.0 {
                coord.x.to_bits().hash(&mut hasher);
                coord.y.to_bits().hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

fn polygons_from_geojson(value: &Value) -> LcResult<Vec<Vec<Ring>>> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "Polygon" => Ok(vec![parse_polygon(coordinates(value)?)?]),
        "MultiPolygon" => coordinates(value)?
            .as_array()
            .ok_or_else(|| geojson_error("MultiPolygon coordinates must be an array"))?
            .iter()
            .map(parse_polygon)
            .collect(),
        "Feature" => {
            let geometry = value
                .get("geometry")
                .ok_or_else(|| geojson_error("Feature has no geometry"))?;
            polygons_from_geojson(geometry)
        }
        "FeatureCollection" => {
            let first = value
                .get("features")
                .and_then(Value::as_array)
                .and_then(|features| features.first())
                .ok_or_else(|| geojson_error("FeatureCollection has no features"))?;
            polygons_from_geojson(first)
        }
        "" => Err(geojson_error("missing \"type\" member")),
        other => Err(geojson_error(&format!("unsupported geometry type {}", other))),
    }
}

fn coordinates(value: &Value) -> LcResult<&Value> {
    value
        .get("coordinates")
        .ok_or_else(|| geojson_error("geometry has no coordinates"))
}

fn parse_polygon(value: &Value) -> LcResult<Vec<Ring>> {
    let rings = value
        .as_array()
        .ok_or_else(|| geojson_error("Polygon coordinates must be an array of rings"))?;
    rings
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| geojson_error("ring must be an array of positions"))?
                .iter()
                .map(parse_position)
                .collect()
        })
        .collect()
}

fn parse_position(value: &Value) -> LcResult<(f64, f64)> {
    let position = value
        .as_array()
        .filter(|p| p.len() >= 2)
        .ok_or_else(|| geojson_error("position must have at least two numbers"))?;
    match (position[0].as_f64(), position[1].as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(geojson_error("position members must be numbers")),
    }
}

fn geojson_error(message: &str) -> LandCoverError {
    LandCoverError::Geometry(format!("Invalid GeoJSON: {}", message))
}

use ndarray::Array2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// `EPSG:<code>` identifiers, compiled on first use
static EPSG_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Calendar year of a classification band
pub type Year = i32;

/// Raw land-cover code as stored in the classification raster
pub type RawCode = u16;

/// Semantic class index produced by a classification scheme
pub type ClassIndex = u16;

/// 2D grid of raw codes (rows x cols)
pub type CodeGrid = Array2<RawCode>;

/// 2D grid of semantic class indices (rows x cols)
pub type ClassGrid = Array2<ClassIndex>;

/// Coordinate reference system, identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    /// WGS 84 geographic coordinates
    pub const WGS84: Crs = Crs { epsg: 4326 };
    /// SIRGAS 2000 geographic coordinates (Brazil)
    pub const SIRGAS2000: Crs = Crs { epsg: 4674 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Parse an identifier of the form `EPSG:<code>` (case-insensitive)
    pub fn parse(identifier: &str) -> LcResult<Self> {
        let pattern = EPSG_PATTERN
            .get_or_init(|| Regex::new(r"^(?i)epsg:(\d{4,6})$"))
            .as_ref()
            .map_err(|e| LandCoverError::Config(format!("CRS pattern: {}", e)))?;

        let caps = pattern.captures(identifier.trim()).ok_or_else(|| {
            LandCoverError::Geometry(format!("Unsupported CRS identifier: {}", identifier))
        })?;
        let epsg = caps[1].parse::<u32>().map_err(|e| {
            LandCoverError::Geometry(format!("Invalid EPSG code in {}: {}", identifier, e))
        })?;

        Ok(Self { epsg })
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4674 | 4618 | 4989 | 4269)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Geospatial bounding box, in the units of the owning CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Affine geotransform of a north-up grid (GDAL coefficient order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation; `pixel_height` is usually negative
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (x, y)
    }

    /// Fractional (col, row) of map coordinates; `None` for a singular transform
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation_x != 0.0 || self.rotation_y != 0.0
    }

    /// Bit pattern of the coefficients, for use in hash keys
    pub(crate) fn key_bits(&self) -> [u64; 6] {
        [
            self.top_left_x.to_bits(),
            self.pixel_width.to_bits(),
            self.rotation_x.to_bits(),
            self.top_left_y.to_bits(),
            self.rotation_y.to_bits(),
            self.pixel_height.to_bits(),
        ]
    }
}

/// Error categories reported to callers for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigError,
    GeometryError,
    DataUnavailableError,
    ComputationError,
    ExternalServiceError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::GeometryError => "GeometryError",
            ErrorKind::DataUnavailableError => "DataUnavailableError",
            ErrorKind::ComputationError => "ComputationError",
            ErrorKind::ExternalServiceError => "ExternalServiceError",
        };
        write!(f, "{}", name)
    }
}

/// Error types for land-cover processing
#[derive(Debug, thiserror::Error)]
pub enum LandCoverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Data unavailable for year {year}")]
    DataUnavailable { year: Year },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("External service error for year {year}: {reason}")]
    ExternalService { year: Year, reason: String },

    #[error("Raw code {code} is not part of the classification scheme")]
    UnmappedCode { code: RawCode },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl LandCoverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LandCoverError::Config(_) | LandCoverError::Json(_) => ErrorKind::ConfigError,
            LandCoverError::Geometry(_) => ErrorKind::GeometryError,
            LandCoverError::DataUnavailable { .. } => ErrorKind::DataUnavailableError,
            LandCoverError::Computation(_) | LandCoverError::UnmappedCode { .. } => {
                ErrorKind::ComputationError
            }
            LandCoverError::ExternalService { .. } | LandCoverError::Io(_) => {
                ErrorKind::ExternalServiceError
            }
            #[cfg(feature = "gdal")]
            LandCoverError::Gdal(_) => ErrorKind::ExternalServiceError,
        }
    }
}

/// Result type for land-cover operations
pub type LcResult<T> = Result<T, LandCoverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_parse() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap(), Crs::WGS84);
        assert_eq!(Crs::parse(" epsg:31983 ").unwrap().epsg, 31983);
        assert!(Crs::parse("WGS84").is_err());
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::from_epsg(31983).is_geographic());
    }

    #[test]
    fn test_crs_parse_repeated() {
        for identifier in ["EPSG:4674", "epsg:4674", "Epsg:4674"] {
            assert_eq!(Crs::parse(identifier).unwrap(), Crs::SIRGAS2000);
        }
        assert!(Crs::parse("EPSG:12").is_err());
        assert!(Crs::parse("EPSG:4674 ").is_ok());
    }

    #[test]
    fn test_to_pixel_inverts_transform() {
        let gt = GeoTransform::from_gdal([100.0, 30.0, 5.0, 200.0, -4.0, -30.0]);
        let (x, y) = gt.pixel_center(3, 7);
        let (col, row) = gt.to_pixel(x, y).unwrap();
        assert!((col - 7.5).abs() < 1e-9);
        assert!((row - 3.5).abs() < 1e-9);
        assert!(GeoTransform::north_up(0.0, 0.0, 0.0, -30.0).to_pixel(1.0, 1.0).is_none());
    }

    #[test]
    fn test_pixel_center() {
        let gt = GeoTransform::north_up(100.0, 200.0, 30.0, -30.0);
        assert_eq!(gt.pixel_center(0, 0), (115.0, 185.0));
        assert_eq!(gt.pixel_center(2, 1), (145.0, 125.0));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LandCoverError::DataUnavailable { year: 2021 }.kind(),
            ErrorKind::DataUnavailableError
        );
        assert_eq!(
            LandCoverError::UnmappedCode { code: 99 }.kind(),
            ErrorKind::ComputationError
        );
    }
}

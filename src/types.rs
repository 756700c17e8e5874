use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// 2D raster band (rows x columns)
pub type Band = Array2<f64>;

/// CRS every input is expected to carry
pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";

/// Geographic envelope of a raster or target grid, in CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L={} T={} R={} B={}",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Affine transform parameters in GDAL coefficient order
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
    /// North-up transform with square-or-not pixels and no rotation
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self {
            top_left_x: coefficients[0],
            pixel_width: coefficients[1],
            rotation_x: coefficients[2],
            top_left_y: coefficients[3],
            rotation_y: coefficients[4],
            pixel_height: coefficients[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation_x != 0.0 || self.rotation_y != 0.0
    }

    /// Envelope covered by a `width` x `height` raster
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let x_end = self.top_left_x + self.pixel_width * width as f64;
        let y_end = self.top_left_y + self.pixel_height * height as f64;
        Bounds {
            left: self.top_left_x.min(x_end),
            top: self.top_left_y.max(y_end),
            right: self.top_left_x.max(x_end),
            bottom: self.top_left_y.min(y_end),
        }
    }

    /// Pixel size as positive (x, y) degrees
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }
}

/// Error types for raster comparison
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("No input datasets were provided")]
    NoDatasets,

    #[error("Invalid target resolution: {0} (must be positive and finite)")]
    InvalidResolution(f64),

    #[error("Datasets do not overlap: intersection L={left} T={top} R={right} B={bottom} is empty")]
    EnvelopeDegenerate {
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
    },

    #[error("Coordinate ({x}, {y}) lies outside the extent of dataset '{dataset}'")]
    OutOfBoundsLookup { dataset: String, x: f64, y: f64 },

    #[error("Log transform requires the DropNonPositive mask policy, got {0}")]
    UndefinedLogarithm(crate::core::statistics::MaskPolicy),

    #[error("Array length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Invalid normalization: {0}")]
    InvalidNormalization(String),

    #[error("Invalid raster metadata: {0}")]
    InvalidMetadata(String),
}

/// Result type for comparison operations
pub type CompareResult<T> = Result<T, CompareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_up_bounds() {
        let transform = GeoTransform::north_up(-9.5, 44.0, 0.5, 0.25);
        let bounds = transform.bounds(10, 8);

        assert_eq!(bounds, Bounds::new(-9.5, 44.0, -4.5, 42.0));
        assert_eq!(transform.resolution(), (0.5, 0.25));
        assert!(!transform.is_rotated());
    }

    #[test]
    fn test_gdal_round_trip_order() {
        let coefficients = [1.0, 0.1, 0.0, 5.0, 0.0, -0.1];
        let transform = GeoTransform::from_gdal(coefficients);
        assert_eq!(transform.top_left_y, 5.0);
        assert_eq!(transform.to_gdal(), coefficients);
    }
}

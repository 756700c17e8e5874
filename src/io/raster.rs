use crate::types::{Band, Bounds, CompareError, CompareResult, GeoTransform};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Fraction of a pixel tolerated when snapping coordinates onto the native grid
const PIXEL_TOLERANCE: f64 = 1e-6;

/// Read-only access to one georeferenced input grid
///
/// Implementors expose the metadata the consistency checker compares, the
/// coordinate to pixel lookup used by the aligner, and raw band values.
pub trait RasterHandle {
    /// Human-readable dataset name used in warnings and errors
    fn name(&self) -> &str;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn geo_transform(&self) -> GeoTransform;

    /// 1-based band identifiers, in file order
    fn band_indexes(&self) -> Vec<usize>;

    /// CRS identifier such as `"EPSG:4326"`, or `None` when it cannot be read
    fn crs(&self) -> Option<String>;

    /// Read one full band as a `(height, width)` array
    fn read_band(&self, band_index: usize) -> CompareResult<Band>;

    fn bounds(&self) -> Bounds {
        self.geo_transform().bounds(self.width(), self.height())
    }

    /// Pixel size in CRS units per pixel (x, y)
    fn resolution(&self) -> (f64, f64) {
        self.geo_transform().resolution()
    }

    /// Map a geographic coordinate to the `(row, col)` of the native cell containing it
    fn index(&self, x: f64, y: f64) -> CompareResult<(usize, usize)> {
        pixel_index(&self.geo_transform(), self.width(), self.height(), x, y).ok_or_else(|| {
            CompareError::OutOfBoundsLookup {
                dataset: self.name().to_string(),
                x,
                y,
            }
        })
    }
}

/// Nearest-cell lookup through an affine transform.
///
/// Cells are half-open except on the far right/bottom edge, where a point
/// lying exactly on the envelope boundary belongs to the last pixel.
pub fn pixel_index(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> Option<(usize, usize)> {
    if width == 0 || height == 0 {
        return None;
    }

    let col = (x - transform.top_left_x) / transform.pixel_width;
    let row = (y - transform.top_left_y) / transform.pixel_height;

    if !col.is_finite() || !row.is_finite() {
        return None;
    }
    if col < -PIXEL_TOLERANCE
        || row < -PIXEL_TOLERANCE
        || col > width as f64 + PIXEL_TOLERANCE
        || row > height as f64 + PIXEL_TOLERANCE
    {
        return None;
    }

    let col = ((col + PIXEL_TOLERANCE).floor().max(0.0) as usize).min(width - 1);
    let row = ((row + PIXEL_TOLERANCE).floor().max(0.0) as usize).min(height - 1);
    Some((row, col))
}

/// In-memory raster built from owned bands
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    name: String,
    transform: GeoTransform,
    bands: Vec<Band>,
    crs: Option<String>,
}

impl MemoryRaster {
    /// Create a single-band raster in the geographic CRS
    pub fn new(name: impl Into<String>, transform: GeoTransform, band: Band) -> CompareResult<Self> {
        if transform.is_rotated() {
            return Err(CompareError::InvalidMetadata(
                "rotated geotransforms are not supported".to_string(),
            ));
        }
        let (height, width) = band.dim();
        if width == 0 || height == 0 {
            return Err(CompareError::InvalidMetadata(format!(
                "band has invalid dimensions: {}x{}",
                width, height
            )));
        }

        Ok(Self {
            name: name.into(),
            transform,
            bands: vec![band],
            crs: Some(crate::types::GEOGRAPHIC_CRS.to_string()),
        })
    }

    /// Build a north-up raster from row-major values
    pub fn from_rows(
        name: impl Into<String>,
        bounds_origin: (f64, f64),
        resolution: f64,
        shape: (usize, usize),
        values: Vec<f64>,
    ) -> CompareResult<Self> {
        let band = Array2::from_shape_vec(shape, values)?;
        let transform =
            GeoTransform::north_up(bounds_origin.0, bounds_origin.1, resolution, resolution);
        Self::new(name, transform, band)
    }

    pub fn with_crs(mut self, crs: Option<&str>) -> Self {
        self.crs = crs.map(str::to_string);
        self
    }

    /// Append a band; it must match the shape of the existing ones
    pub fn push_band(&mut self, band: Band) -> CompareResult<()> {
        let expected = self.bands[0].dim();
        if band.dim() != expected {
            return Err(CompareError::InvalidMetadata(format!(
                "band shape {:?} does not match raster shape {:?}",
                band.dim(),
                expected
            )));
        }
        self.bands.push(band);
        Ok(())
    }
}

impl RasterHandle for MemoryRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.bands[0].ncols()
    }

    fn height(&self) -> usize {
        self.bands[0].nrows()
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn band_indexes(&self) -> Vec<usize> {
        (1..=self.bands.len()).collect()
    }

    fn crs(&self) -> Option<String> {
        self.crs.clone()
    }

    fn read_band(&self, band_index: usize) -> CompareResult<Band> {
        band_index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .cloned()
            .ok_or_else(|| {
                CompareError::InvalidMetadata(format!(
                    "band {} does not exist in '{}'",
                    band_index, self.name
                ))
            })
    }
}

/// GDAL-backed raster handle
pub struct GdalRaster {
    name: String,
    path: PathBuf,
    dataset: Dataset,
    transform: GeoTransform,
    width: usize,
    height: usize,
    band_count: usize,
    crs: Option<String>,
}

impl GdalRaster {
    /// Open a raster file and read its metadata
    pub fn open<P: AsRef<Path>>(path: P) -> CompareResult<Self> {
        log::info!("Opening raster: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let band_count = dataset.raster_count().max(0) as usize;

        if transform.is_rotated() {
            return Err(CompareError::InvalidMetadata(format!(
                "{} has a rotated geotransform",
                path.as_ref().display()
            )));
        }

        let crs = Self::read_crs(&dataset);

        log::debug!("Raster size: {}x{}, {} band(s)", width, height, band_count);
        log::debug!("Geotransform: {:?}", transform);
        log::debug!("CRS: {:?}", crs);

        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.as_ref().display().to_string());

        Ok(Self {
            name,
            path: path.as_ref().to_path_buf(),
            dataset,
            transform,
            width,
            height,
            band_count,
            crs,
        })
    }

    /// Override the name reported in warnings
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_crs(dataset: &Dataset) -> Option<String> {
        match dataset.spatial_ref() {
            Ok(spatial_ref) => crs_identifier(spatial_ref),
            Err(e) => {
                log::debug!("No spatial reference available: {}", e);
                None
            }
        }
    }
}

/// `AUTHORITY:CODE` of a spatial reference, identifying the EPSG code when the
/// definition carries no authority of its own
pub fn crs_identifier(mut spatial_ref: SpatialRef) -> Option<String> {
    if spatial_ref.auth_code().is_err() {
        if let Err(e) = spatial_ref.auto_identify_epsg() {
            log::debug!("Spatial reference matches no EPSG code: {}", e);
            return None;
        }
    }

    match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        (Ok(authority), Ok(code)) => Some(format!("{}:{}", authority.to_uppercase(), code)),
        _ => {
            log::debug!("Spatial reference has no authority code");
            None
        }
    }
}

impl RasterHandle for GdalRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn band_indexes(&self) -> Vec<usize> {
        (1..=self.band_count).collect()
    }

    fn crs(&self) -> Option<String> {
        self.crs.clone()
    }

    fn read_band(&self, band_index: usize) -> CompareResult<Band> {
        if band_index == 0 || band_index > self.band_count {
            return Err(CompareError::InvalidMetadata(format!(
                "band {} does not exist in '{}'",
                band_index, self.name
            )));
        }

        log::debug!("Reading band {} of {}", band_index, self.name);
        let rasterband = self.dataset.rasterband(band_index as isize)?;
        let buffer = rasterband.read_as::<f64>(
            (0, 0),
            (self.width, self.height),
            (self.width, self.height),
            None,
        )?;

        Ok(Array2::from_shape_vec((self.height, self.width), buffer.data)?)
    }
}

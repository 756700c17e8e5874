//! Raster input: the handle trait plus GDAL-backed and in-memory implementations

pub mod raster;

pub use raster::{crs_identifier, pixel_index, GdalRaster, MemoryRaster, RasterHandle};

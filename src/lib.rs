//! nightpop: grid alignment and masked correlation of night-light and population rasters
//!
//! Rasters from different providers cover the same region at different
//! resolutions and origins. This library checks that they are comparable,
//! resamples them onto one common grid over the intersection of their
//! footprints, and correlates every pair under several data-cleaning
//! policies, handing diagnostic chart data to a pluggable sink.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{Band, Bounds, CompareError, CompareResult, GeoTransform, GEOGRAPHIC_CRS};

pub use io::{GdalRaster, MemoryRaster, RasterHandle};

pub use crate::core::{
    AlignedGrid, Alignment, AlignmentParams, ComparisonConfig, ComparisonPipeline,
    ComparisonReport, ConsistencyChecker, CorrelationResult, GridAligner, GridMode, MaskPolicy,
    MaskScope, MaskedStatistics, MetadataWarning, StatisticsRequest, TargetEnvelope,
    VisualizationSink,
};

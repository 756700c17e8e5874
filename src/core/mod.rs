//! Core comparison modules

pub mod consistency;
pub mod envelope;
pub mod alignment;
pub mod statistics;
pub mod normalize;
pub mod visualize;
pub mod pipeline;

// Re-export main types
pub use consistency::{ConsistencyChecker, MetadataAttribute, MetadataWarning};
pub use envelope::{intersection, EnvelopeWarning, GridMode, TargetEnvelope, DEFAULT_RESOLUTION};
pub use alignment::{AlignedGrid, Alignment, AlignmentParams, GridAligner, OutOfBoundsPolicy};
pub use statistics::{
    apply_mask, correlate, exclusion_mask, pearson, CorrelationResult, MaskPolicy, MaskScope,
    MaskedStatistics, StatisticsRequest,
};
pub use normalize::{percentile, Normalization};
pub use visualize::{
    DensityPlot, DiagnosticPlots, HistogramPlot, LoggingSink, NormalizedView, PlotLabels, RecordedPlot,
    RecordingSink, ScatterPlot, ScatterSeries, Series, VisualizationSink, PALETTE,
};
pub use pipeline::{ComparisonConfig, ComparisonPipeline, ComparisonReport};

use crate::core::alignment::{AlignmentParams, GridAligner};
use crate::core::consistency::{ConsistencyChecker, MetadataWarning};
use crate::core::envelope::{EnvelopeWarning, TargetEnvelope};
use crate::core::statistics::{
    CorrelationResult, MaskPolicy, MaskScope, MaskedStatistics, StatisticsRequest,
};
use crate::core::visualize::{DiagnosticPlots, VisualizationSink};
use crate::io::RasterHandle;
use crate::types::{CompareResult, GEOGRAPHIC_CRS};
use serde::{Deserialize, Serialize};

/// Configuration of one comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub alignment: AlignmentParams,
    /// CRS identifier every input should carry
    pub expected_crs: String,
    /// Correlation tables to compute, in order
    pub requests: Vec<StatisticsRequest>,
    pub scope: MaskScope,
    /// Explicit `(a, b)` dataset index pairs; every unordered pair when `None`
    pub pairs: Option<Vec<(usize, usize)>>,
    /// Diagnostic charts; `None` skips the visualization stage
    pub plots: Option<DiagnosticPlots>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentParams::default(),
            expected_crs: GEOGRAPHIC_CRS.to_string(),
            requests: vec![
                StatisticsRequest::new(MaskPolicy::KeepAll, false),
                StatisticsRequest::new(MaskPolicy::DropNegative, false),
                StatisticsRequest::new(MaskPolicy::DropNonPositive, false),
                StatisticsRequest::new(MaskPolicy::DropNonPositive, true),
            ],
            scope: MaskScope::Pairwise,
            pairs: None,
            plots: Some(DiagnosticPlots::default()),
        }
    }
}

impl ComparisonConfig {
    /// Pairs crossing two families passed back to back: the first `first`
    /// datasets against the following `second` ones (e.g. night-light x population)
    pub fn cross_pairs(first: usize, second: usize) -> Vec<(usize, usize)> {
        (0..first)
            .flat_map(|a| (first..first + second).map(move |b| (a, b)))
            .collect()
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub metadata_warnings: Vec<MetadataWarning>,
    pub envelope: TargetEnvelope,
    pub envelope_warnings: Vec<EnvelopeWarning>,
    pub correlations: Vec<CorrelationResult>,
}

impl ComparisonReport {
    /// Coefficient of the datasets at positions `a` and `b` under `request`, in either order
    pub fn coefficient_at(&self, a: usize, b: usize, request: StatisticsRequest) -> Option<f64> {
        self.correlations
            .iter()
            .find(|r| {
                r.policy == request.policy
                    && r.log_transform == request.log_transform
                    && ((r.index_a == a && r.index_b == b) || (r.index_a == b && r.index_b == a))
            })
            .map(|r| r.coefficient)
    }

    /// Coefficient of `(a, b)` under `request`, in either order, looked up by name.
    /// With repeated names the first matching entry wins; use [`Self::coefficient_at`] then.
    pub fn coefficient(&self, a: &str, b: &str, request: StatisticsRequest) -> Option<f64> {
        self.correlations
            .iter()
            .find(|r| {
                r.policy == request.policy
                    && r.log_transform == request.log_transform
                    && ((r.dataset_a == a && r.dataset_b == b)
                        || (r.dataset_a == b && r.dataset_b == a))
            })
            .map(|r| r.coefficient)
    }

    /// Print the correlation tables through the logger
    pub fn log_summary(&self) {
        let mut current: Option<(MaskPolicy, bool)> = None;
        for result in &self.correlations {
            let key = (result.policy, result.log_transform);
            if current != Some(key) {
                log::info!(
                    "Pearson coeff. ({}):",
                    StatisticsRequest::new(result.policy, result.log_transform)
                );
                current = Some(key);
            }
            log::info!(
                "{}-{} = {:4.3} ({} samples)",
                result.dataset_a,
                result.dataset_b,
                result.coefficient,
                result.samples
            );
        }
    }
}

/// Check, align, correlate and plot a collection of rasters
#[derive(Debug, Clone, Default)]
pub struct ComparisonPipeline {
    config: ComparisonConfig,
}

impl ComparisonPipeline {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    pub fn run(
        &self,
        datasets: &[&dyn RasterHandle],
        sink: &mut dyn VisualizationSink,
    ) -> CompareResult<ComparisonReport> {
        // fail before the expensive fill loop
        for request in &self.config.requests {
            request.validate()?;
        }

        log::info!("Checking the data...");
        let metadata_warnings = ConsistencyChecker::new(self.config.expected_crs.clone()).check(datasets);

        log::info!("Creating the new bands...");
        let alignment = GridAligner::new(self.config.alignment.clone()).align(datasets)?;

        let flattened: Vec<Vec<f64>> = alignment.grids.iter().map(|g| g.flatten()).collect();
        let series: Vec<(&str, &[f64])> = alignment
            .grids
            .iter()
            .zip(&flattened)
            .map(|(grid, values)| (grid.label.as_str(), values.as_slice()))
            .collect();

        for (k, (label, _)) in series.iter().enumerate() {
            if series[..k].iter().any(|(earlier, _)| earlier == label) {
                log::warn!(
                    "Dataset name {} is used more than once; refer to it by position",
                    label
                );
            }
        }

        let statistics = MaskedStatistics::new(&series)?;
        let pairs = self
            .config
            .pairs
            .clone()
            .unwrap_or_else(|| statistics.all_pairs());

        let mut correlations = Vec::with_capacity(pairs.len() * self.config.requests.len());
        for request in &self.config.requests {
            correlations.extend(statistics.table(&pairs, *request, self.config.scope)?);
        }

        let report = ComparisonReport {
            metadata_warnings,
            envelope: alignment.envelope,
            envelope_warnings: alignment.warnings,
            correlations,
        };
        report.log_summary();

        if let Some(plots) = &self.config.plots {
            log::info!("Drawing diagnostic charts...");
            plots.render(sink, &series, &pairs, &report.correlations)?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::visualize::{DensityPlot, RecordedPlot, RecordingSink};
    use crate::io::MemoryRaster;
    use crate::types::CompareError;
    use approx::assert_relative_eq;

    #[test]
    fn test_cross_pairs() {
        assert_eq!(
            ComparisonConfig::cross_pairs(2, 3),
            vec![(0, 2), (0, 3), (0, 4), (1, 2), (1, 3), (1, 4)]
        );
    }

    #[test]
    fn test_invalid_request_fails_before_alignment() {
        let a = MemoryRaster::from_rows("a", (0.0, 1.0), 0.5, (2, 2), vec![1.0; 4]).unwrap();
        let config = ComparisonConfig {
            requests: vec![StatisticsRequest::new(MaskPolicy::DropNegative, true)],
            ..Default::default()
        };
        let err = ComparisonPipeline::new(config)
            .run(&[&a], &mut RecordingSink::default())
            .unwrap_err();
        assert!(matches!(err, CompareError::UndefinedLogarithm(MaskPolicy::DropNegative)));
    }

    #[test]
    fn test_run_two_identical_grids() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, -1.0, 8.0];
        let a = MemoryRaster::from_rows("a", (0.0, 3.0), 1.0, (3, 3), values.clone()).unwrap();
        let b = MemoryRaster::from_rows("b", (0.0, 3.0), 1.0, (3, 3), values).unwrap();

        let config = ComparisonConfig {
            alignment: AlignmentParams {
                resolution: 1.0,
                mode: crate::core::envelope::GridMode::NativeShape,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut sink = RecordingSink::default();
        let report = ComparisonPipeline::new(config).run(&[&a, &b], &mut sink).unwrap();

        assert!(report.metadata_warnings.is_empty());
        assert_eq!(report.envelope.shape(), (3, 3));
        assert_eq!(report.correlations.len(), 4);
        for result in &report.correlations {
            assert_relative_eq!(result.coefficient, 1.0, epsilon = 1e-12);
        }

        let log_log = StatisticsRequest::new(MaskPolicy::DropNonPositive, true);
        assert_eq!(report.correlations[3].samples, 7);
        assert!(report.coefficient("b", "a", log_log).is_some());

        // two histograms, three scatters and a single log-log heatmap
        assert_eq!(sink.plots.len(), 6);
        assert!(matches!(sink.plots[5], RecordedPlot::Density(_)));
    }

    #[test]
    fn test_repeated_names_are_resolved_by_position() {
        let x: Vec<f64> = (1..=9).map(f64::from).collect();
        let y = vec![5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0];
        let squares: Vec<f64> = x.iter().map(|v| v * v).collect();

        let first = MemoryRaster::from_rows("pop.tif", (0.0, 3.0), 1.0, (3, 3), x.clone()).unwrap();
        let second = MemoryRaster::from_rows("pop.tif", (0.0, 3.0), 1.0, (3, 3), y.clone()).unwrap();
        let lights = MemoryRaster::from_rows("nl.tif", (0.0, 3.0), 1.0, (3, 3), squares).unwrap();

        let config = ComparisonConfig {
            alignment: AlignmentParams {
                resolution: 1.0,
                mode: crate::core::envelope::GridMode::NativeShape,
                ..Default::default()
            },
            pairs: Some(ComparisonConfig::cross_pairs(2, 1)),
            ..Default::default()
        };
        let mut sink = RecordingSink::default();
        let report = ComparisonPipeline::new(config)
            .run(&[&first, &second, &lights], &mut sink)
            .unwrap();

        let log_log = StatisticsRequest::new(MaskPolicy::DropNonPositive, true);
        let exact = report.coefficient_at(0, 2, log_log).unwrap();
        let scattered = report.coefficient_at(2, 1, log_log).unwrap();
        assert_relative_eq!(exact, 1.0, epsilon = 1e-12);
        assert!(scattered < 0.5);

        let densities: Vec<&DensityPlot> = sink
            .plots
            .iter()
            .filter_map(|p| match p {
                RecordedPlot::Density(plot) => Some(plot),
                _ => None,
            })
            .collect();
        assert_eq!(densities.len(), 2);

        let log10 = |values: &[f64]| -> Vec<f64> { values.iter().map(|v| v.log10()).collect() };
        assert_eq!(densities[0].labels.title, "BEST");
        assert_eq!(densities[0].x, log10(&x));
        assert_eq!(densities[1].labels.title, "WORST");
        assert_eq!(densities[1].x, log10(&y));
    }
}

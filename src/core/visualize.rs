use crate::core::normalize::Normalization;
use crate::core::statistics::{apply_mask, exclusion_mask, CorrelationResult, MaskPolicy};
use crate::types::{CompareError, CompareResult};
use serde::{Deserialize, Serialize};

/// Default series colours, cycled in input order
pub const PALETTE: [&str; 4] = ["k", "r", "b", "g"];

/// Descriptive chart text
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
}

impl PlotLabels {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
        }
    }
}

/// One labelled 1-D sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub color: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPlot {
    pub labels: PlotLabels,
    pub series: Vec<Series>,
    pub bins: usize,
    /// Relative frequency instead of counts
    pub density: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterSeries {
    pub label: String,
    pub color: String,
    pub alpha: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPlot {
    pub labels: PlotLabels,
    pub series: Vec<ScatterSeries>,
}

/// 2-D density heatmap with a count colour scale
#[derive(Debug, Clone, PartialEq)]
pub struct DensityPlot {
    pub labels: PlotLabels,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub bins: usize,
}

/// Renders charts from arrays prepared by the core
pub trait VisualizationSink {
    fn histogram(&mut self, plot: &HistogramPlot) -> CompareResult<()>;

    fn scatter(&mut self, plot: &ScatterPlot) -> CompareResult<()>;

    fn density(&mut self, plot: &DensityPlot) -> CompareResult<()>;
}

/// Sink that only logs what it was asked to draw
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

fn range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

impl VisualizationSink for LoggingSink {
    fn histogram(&mut self, plot: &HistogramPlot) -> CompareResult<()> {
        log::info!("Histogram '{}' ({} bins)", plot.labels.title, plot.bins);
        for series in &plot.series {
            let (lo, hi) = range(&series.values);
            log::info!("  {}: {} values in [{}, {}]", series.label, series.values.len(), lo, hi);
        }
        Ok(())
    }

    fn scatter(&mut self, plot: &ScatterPlot) -> CompareResult<()> {
        log::info!("Scatter '{}'", plot.labels.title);
        for series in &plot.series {
            log::info!("  {}: {} points", series.label, series.x.len());
        }
        Ok(())
    }

    fn density(&mut self, plot: &DensityPlot) -> CompareResult<()> {
        log::info!(
            "Density '{}' ({} bins, {} entries)",
            plot.labels.title,
            plot.bins,
            plot.x.len()
        );
        Ok(())
    }
}

/// Plot request captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPlot {
    Histogram(HistogramPlot),
    Scatter(ScatterPlot),
    Density(DensityPlot),
}

/// Sink that keeps every request in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub plots: Vec<RecordedPlot>,
}

impl VisualizationSink for RecordingSink {
    fn histogram(&mut self, plot: &HistogramPlot) -> CompareResult<()> {
        self.plots.push(RecordedPlot::Histogram(plot.clone()));
        Ok(())
    }

    fn scatter(&mut self, plot: &ScatterPlot) -> CompareResult<()> {
        self.plots.push(RecordedPlot::Scatter(plot.clone()));
        Ok(())
    }

    fn density(&mut self, plot: &DensityPlot) -> CompareResult<()> {
        self.plots.push(RecordedPlot::Density(plot.clone()));
        Ok(())
    }
}

/// Scatter of every pair after rescaling each grid onto [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedView {
    pub title: String,
    /// Cut-off rule per series in input order; series past the end use the full data range
    pub rules: Vec<Normalization>,
}

impl NormalizedView {
    pub fn new(title: impl Into<String>, rules: Vec<Normalization>) -> Self {
        Self {
            title: title.into(),
            rules,
        }
    }

    /// Rule applied to series `index`
    pub fn rule(&self, index: usize) -> Normalization {
        self.rules
            .get(index)
            .copied()
            .unwrap_or_else(Normalization::min_max)
    }
}

/// Builds the standard diagnostic chart set from flattened aligned grids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticPlots {
    pub histogram_bins: usize,
    pub density_bins: usize,
    pub scatter_alpha: f64,
    /// Normalized scatter charts, drawn in order
    pub normalizations: Vec<NormalizedView>,
}

impl Default for DiagnosticPlots {
    fn default() -> Self {
        Self {
            histogram_bins: 20,
            density_bins: 100,
            scatter_alpha: 0.1,
            normalizations: vec![NormalizedView::new("0-100%", Vec::new())],
        }
    }
}

impl DiagnosticPlots {
    /// Histograms of every grid under one mask shared by all of them
    pub fn histogram(
        &self,
        series: &[(&str, &[f64])],
        policy: MaskPolicy,
        labels: PlotLabels,
    ) -> CompareResult<HistogramPlot> {
        let arrays: Vec<&[f64]> = series.iter().map(|(_, values)| *values).collect();
        let mask = exclusion_mask(&arrays, policy)?;

        Ok(HistogramPlot {
            labels,
            series: series
                .iter()
                .enumerate()
                .map(|(k, (label, values))| Series {
                    label: label.to_string(),
                    color: PALETTE[k % PALETTE.len()].to_string(),
                    values: apply_mask(values, &mask),
                })
                .collect(),
            bins: self.histogram_bins,
            density: false,
        })
    }

    /// One scatter series per pair, each masked by its own two grids
    pub fn scatter(
        &self,
        series: &[(&str, &[f64])],
        pairs: &[(usize, usize)],
        policy: MaskPolicy,
        labels: PlotLabels,
    ) -> CompareResult<ScatterPlot> {
        let mut out = Vec::with_capacity(pairs.len());
        for (k, &(a, b)) in pairs.iter().enumerate() {
            let (label_a, x) = lookup_index(series, a)?;
            let (label_b, y) = lookup_index(series, b)?;
            let mask = exclusion_mask(&[x, y], policy)?;

            out.push(ScatterSeries {
                label: format!("{}-{}", label_a, label_b),
                color: PALETTE[k % PALETTE.len()].to_string(),
                alpha: self.scatter_alpha,
                x: apply_mask(x, &mask),
                y: apply_mask(y, &mask),
            });
        }

        Ok(ScatterPlot {
            labels,
            series: out,
        })
    }

    /// Scatter of every pair with each grid rescaled by its `view` rule.
    /// Cut-offs are taken over the unmasked grid.
    pub fn normalized_scatter(
        &self,
        series: &[(&str, &[f64])],
        pairs: &[(usize, usize)],
        view: &NormalizedView,
    ) -> CompareResult<ScatterPlot> {
        let scaled = series
            .iter()
            .enumerate()
            .map(|(k, (_, values))| view.rule(k).apply(values))
            .collect::<CompareResult<Vec<Vec<f64>>>>()?;
        let scaled_series: Vec<(&str, &[f64])> = series
            .iter()
            .zip(&scaled)
            .map(|((label, _), values)| (*label, values.as_slice()))
            .collect();

        self.scatter(
            &scaled_series,
            pairs,
            MaskPolicy::KeepAll,
            PlotLabels::new(view.title.as_str(), "value, normalized", "value, normalized"),
        )
    }

    /// Log10-log10 density of one pair over strictly positive cells
    pub fn log_density(
        &self,
        a: (&str, &[f64]),
        b: (&str, &[f64]),
        title: &str,
    ) -> CompareResult<DensityPlot> {
        let mask = exclusion_mask(&[a.1, b.1], MaskPolicy::DropNonPositive)?;
        let to_log = |values: &[f64]| -> Vec<f64> {
            apply_mask(values, &mask).into_iter().map(f64::log10).collect()
        };

        Ok(DensityPlot {
            labels: PlotLabels::new(title, format!("{}, log10", a.0), format!("{}, log10", b.0)),
            x: to_log(a.1),
            y: to_log(b.1),
            bins: self.density_bins,
        })
    }

    /// Send the standard set to `sink`:
    /// - count and relative-frequency histograms of cells free of nodata,
    /// - raw scatter of every pair, then the same over strictly positive cells,
    /// - one normalized scatter per entry of `normalizations`,
    /// - log-log heatmaps of the best and worst log-log correlated pairs in `correlations`.
    ///
    /// Correlations refer to `series` by position.
    pub fn render(
        &self,
        sink: &mut dyn VisualizationSink,
        series: &[(&str, &[f64])],
        pairs: &[(usize, usize)],
        correlations: &[CorrelationResult],
    ) -> CompareResult<()> {
        if series.is_empty() {
            return Ok(());
        }

        let counts = self.histogram(
            series,
            MaskPolicy::DropNegative,
            PlotLabels::new("data>=0", "value", "count"),
        )?;
        let mut frequencies = counts.clone();
        frequencies.labels.y_label = "rel. freq.".to_string();
        frequencies.density = true;
        sink.histogram(&counts)?;
        sink.histogram(&frequencies)?;

        sink.scatter(&self.scatter(
            series,
            pairs,
            MaskPolicy::KeepAll,
            PlotLabels::new("data, all", "value", "value"),
        )?)?;
        sink.scatter(&self.scatter(
            series,
            pairs,
            MaskPolicy::DropNonPositive,
            PlotLabels::new("data>0", "value", "value"),
        )?)?;

        for view in &self.normalizations {
            match self.normalized_scatter(series, pairs, view) {
                Ok(plot) => sink.scatter(&plot)?,
                Err(e) => log::warn!("Skipping normalized scatter '{}': {}", view.title, e),
            }
        }

        let mut log_log: Vec<&CorrelationResult> = correlations
            .iter()
            .filter(|r| r.log_transform && r.coefficient.is_finite())
            .collect();
        log_log.sort_by(|x, y| y.coefficient.total_cmp(&x.coefficient));

        let extremes = match (log_log.first(), log_log.last()) {
            (Some(best), Some(worst)) if log_log.len() > 1 => vec![("BEST", *best), ("WORST", *worst)],
            (Some(best), _) => vec![("BEST", *best)],
            _ => Vec::new(),
        };

        for (title, result) in extremes {
            let a = lookup_index(series, result.index_a)?;
            let b = lookup_index(series, result.index_b)?;
            sink.density(&self.log_density(a, b, title)?)?;
        }

        Ok(())
    }
}

fn lookup_index<'a>(series: &[(&'a str, &'a [f64])], index: usize) -> CompareResult<(&'a str, &'a [f64])> {
    series.get(index).copied().ok_or_else(|| {
        CompareError::InvalidMetadata(format!("no series at index {}", index))
    })
}

use crate::core::envelope::{EnvelopeWarning, GridMode, TargetEnvelope, DEFAULT_RESOLUTION};
use crate::io::RasterHandle;
use crate::types::{Band, CompareError, CompareResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// What to do when a target coordinate falls outside an input's extent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum OutOfBoundsPolicy {
    /// Abort the run with `OutOfBoundsLookup`
    #[default]
    Fail,
    /// Write the given nodata value and keep going
    SubstituteNodata(f64),
}

/// Grid alignment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentParams {
    /// Nominal target resolution (degrees per pixel)
    pub resolution: f64,
    /// Target grid layout
    pub mode: GridMode,
    /// Handling of lookups outside an input's native extent
    pub out_of_bounds: OutOfBoundsPolicy,
    /// Rows between progress notifications
    pub progress_interval: usize,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            mode: GridMode::Intersection,
            out_of_bounds: OutOfBoundsPolicy::Fail,
            progress_interval: 50,
        }
    }
}

/// One input resampled onto the target grid
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedGrid {
    pub label: String,
    pub data: Array2<f64>,
}

impl AlignedGrid {
    /// Row-major copy of the samples
    pub fn flatten(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Aligned stack sharing one envelope
#[derive(Debug, Clone)]
pub struct Alignment {
    pub envelope: TargetEnvelope,
    pub grids: Vec<AlignedGrid>,
    pub warnings: Vec<EnvelopeWarning>,
}

/// Resamples heterogeneous rasters onto the common target grid
#[derive(Debug, Clone, Default)]
pub struct GridAligner {
    params: AlignmentParams,
}

impl GridAligner {
    pub fn new(params: AlignmentParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AlignmentParams {
        &self.params
    }

    /// Align every dataset onto the intersection grid
    pub fn align(&self, datasets: &[&dyn RasterHandle]) -> CompareResult<Alignment> {
        self.align_with_progress(datasets, |_, _| {})
    }

    /// Align, reporting `(rows_done, total_rows)` every `progress_interval` rows and at the end
    pub fn align_with_progress<F>(
        &self,
        datasets: &[&dyn RasterHandle],
        mut progress: F,
    ) -> CompareResult<Alignment>
    where
        F: FnMut(usize, usize),
    {
        if datasets.is_empty() {
            return Err(CompareError::NoDatasets);
        }

        let (envelope, warnings) =
            TargetEnvelope::compute(datasets, self.params.resolution, self.params.mode)?;

        log::info!("Reading {} source band(s)", datasets.len());
        let bands = datasets
            .iter()
            .map(|dataset| read_first_band(*dataset))
            .collect::<CompareResult<Vec<Band>>>()?;

        log::info!(
            "Creating {} aligned band(s) of {}x{}",
            datasets.len(),
            envelope.width,
            envelope.height
        );
        let mut outputs: Vec<Array2<f64>> = (0..datasets.len())
            .map(|_| Array2::zeros(envelope.shape()))
            .collect();
        let mut substituted = vec![0usize; datasets.len()];

        let interval = self.params.progress_interval.max(1);
        for i in 0..envelope.height {
            for j in 0..envelope.width {
                let (x, y) = envelope.coordinate(i, j);

                for (k, dataset) in datasets.iter().enumerate() {
                    outputs[k][[i, j]] = match dataset.index(x, y) {
                        Ok((row, col)) => bands[k][[row, col]],
                        Err(e) => match self.params.out_of_bounds {
                            OutOfBoundsPolicy::Fail => return Err(e),
                            OutOfBoundsPolicy::SubstituteNodata(nodata) => {
                                substituted[k] += 1;
                                nodata
                            }
                        },
                    };
                }
            }

            let done = i + 1;
            if done % interval == 0 || done == envelope.height {
                log::info!(
                    "Progress... {:4.1}%",
                    done as f64 / envelope.height as f64 * 100.0
                );
                progress(done, envelope.height);
            }
        }

        for (dataset, count) in datasets.iter().zip(&substituted) {
            if *count > 0 {
                log::warn!(
                    "{} cell(s) outside {} were filled with nodata",
                    count,
                    dataset.name()
                );
            }
        }

        let grids = datasets
            .iter()
            .zip(outputs)
            .map(|(dataset, data)| AlignedGrid {
                label: dataset.name().to_string(),
                data,
            })
            .collect();

        Ok(Alignment {
            envelope,
            grids,
            warnings,
        })
    }
}

/// Read the first band and make sure it matches the advertised raster size
fn read_first_band(dataset: &dyn RasterHandle) -> CompareResult<Band> {
    let band_index = dataset.band_indexes().first().copied().ok_or_else(|| {
        CompareError::InvalidMetadata(format!("{} has no bands", dataset.name()))
    })?;

    let band = dataset.read_band(band_index)?;
    if band.dim() != (dataset.height(), dataset.width()) {
        return Err(CompareError::InvalidMetadata(format!(
            "band {} of {} is {:?}, expected {:?}",
            band_index,
            dataset.name(),
            band.dim(),
            (dataset.height(), dataset.width())
        )));
    }

    log::debug!("Read band {} of {}", band_index, dataset.name());
    Ok(band)
}

use crate::io::RasterHandle;
use crate::types::{Bounds, CompareError, CompareResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nominal target resolution: 30 arc-seconds
pub const DEFAULT_RESOLUTION: f64 = 1.0 / 120.0;

/// Upper limit on grid steps per axis
const MAX_GRID_STEPS: f64 = u32::MAX as f64;

/// How the target grid is laid over the common footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridMode {
    /// Span the full intersection; the effective resolution is back-computed
    /// so the outer grid nodes land on the envelope edges.
    #[default]
    Intersection,
    /// Keep the nominal resolution and take the smallest native width/height;
    /// right/bottom are derived and may overshoot the intersection.
    NativeShape,
}

/// Intersection footprint and its sampling grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetEnvelope {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub width: usize,
    pub height: usize,
}

/// Derived grid edge falling outside the tightest input bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeWarning {
    RightOvershoot { right: f64, limit: f64 },
    BottomOvershoot { bottom: f64, limit: f64 },
}

impl fmt::Display for EnvelopeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeWarning::RightOvershoot { right, limit } => write!(
                f,
                "right boundary exceeded: {:.6} > {:.6} (valid for east + north hemispheres only)",
                right, limit
            ),
            EnvelopeWarning::BottomOvershoot { bottom, limit } => write!(
                f,
                "bottom boundary exceeded: {:.6} < {:.6} (valid for east + north hemispheres only)",
                bottom, limit
            ),
        }
    }
}

/// Bounds and native size of one input
#[derive(Debug, Clone, Copy)]
struct Footprint {
    bounds: Bounds,
    width: usize,
    height: usize,
}

/// Intersection of all input bounds; fails when the inputs do not overlap
pub fn intersection(bounds: &[Bounds]) -> CompareResult<Bounds> {
    let first = bounds.first().ok_or(CompareError::NoDatasets)?;

    let common = bounds.iter().skip(1).fold(*first, |acc, b| Bounds {
        left: acc.left.max(b.left),
        top: acc.top.min(b.top),
        right: acc.right.min(b.right),
        bottom: acc.bottom.max(b.bottom),
    });

    if !(common.right > common.left) || !(common.top > common.bottom) {
        return Err(CompareError::EnvelopeDegenerate {
            left: common.left,
            top: common.top,
            right: common.right,
            bottom: common.bottom,
        });
    }

    Ok(common)
}

impl TargetEnvelope {
    /// Compute the target envelope of `datasets` at the nominal `resolution`
    pub fn compute(
        datasets: &[&dyn RasterHandle],
        resolution: f64,
        mode: GridMode,
    ) -> CompareResult<(Self, Vec<EnvelopeWarning>)> {
        let footprints: Vec<Footprint> = datasets
            .iter()
            .map(|d| Footprint {
                bounds: d.bounds(),
                width: d.width(),
                height: d.height(),
            })
            .collect();

        Self::from_footprints(&footprints, resolution, mode)
    }

    /// Grid spanning `bounds` exactly, with node spacing close to `resolution`
    pub fn fit_to_bounds(bounds: Bounds, resolution: f64) -> CompareResult<Self> {
        validate_resolution(resolution)?;
        if !(bounds.width() > 0.0) || !(bounds.height() > 0.0) {
            return Err(CompareError::EnvelopeDegenerate {
                left: bounds.left,
                top: bounds.top,
                right: bounds.right,
                bottom: bounds.bottom,
            });
        }

        let width = node_count(bounds.width(), resolution)?;
        let height = node_count(bounds.height(), resolution)?;

        Ok(Self {
            left: bounds.left,
            top: bounds.top,
            right: bounds.right,
            bottom: bounds.bottom,
            resolution_x: bounds.width() / (width - 1) as f64,
            resolution_y: bounds.height() / (height - 1) as f64,
            width,
            height,
        })
    }

    fn from_footprints(
        footprints: &[Footprint],
        resolution: f64,
        mode: GridMode,
    ) -> CompareResult<(Self, Vec<EnvelopeWarning>)> {
        validate_resolution(resolution)?;
        let bounds: Vec<Bounds> = footprints.iter().map(|f| f.bounds).collect();
        let common = intersection(&bounds)?;

        let mut warnings = Vec::new();
        let envelope = match mode {
            GridMode::Intersection => Self::fit_to_bounds(common, resolution)?,
            GridMode::NativeShape => {
                let width = footprints.iter().map(|f| f.width).min().unwrap_or(0);
                let height = footprints.iter().map(|f| f.height).min().unwrap_or(0);
                let right = common.left + width.saturating_sub(1) as f64 * resolution;
                let bottom = common.top - height.saturating_sub(1) as f64 * resolution;

                if right > common.right {
                    warnings.push(EnvelopeWarning::RightOvershoot {
                        right,
                        limit: common.right,
                    });
                }
                if bottom < common.bottom {
                    warnings.push(EnvelopeWarning::BottomOvershoot {
                        bottom,
                        limit: common.bottom,
                    });
                }

                Self {
                    left: common.left,
                    top: common.top,
                    right,
                    bottom,
                    resolution_x: resolution,
                    resolution_y: resolution,
                    width,
                    height,
                }
            }
        };

        for warning in &warnings {
            log::warn!("{}", warning);
        }
        log::info!(
            "Boundaries: L= {:6.3} T= {:6.3} R= {:6.3} B= {:6.3}",
            envelope.left,
            envelope.top,
            envelope.right,
            envelope.bottom
        );
        log::info!(
            "Resolution: x= {:8.6} y= {:8.6}",
            envelope.resolution_x,
            envelope.resolution_y
        );
        log::info!("Shape: w= {:4} h= {:4}", envelope.width, envelope.height);

        Ok((envelope, warnings))
    }

    /// Geographic coordinate of target cell `(row, col)`
    #[inline]
    pub fn coordinate(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.left + col as f64 * self.resolution_x,
            self.top - row as f64 * self.resolution_y,
        )
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.left, self.top, self.right, self.bottom)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

/// Nodes needed to span `extent` with steps of at most `resolution`, both ends included
fn node_count(extent: f64, resolution: f64) -> CompareResult<usize> {
    let steps = (extent / resolution).ceil();
    if !steps.is_finite() || steps >= MAX_GRID_STEPS {
        return Err(CompareError::InvalidResolution(resolution));
    }
    (steps as usize)
        .checked_add(1)
        .ok_or(CompareError::InvalidResolution(resolution))
}

fn validate_resolution(resolution: f64) -> CompareResult<()> {
    if resolution.is_finite() && resolution > 0.0 {
        Ok(())
    } else {
        Err(CompareError::InvalidResolution(resolution))
    }
}

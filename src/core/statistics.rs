use crate::types::{CompareError, CompareResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which cells are dropped before computing statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskPolicy {
    /// Use every cell
    KeepAll,
    /// Drop cells where any participating array is negative (nodata)
    DropNegative,
    /// Drop cells where any participating array is zero or negative
    DropNonPositive,
}

impl MaskPolicy {
    /// True when `value` is excluded under this policy. NaN never survives a dropping policy.
    #[inline]
    pub fn excludes(self, value: f64) -> bool {
        match self {
            MaskPolicy::KeepAll => false,
            MaskPolicy::DropNegative => !(value >= 0.0),
            MaskPolicy::DropNonPositive => !(value > 0.0),
        }
    }

    /// Whether every retained value is strictly positive
    pub fn guarantees_positive(self) -> bool {
        matches!(self, MaskPolicy::DropNonPositive)
    }
}

impl fmt::Display for MaskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskPolicy::KeepAll => write!(f, "KeepAll"),
            MaskPolicy::DropNegative => write!(f, "DropNegative"),
            MaskPolicy::DropNonPositive => write!(f, "DropNonPositive"),
        }
    }
}

/// Which arrays build the exclusion mask of a correlation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaskScope {
    /// Each pair is masked by its own two arrays
    #[default]
    Pairwise,
    /// One mask from every array in the table, shared by all pairs
    Joint,
}

/// Masking policy plus optional log10-log10 transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsRequest {
    pub policy: MaskPolicy,
    pub log_transform: bool,
}

impl StatisticsRequest {
    pub fn new(policy: MaskPolicy, log_transform: bool) -> Self {
        Self {
            policy,
            log_transform,
        }
    }

    /// Reject log transforms over policies that may retain zero or negative values
    pub fn validate(&self) -> CompareResult<()> {
        if self.log_transform && !self.policy.guarantees_positive() {
            return Err(CompareError::UndefinedLogarithm(self.policy));
        }
        Ok(())
    }
}

impl fmt::Display for StatisticsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.log_transform {
            write!(f, "{}, LOG-LOG", self.policy)
        } else {
            write!(f, "{}", self.policy)
        }
    }
}

/// Pearson coefficient of one pair of datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub dataset_a: String,
    pub dataset_b: String,
    /// Positions of the two datasets in the input collection
    pub index_a: usize,
    pub index_b: usize,
    pub policy: MaskPolicy,
    pub log_transform: bool,
    /// `NaN` when fewer than two paired samples survive masking
    pub coefficient: f64,
    /// Paired samples retained after masking
    pub samples: usize,
}

/// Build the exclusion mask over equally long arrays: `true` marks a dropped cell
pub fn exclusion_mask(arrays: &[&[f64]], policy: MaskPolicy) -> CompareResult<Vec<bool>> {
    let len = arrays.first().map(|a| a.len()).unwrap_or(0);
    check_lengths(arrays, len)?;

    if policy == MaskPolicy::KeepAll {
        return Ok(vec![false; len]);
    }

    Ok((0..len)
        .map(|i| arrays.iter().any(|a| policy.excludes(a[i])))
        .collect())
}

/// Keep the values whose mask entry is `false`
pub fn apply_mask(values: &[f64], mask: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(&v, &excluded)| (!excluded).then_some(v))
        .collect()
}

/// Pearson correlation coefficient of paired samples.
///
/// Returns `NaN` with fewer than two samples or when either series is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> CompareResult<f64> {
    if a.len() != b.len() {
        return Err(CompareError::LengthMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }
    Ok(pearson_unchecked(a, b))
}

fn pearson_unchecked(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n < 2 {
        return f64::NAN;
    }

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut variance_a = 0.0;
    let mut variance_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        variance_a += dx * dx;
        variance_b += dy * dy;
    }

    let denominator = (variance_a * variance_b).sqrt();
    if denominator == 0.0 {
        return f64::NAN;
    }
    (covariance / denominator).clamp(-1.0, 1.0)
}

/// Mask a pair, optionally move it to log10 space, and correlate it
fn masked_pair(a: &[f64], b: &[f64], mask: &[bool], log_transform: bool) -> (f64, usize) {
    let mut kept_a = apply_mask(a, mask);
    let mut kept_b = apply_mask(b, mask);

    if log_transform {
        kept_a.iter_mut().for_each(|v| *v = v.log10());
        kept_b.iter_mut().for_each(|v| *v = v.log10());
    }

    (pearson_unchecked(&kept_a, &kept_b), kept_a.len())
}

/// Correlate two flattened grids under `policy`
pub fn correlate(
    a: &[f64],
    b: &[f64],
    policy: MaskPolicy,
    log_transform: bool,
) -> CompareResult<f64> {
    let request = StatisticsRequest::new(policy, log_transform);
    request.validate()?;
    let mask = exclusion_mask(&[a, b], policy)?;
    Ok(masked_pair(a, b, &mask, log_transform).0)
}

fn check_lengths(arrays: &[&[f64]], expected: usize) -> CompareResult<()> {
    match arrays.iter().find(|a| a.len() != expected) {
        Some(a) => Err(CompareError::LengthMismatch {
            expected,
            found: a.len(),
        }),
        None => Ok(()),
    }
}

/// Masked correlation over a set of labelled, equally long, flattened grids
#[derive(Debug, Clone)]
pub struct MaskedStatistics<'a> {
    labels: Vec<&'a str>,
    series: Vec<&'a [f64]>,
}

impl<'a> MaskedStatistics<'a> {
    pub fn new(series: &[(&'a str, &'a [f64])]) -> CompareResult<Self> {
        let arrays: Vec<&[f64]> = series.iter().map(|(_, s)| *s).collect();
        check_lengths(&arrays, arrays.first().map(|s| s.len()).unwrap_or(0))?;

        Ok(Self {
            labels: series.iter().map(|(label, _)| *label).collect(),
            series: arrays,
        })
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Every unordered pair `(a, b)` with `a < b`, in input order
    pub fn all_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.series.len();
        (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
            .collect()
    }

    /// Number of paired samples of `(a, b)` that survive `policy`
    pub fn retained_samples(&self, a: usize, b: usize, policy: MaskPolicy) -> CompareResult<usize> {
        self.check_pair(a, b)?;
        let mask = exclusion_mask(&[self.series[a], self.series[b]], policy)?;
        Ok(mask.iter().filter(|&&excluded| !excluded).count())
    }

    /// Correlate one pair, masked by its own two arrays
    pub fn correlate(
        &self,
        a: usize,
        b: usize,
        request: StatisticsRequest,
    ) -> CompareResult<CorrelationResult> {
        request.validate()?;
        self.check_pair(a, b)?;
        Ok(self.pair_result(a, b, request, None))
    }

    /// Correlate every listed pair under `request`
    pub fn table(
        &self,
        pairs: &[(usize, usize)],
        request: StatisticsRequest,
        scope: MaskScope,
    ) -> CompareResult<Vec<CorrelationResult>> {
        request.validate()?;
        for &(a, b) in pairs {
            self.check_pair(a, b)?;
        }

        let joint_mask = match scope {
            MaskScope::Pairwise => None,
            MaskScope::Joint => Some(exclusion_mask(&self.series, request.policy)?),
        };

        log::debug!(
            "Computing {} correlation(s) ({}, {:?} mask)",
            pairs.len(),
            request,
            scope
        );
        Ok(self.compute_pairs(pairs, request, joint_mask.as_deref()))
    }

    #[cfg(feature = "parallel")]
    fn compute_pairs(
        &self,
        pairs: &[(usize, usize)],
        request: StatisticsRequest,
        joint_mask: Option<&[bool]>,
    ) -> Vec<CorrelationResult> {
        use rayon::prelude::*;

        pairs
            .par_iter()
            .map(|&(a, b)| self.pair_result(a, b, request, joint_mask))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_pairs(
        &self,
        pairs: &[(usize, usize)],
        request: StatisticsRequest,
        joint_mask: Option<&[bool]>,
    ) -> Vec<CorrelationResult> {
        pairs
            .iter()
            .map(|&(a, b)| self.pair_result(a, b, request, joint_mask))
            .collect()
    }

    fn pair_result(
        &self,
        a: usize,
        b: usize,
        request: StatisticsRequest,
        joint_mask: Option<&[bool]>,
    ) -> CorrelationResult {
        let (series_a, series_b) = (self.series[a], self.series[b]);

        let (coefficient, samples) = match joint_mask {
            Some(mask) => masked_pair(series_a, series_b, mask, request.log_transform),
            None => {
                let mask: Vec<bool> = series_a
                    .iter()
                    .zip(series_b)
                    .map(|(&x, &y)| request.policy.excludes(x) || request.policy.excludes(y))
                    .collect();
                masked_pair(series_a, series_b, &mask, request.log_transform)
            }
        };

        CorrelationResult {
            dataset_a: self.labels[a].to_string(),
            dataset_b: self.labels[b].to_string(),
            index_a: a,
            index_b: b,
            policy: request.policy,
            log_transform: request.log_transform,
            coefficient,
            samples,
        }
    }

    fn check_pair(&self, a: usize, b: usize) -> CompareResult<()> {
        let n = self.series.len();
        if a >= n || b >= n {
            return Err(CompareError::InvalidMetadata(format!(
                "pair ({}, {}) is out of range for {} series",
                a, b, n
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_REQUESTS: [(MaskPolicy, bool); 4] = [
        (MaskPolicy::KeepAll, false),
        (MaskPolicy::DropNegative, false),
        (MaskPolicy::DropNonPositive, false),
        (MaskPolicy::DropNonPositive, true),
    ];

    #[test]
    fn test_perfectly_linear_pair() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [10.0, 20.0, 30.0, 40.0];
        let r = correlate(&a, &b, MaskPolicy::KeepAll, false).unwrap();
        assert_relative_eq!(r, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_cell_dropped_from_both_arrays() {
        let a = [-1.0, 2.0, 3.0, 4.0];
        let b = [10.0, 20.0, 30.0, 40.0];

        let stats = MaskedStatistics::new(&[("A", &a[..]), ("B", &b[..])]).unwrap();
        let result = stats
            .correlate(0, 1, StatisticsRequest::new(MaskPolicy::DropNegative, false))
            .unwrap();

        assert_relative_eq!(result.coefficient, 1.0, epsilon = 1e-9);
        assert_eq!(result.samples, 3);
        assert_eq!(result.dataset_a, "A");
        assert_eq!(result.dataset_b, "B");
    }

    #[test]
    fn test_matches_reference_value() {
        // numpy.corrcoef([1, 2, 3, 4, 5], [2, 1, 4, 3, 5])[0, 1] == 0.8
        let r = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0]).unwrap();
        assert_relative_eq!(r, 0.8, epsilon = 1e-12);

        let r = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert_relative_eq!(r, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_log_correlation() {
        // b = 5 * a^2 is perfectly linear in log space
        let a = [0.0, 1.0, 2.0, 4.0, 8.0, -3.0];
        let b = [7.0, 5.0, 20.0, 80.0, 320.0, 2.0];
        let r = correlate(&a, &b, MaskPolicy::DropNonPositive, true).unwrap();
        assert_relative_eq!(r, 1.0, epsilon = 1e-9);

        let linear = correlate(&a, &b, MaskPolicy::DropNonPositive, false).unwrap();
        assert!(linear < 1.0 - 1e-6);
    }

    #[test]
    fn test_log_transform_requires_strict_positivity() {
        let a = [1.0, 2.0];
        for policy in [MaskPolicy::KeepAll, MaskPolicy::DropNegative] {
            let err = correlate(&a, &a, policy, true).unwrap_err();
            assert!(matches!(err, CompareError::UndefinedLogarithm(p) if p == policy));
        }
        assert!(correlate(&a, &a, MaskPolicy::DropNonPositive, true).is_ok());
    }

    #[test]
    fn test_insufficient_samples_is_nan() {
        let a = [-1.0, 0.0, 5.0];
        let b = [1.0, 2.0, 3.0];
        assert!(correlate(&a, &b, MaskPolicy::DropNonPositive, false)
            .unwrap()
            .is_nan());
        assert!(pearson(&[], &[]).unwrap().is_nan());
    }

    #[test]
    fn test_constant_series_is_nan() {
        assert!(pearson(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).unwrap().is_nan());
    }

    #[test]
    fn test_nan_cells_are_dropped() {
        let a = [f64::NAN, 1.0, 2.0, 3.0];
        let b = [4.0, 1.0, 2.0, 3.0];
        let mask = exclusion_mask(&[&a, &b], MaskPolicy::DropNegative).unwrap();
        assert_eq!(mask, vec![true, false, false, false]);
        assert!(correlate(&a, &b, MaskPolicy::KeepAll, false).unwrap().is_nan());
    }

    #[test]
    fn test_masking_never_adds_samples() {
        let a = [0.0, 1.0, -2.0, 3.0, 4.0, 0.0, 6.0];
        let b = [1.0, 0.0, 3.0, 4.0, -5.0, 6.0, 7.0];
        let stats = MaskedStatistics::new(&[("a", &a[..]), ("b", &b[..])]).unwrap();

        let all = stats.retained_samples(0, 1, MaskPolicy::KeepAll).unwrap();
        let negative = stats.retained_samples(0, 1, MaskPolicy::DropNegative).unwrap();
        let non_positive = stats.retained_samples(0, 1, MaskPolicy::DropNonPositive).unwrap();

        assert_eq!(all, 7);
        assert_eq!(negative, 5);
        assert_eq!(non_positive, 2);
    }

    #[test]
    fn test_correlation_is_symmetric() {
        let a: Vec<f64> = (0..50).map(|i| ((i * 37) % 11) as f64 - 1.0).collect();
        let b: Vec<f64> = (0..50).map(|i| ((i * 13) % 7) as f64 * 1.5).collect();
        let stats = MaskedStatistics::new(&[("a", &a[..]), ("b", &b[..])]).unwrap();

        for (policy, log_transform) in ALL_REQUESTS {
            let request = StatisticsRequest::new(policy, log_transform);
            let ab = stats.correlate(0, 1, request).unwrap();
            let ba = stats.correlate(1, 0, request).unwrap();
            assert_relative_eq!(ab.coefficient, ba.coefficient, epsilon = 1e-12);
            assert_eq!(ab.samples, ba.samples);
        }
    }

    #[test]
    fn test_joint_mask_drops_cells_invalid_anywhere() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let c = [1.0, -1.0, 1.0, 1.0, 1.0];
        let stats = MaskedStatistics::new(&[("a", &a[..]), ("b", &b[..]), ("c", &c[..])]).unwrap();
        let request = StatisticsRequest::new(MaskPolicy::DropNegative, false);

        let pairwise = stats.table(&[(0, 1)], request, MaskScope::Pairwise).unwrap();
        let joint = stats.table(&[(0, 1)], request, MaskScope::Joint).unwrap();

        assert_eq!(pairwise[0].samples, 5);
        assert_eq!(joint[0].samples, 4);
        assert_relative_eq!(joint[0].coefficient, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_pairs_order() {
        let x = [1.0, 2.0];
        let stats =
            MaskedStatistics::new(&[("a", &x[..]), ("b", &x[..]), ("c", &x[..])]).unwrap();
        assert_eq!(stats.all_pairs(), vec![(0, 1), (0, 2), (1, 2)]);

        let table = stats
            .table(
                &stats.all_pairs(),
                StatisticsRequest::new(MaskPolicy::KeepAll, false),
                MaskScope::Pairwise,
            )
            .unwrap();
        let names: Vec<(&str, &str)> = table
            .iter()
            .map(|r| (r.dataset_a.as_str(), r.dataset_b.as_str()))
            .collect();
        assert_eq!(names, vec![("a", "b"), ("a", "c"), ("b", "c")]);
        let positions: Vec<(usize, usize)> = table.iter().map(|r| (r.index_a, r.index_b)).collect();
        assert_eq!(positions, stats.all_pairs());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        assert!(matches!(
            MaskedStatistics::new(&[("a", &a[..]), ("b", &b[..])]),
            Err(CompareError::LengthMismatch { expected: 3, found: 2 })
        ));
        assert!(pearson(&a, &b).is_err());
    }

    #[test]
    fn test_pair_out_of_range() {
        let a = [1.0, 2.0, 3.0];
        let stats = MaskedStatistics::new(&[("a", &a[..])]).unwrap();
        assert!(stats
            .correlate(0, 1, StatisticsRequest::new(MaskPolicy::KeepAll, false))
            .is_err());
    }
}

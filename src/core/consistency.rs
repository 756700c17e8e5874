use crate::io::RasterHandle;
use crate::types::GEOGRAPHIC_CRS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata attribute compared across input rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataAttribute {
    Bounds,
    Width,
    Height,
    /// First band index
    BandIndex,
    /// Full pixel array shape (bands, rows, columns)
    Shape,
}

impl fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataAttribute::Bounds => write!(f, "bounds"),
            MetadataAttribute::Width => write!(f, "widths"),
            MetadataAttribute::Height => write!(f, "heights"),
            MetadataAttribute::BandIndex => write!(f, "bands"),
            MetadataAttribute::Shape => write!(f, "shapes"),
        }
    }
}

/// Non-fatal finding of the consistency check
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataWarning {
    /// Attribute differs between datasets; `values` lists every dataset's value
    Mismatch {
        attribute: MetadataAttribute,
        values: Vec<(String, String)>,
    },
    /// CRS could not be read from the dataset
    CrsUnavailable { dataset: String },
    /// CRS was read but is not the expected one
    UnexpectedCrs {
        dataset: String,
        found: String,
        expected: String,
    },
}

impl fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataWarning::Mismatch { attribute, values } => {
                write!(f, "{} are not the same:", attribute)?;
                for (dataset, value) in values {
                    write!(f, " [{}: {}]", dataset, value)?;
                }
                Ok(())
            }
            MetadataWarning::CrsUnavailable { dataset } => {
                write!(f, "CRS is not available for {}", dataset)
            }
            MetadataWarning::UnexpectedCrs {
                dataset,
                found,
                expected,
            } => write!(f, "CRS of {} is {}, expected {}", dataset, found, expected),
        }
    }
}

/// Compares metadata across a collection of rasters and reports mismatches.
///
/// Every check is advisory: the checker never fails, it only returns (and logs)
/// the warnings it found.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    expected_crs: String,
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self::new(GEOGRAPHIC_CRS)
    }
}

impl ConsistencyChecker {
    pub fn new(expected_crs: impl Into<String>) -> Self {
        Self {
            expected_crs: expected_crs.into(),
        }
    }

    pub fn expected_crs(&self) -> &str {
        &self.expected_crs
    }

    /// Run every check over `datasets` and return the warnings in check order
    pub fn check(&self, datasets: &[&dyn RasterHandle]) -> Vec<MetadataWarning> {
        log::info!("Checking metadata of {} dataset(s)", datasets.len());

        let mut warnings = Vec::new();

        warnings.extend(compare(datasets, MetadataAttribute::Bounds, |d| d.bounds()));
        warnings.extend(compare(datasets, MetadataAttribute::Width, |d| d.width()));
        warnings.extend(compare(datasets, MetadataAttribute::Height, |d| d.height()));
        warnings.extend(compare(datasets, MetadataAttribute::BandIndex, |d| {
            BandIndex(d.band_indexes().first().copied())
        }));
        warnings.extend(compare(datasets, MetadataAttribute::Shape, |d| {
            Shape(d.band_indexes().len(), d.height(), d.width())
        }));
        warnings.extend(self.check_crs(datasets));

        for warning in &warnings {
            log::warn!("{}", warning);
        }
        if warnings.is_empty() {
            log::info!("All datasets share bounds, size, bands and CRS");
        }

        warnings
    }

    fn check_crs(&self, datasets: &[&dyn RasterHandle]) -> Vec<MetadataWarning> {
        datasets
            .iter()
            .filter_map(|dataset| match dataset.crs() {
                None => Some(MetadataWarning::CrsUnavailable {
                    dataset: dataset.name().to_string(),
                }),
                Some(crs) if !crs.eq_ignore_ascii_case(&self.expected_crs) => {
                    Some(MetadataWarning::UnexpectedCrs {
                        dataset: dataset.name().to_string(),
                        found: crs,
                        expected: self.expected_crs.clone(),
                    })
                }
                Some(_) => None,
            })
            .collect()
    }
}

/// First band index, `none` for a dataset without bands
#[derive(PartialEq)]
struct BandIndex(Option<usize>);

impl fmt::Display for BandIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(index) => write!(f, "{}", index),
            None => write!(f, "none"),
        }
    }
}

/// Pixel array shape as (bands, rows, columns)
#[derive(PartialEq)]
struct Shape(usize, usize, usize);

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// Compare one attribute of every dataset against the first dataset.
///
/// Values are compared exactly and only formatted for the warning.
fn compare<T, F>(
    datasets: &[&dyn RasterHandle],
    attribute: MetadataAttribute,
    value_of: F,
) -> Option<MetadataWarning>
where
    T: PartialEq + fmt::Display,
    F: Fn(&dyn RasterHandle) -> T,
{
    let values: Vec<T> = datasets.iter().map(|d| value_of(*d)).collect();

    let first = values.first()?;
    if values.iter().all(|value| value == first) {
        return None;
    }

    Some(MetadataWarning::Mismatch {
        attribute,
        values: datasets
            .iter()
            .zip(&values)
            .map(|(d, value)| (d.name().to_string(), value.to_string()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryRaster;
    use crate::types::GeoTransform;
    use ndarray::Array2;

    fn raster(name: &str, left: f64, shape: (usize, usize)) -> MemoryRaster {
        MemoryRaster::new(
            name,
            GeoTransform::north_up(left, 44.0, 0.5, 0.5),
            Array2::zeros(shape),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_datasets_have_no_warnings() {
        let a = raster("a", -9.0, (4, 6));
        let b = raster("b", -9.0, (4, 6));
        let warnings = ConsistencyChecker::default().check(&[&a, &b]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_mismatches_are_reported_per_attribute() {
        let a = raster("a", -9.0, (4, 6));
        let b = raster("b", -8.5, (4, 6));
        let c = raster("c", -9.0, (5, 6));
        let warnings = ConsistencyChecker::default().check(&[&a, &b, &c]);

        let attributes: Vec<MetadataAttribute> = warnings
            .iter()
            .filter_map(|w| match w {
                MetadataWarning::Mismatch { attribute, .. } => Some(*attribute),
                _ => None,
            })
            .collect();

        assert_eq!(
            attributes,
            vec![
                MetadataAttribute::Bounds,
                MetadataAttribute::Height,
                MetadataAttribute::Shape
            ]
        );

        match &warnings[0] {
            MetadataWarning::Mismatch { values, .. } => {
                assert_eq!(values.len(), 3);
                assert_eq!(values[1].0, "b");
            }
            other => panic!("unexpected warning {:?}", other),
        }
    }

    #[test]
    fn test_sub_micro_degree_bounds_offset_is_a_mismatch() {
        let a = raster("a", -9.0, (4, 6));
        let b = raster("b", -9.000_000_1, (4, 6));
        assert_ne!(a.bounds(), b.bounds());

        let warnings = ConsistencyChecker::default().check(&[&a, &b]);
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            MetadataWarning::Mismatch { attribute, values } => {
                assert_eq!(*attribute, MetadataAttribute::Bounds);
                // the reported values tell the two datasets apart
                assert_ne!(values[0].1, values[1].1);
            }
            other => panic!("unexpected warning {:?}", other),
        }
    }

    #[test]
    fn test_band_count_changes_shape_only() {
        let a = raster("a", -9.0, (4, 6));
        let mut b = raster("b", -9.0, (4, 6));
        b.push_band(Array2::zeros((4, 6))).unwrap();
        let warnings = ConsistencyChecker::default().check(&[&a, &b]);

        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            MetadataWarning::Mismatch {
                attribute: MetadataAttribute::Shape,
                ..
            }
        ));
    }

    #[test]
    fn test_crs_unavailable_is_distinct_from_unexpected_crs() {
        let a = raster("a", -9.0, (4, 6)).with_crs(None);
        let b = raster("b", -9.0, (4, 6)).with_crs(Some("EPSG:3035"));
        let c = raster("c", -9.0, (4, 6)).with_crs(Some("epsg:4326"));
        let warnings = ConsistencyChecker::default().check(&[&a, &b, &c]);

        assert_eq!(
            warnings,
            vec![
                MetadataWarning::CrsUnavailable {
                    dataset: "a".to_string()
                },
                MetadataWarning::UnexpectedCrs {
                    dataset: "b".to_string(),
                    found: "EPSG:3035".to_string(),
                    expected: "EPSG:4326".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_collection() {
        assert!(ConsistencyChecker::default().check(&[]).is_empty());
    }
}

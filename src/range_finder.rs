//! Bounding box index resolution.
//!
//! Ground track coordinates are not sorted, but neighbouring samples are close together. The
//! search splits the index domain in half until each interval's envelope is either entirely
//! inside or entirely outside the box, then joins the surviving intervals into one contiguous
//! range.

use crate::array::ArrayData;
use crate::error::SubsetError;
use crate::models::{BoundingBox, IndexRange, Selection};

use tracing::debug;

/// Axis-aligned bounding rectangle of the samples in an index interval.
#[derive(Debug)]
struct Envelope {
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    /// Whether any sample in the interval has a NaN coordinate.
    has_nan: bool,
}

impl Envelope {
    fn of(lat: &[f64], lon: &[f64]) -> Self {
        let mut envelope = Envelope {
            lat_min: f64::INFINITY,
            lat_max: f64::NEG_INFINITY,
            lon_min: f64::INFINITY,
            lon_max: f64::NEG_INFINITY,
            has_nan: false,
        };
        for (&la, &lo) in std::iter::zip(lat, lon) {
            if la.is_nan() || lo.is_nan() {
                envelope.has_nan = true;
                continue;
            }
            envelope.lat_min = envelope.lat_min.min(la);
            envelope.lat_max = envelope.lat_max.max(la);
            envelope.lon_min = envelope.lon_min.min(lo);
            envelope.lon_max = envelope.lon_max.max(lo);
        }
        envelope
    }

    /// No sample of the interval can be inside the box.
    ///
    /// An interval of NaN samples has an inverted envelope and is always disjoint.
    fn is_disjoint(&self, bbox: &BoundingBox) -> bool {
        self.lat_min > bbox.max_lat
            || self.lat_max < bbox.min_lat
            || self.lon_min > bbox.max_lon
            || self.lon_max < bbox.min_lon
    }

    /// Every sample of the interval is inside the box.
    fn is_contained(&self, bbox: &BoundingBox) -> bool {
        !self.has_nan
            && self.lat_min >= bbox.min_lat
            && self.lat_max <= bbox.max_lat
            && self.lon_min >= bbox.min_lon
            && self.lon_max <= bbox.max_lon
    }
}

/// Find the minimal contiguous index range covering all samples inside a bounding box.
///
/// Returns `None` when no sample is inside the box, including when the arrays are empty.
/// Box edges are inclusive.
///
/// # Arguments
///
/// * `lat`: Latitude of each sample
/// * `lon`: Longitude of each sample, index-aligned with `lat`
/// * `bbox`: Bounding box to search
pub fn find_range(
    lat: &[f64],
    lon: &[f64],
    bbox: &BoundingBox,
) -> Result<Option<IndexRange>, SubsetError> {
    if lat.len() != lon.len() {
        return Err(SubsetError::ShapeMismatch {
            what: "longitude".to_string(),
            expected: vec![lat.len()],
            actual: vec![lon.len()],
        });
    }
    if lat.is_empty() {
        return Ok(None);
    }
    let range = search(lat, lon, bbox, IndexRange::new(0, lat.len()));
    debug!(?range, samples = lat.len(), "resolved bounding box range");
    Ok(range)
}

fn search(lat: &[f64], lon: &[f64], bbox: &BoundingBox, range: IndexRange) -> Option<IndexRange> {
    let envelope = Envelope::of(&lat[range.min..range.max], &lon[range.min..range.max]);
    if envelope.is_disjoint(bbox) {
        return None;
    }
    if envelope.is_contained(bbox) {
        return Some(range);
    }
    // Single samples are either disjoint or contained, so the interval has at least 2 samples.
    let mid = range.mid();
    let low = search(lat, lon, bbox, IndexRange::new(range.min, mid));
    let high = search(lat, lon, bbox, IndexRange::new(mid, range.max));
    match (low, high) {
        (Some(low), Some(high)) => Some(IndexRange::new(low.min, high.max)),
        (Some(low), None) => Some(low),
        (None, high) => high,
    }
}

/// Find the index range covering all samples inside a bounding box by testing every sample.
///
/// Returns the same result as [find_range], in linear time regardless of the data.
pub fn scan_range(
    lat: &[f64],
    lon: &[f64],
    bbox: &BoundingBox,
) -> Result<Option<IndexRange>, SubsetError> {
    if lat.len() != lon.len() {
        return Err(SubsetError::ShapeMismatch {
            what: "longitude".to_string(),
            expected: vec![lat.len()],
            actual: vec![lon.len()],
        });
    }
    let inside = |i: &usize| bbox.contains(lat[*i], lon[*i]);
    let first = (0..lat.len()).find(inside);
    let last = (0..lat.len()).rev().find(inside);
    Ok(first.zip(last).map(|(first, last)| IndexRange::new(first, last + 1)))
}

/// Convert a range of segments into the range of photons those segments cover.
///
/// Per-photon arrays are indexed by the cumulative photon count, so the photons of segments
/// `[min, max)` start after all photons of the preceding segments.
///
/// # Arguments
///
/// * `counts`: Photon count of each segment. Only the first `segments.max` counts are used, so a
///   prefix of the count array is sufficient.
/// * `segments`: Segment range from [find_range]
pub fn photon_count_range(
    counts: &ArrayData,
    segments: IndexRange,
) -> Result<IndexRange, SubsetError> {
    let extent = counts.leading_extent().unwrap_or(0);
    if extent < segments.max {
        return Err(SubsetError::ShapeMismatch {
            what: "segment photon counts".to_string(),
            expected: vec![segments.max],
            actual: counts.shape().to_vec(),
        });
    }
    let base = counts
        .slice(&Selection::rows(IndexRange::new(0, segments.min)))?
        .sum_counts()?;
    let inc = counts.slice(&Selection::rows(segments))?.sum_counts()?;
    let base = usize::try_from(base)?;
    let inc = usize::try_from(inc)?;
    Ok(IndexRange::new(base, base + inc))
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    fn bbox() -> BoundingBox {
        BoundingBox::new(-1.0, 1.0, 15.0, 35.0)
    }

    fn assert_matches_scan(lat: &[f64], lon: &[f64], bbox: &BoundingBox) {
        assert_eq!(
            scan_range(lat, lon, bbox).unwrap(),
            find_range(lat, lon, bbox).unwrap(),
            "lat {:?} lon {:?}",
            lat,
            lon
        );
    }

    #[test]
    fn ascending_latitude() {
        let lat = [10.0, 20.0, 30.0, 40.0];
        let lon = [0.0, 0.0, 0.0, 0.0];
        assert_eq!(
            Some(IndexRange::new(1, 3)),
            find_range(&lat, &lon, &bbox()).unwrap()
        );
    }

    #[test]
    fn all_outside() {
        let lat = [10.0, 11.0, 40.0, 50.0];
        let lon = [0.0, 0.0, 0.0, 0.0];
        assert_eq!(None, find_range(&lat, &lon, &bbox()).unwrap());
    }

    #[test]
    fn all_inside() {
        let lat = [16.0, 20.0, 30.0, 34.0];
        let lon = [0.5, -0.5, 0.0, 1.0];
        assert_eq!(
            Some(IndexRange::new(0, 4)),
            find_range(&lat, &lon, &bbox()).unwrap()
        );
    }

    #[test]
    fn empty() {
        assert_eq!(None, find_range(&[], &[], &bbox()).unwrap());
    }

    #[test]
    fn length_mismatch() {
        match find_range(&[1.0, 2.0], &[1.0], &bbox()).unwrap_err() {
            SubsetError::ShapeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(vec![2], expected);
                assert_eq!(vec![1], actual);
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn single_point_on_edge() {
        assert_eq!(
            Some(IndexRange::new(0, 1)),
            find_range(&[35.0], &[-1.0], &bbox()).unwrap()
        );
        assert_eq!(None, find_range(&[35.0], &[-1.0001], &bbox()).unwrap());
    }

    #[test]
    fn gap_between_clusters_is_joined() {
        let lat = [20.0, 21.0, 50.0, 51.0, 22.0, 23.0];
        let lon = [0.0; 6];
        assert_eq!(
            Some(IndexRange::new(0, 6)),
            find_range(&lat, &lon, &bbox()).unwrap()
        );
    }

    #[test]
    fn outside_by_longitude_only() {
        let lat = [20.0, 21.0, 22.0, 23.0, 24.0];
        let lon = [-3.0, -2.0, 0.0, 2.0, 3.0];
        assert_eq!(
            Some(IndexRange::new(2, 3)),
            find_range(&lat, &lon, &bbox()).unwrap()
        );
    }

    #[test]
    fn nan_counts_as_outside() {
        let lat = [f64::NAN, 20.0, 21.0, f64::NAN];
        let lon = [0.0; 4];
        assert_eq!(
            Some(IndexRange::new(1, 3)),
            find_range(&lat, &lon, &bbox()).unwrap()
        );
        let lat = [f64::NAN; 3];
        assert_eq!(None, find_range(&lat, &[0.0; 3], &bbox()).unwrap());
    }

    #[test]
    fn matches_scan_on_descending_track() {
        // Descending pass crossing the box.
        let lat: Vec<f64> = (0..101).map(|i| 60.0 - i as f64 * 0.6).collect();
        let lon: Vec<f64> = (0..101).map(|i| -2.0 + i as f64 * 0.04).collect();
        assert_matches_scan(&lat, &lon, &bbox());
    }

    #[test]
    fn matches_scan_exhaustively_on_small_arrays() {
        // Every 4-sample track over a small grid of values in and around the box.
        let values = [10.0, 15.0, 25.0, 35.0, 40.0];
        let lons = [0.0, 2.0];
        for a in values {
            for b in values {
                for c in values {
                    for d in values {
                        for lon_b in lons {
                            let lat = [a, b, c, d];
                            let lon = [0.0, lon_b, 0.0, 0.0];
                            assert_matches_scan(&lat, &lon, &bbox());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn empty_result_has_no_inside_points() {
        let lat = [10.0, 40.0, 12.0, 50.0, 14.9];
        let lon = [0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(None, find_range(&lat, &lon, &bbox()).unwrap());
        assert!(std::iter::zip(lat, lon).all(|(la, lo)| !bbox().contains(la, lo)));
    }

    #[test]
    fn monotone_range_is_exact() {
        let lat: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let lon = vec![0.0; 50];
        let range = find_range(&lat, &lon, &bbox()).unwrap().unwrap();
        assert_eq!(IndexRange::new(15, 36), range);
        for i in 0..50 {
            let inside = range.min <= i && i < range.max;
            assert_eq!(inside, bbox().contains(lat[i], lon[i]), "index {}", i);
        }
    }

    #[test]
    fn count_range() {
        let counts = ArrayData::from(array![2_i32, 3, 0, 5].into_dyn());
        assert_eq!(
            IndexRange::new(2, 5),
            photon_count_range(&counts, IndexRange::new(1, 3)).unwrap()
        );
        assert_eq!(
            IndexRange::new(0, 10),
            photon_count_range(&counts, IndexRange::new(0, 4)).unwrap()
        );
    }

    #[test]
    fn count_range_from_prefix() {
        let counts = ArrayData::from(array![2_u16, 3, 0].into_dyn());
        assert_eq!(
            IndexRange::new(5, 5),
            photon_count_range(&counts, IndexRange::new(2, 3)).unwrap()
        );
    }

    #[test]
    fn count_range_too_few_counts() {
        let counts = ArrayData::from(array![2_i32, 3].into_dyn());
        assert!(matches!(
            photon_count_range(&counts, IndexRange::new(1, 3)).unwrap_err(),
            SubsetError::ShapeMismatch { .. }
        ));
    }

    #[test]
    fn count_range_negative_count() {
        let counts = ArrayData::from(array![2_i32, -3, 4].into_dyn());
        assert!(matches!(
            photon_count_range(&counts, IndexRange::new(0, 2)).unwrap_err(),
            SubsetError::InvalidCount { .. }
        ));
    }
}

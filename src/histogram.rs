//! Composed receptive-field histogram: a sparse joint histogram over all descriptor responses.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use itertools::Itertools;
use log::debug;
use ndarray::Array2;

use crate::descriptor::DescriptorList;
use crate::error::{CrfhError, Result};

/// Subtracted from the bin count when computing the quantisation factor so that the top of
/// the range still falls into the last bin. Machine epsilon would be lost to rounding as soon
/// as the bin count exceeds 2.
pub const BIN_EPSILON: f64 = 1e-9;

/// One `(index, value)` node of a sparse vector as consumed by kernel machines.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SparseNode {
    pub index: i64,
    pub value: f64,
}

impl SparseNode {
    /// Terminates every sparse vector.
    pub const SENTINEL: SparseNode = SparseNode {
        index: -1,
        value: 0.0,
    };
}

/// Pack per-axis bin coordinates into one joint index, axis 0 least significant:
/// `index = (...(b[n-1] * bins[n-2] + b[n-2]) * bins[n-3] + ...) * bins[0] + b[0]`.
///
/// Coordinates are not range checked, so the index may lie outside `[0, product(bins))`.
/// `bins` and `coords` must have the same length. `None` if the index does not fit an `i64`.
pub fn pack_index(bins: &[i64], coords: &[i64]) -> Option<i64> {
    debug_assert_eq!(bins.len(), coords.len());
    bins.iter()
        .zip(coords)
        .rev()
        .try_fold(0i64, |index, (bins, coord)| {
            index.checked_mul(*bins)?.checked_add(*coord)
        })
}

/// Quantisation of one descriptor axis.
#[derive(Debug, Clone, Copy)]
struct AxisQuantizer {
    min: f64,
    factor: f64,
}

impl AxisQuantizer {
    fn new(min: f64, max: f64, bins: usize) -> Self {
        AxisQuantizer {
            min,
            factor: (bins as f64 - BIN_EPSILON) / (max - min),
        }
    }

    /// Values outside `[min, max]` are not clamped and yield bins outside `[0, bins)`.
    /// `None` for a non-finite value or a bin beyond the `i64` range.
    fn bin(&self, value: f64) -> Option<i64> {
        let bin = ((value - self.min) * self.factor).floor();
        // i64::MAX as f64 rounds up to 2^63
        let in_range = bin >= i64::MIN as f64 && bin < i64::MAX as f64;
        (bin.is_finite() && in_range).then_some(bin as i64)
    }
}

/// Sparse joint histogram, keyed by joint bin index in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct Crfh {
    bins: BTreeMap<i64, f64>,
    total: f64,
    max: f64,
}

impl Crfh {
    /// Build the histogram from one response channel per descriptor.
    ///
    /// Pixels closer than `skip_border_pixels` to the image border are ignored. Fails with a
    /// configuration error if the number of outputs and descriptors differ and with
    /// [`CrfhError::DimensionMismatch`] if the outputs do not share one shape. A response that
    /// is not finite or whose joint index does not fit an `i64` is a configuration error.
    pub fn new(
        outputs: &[Array2<f64>],
        descriptors: &DescriptorList,
        skip_border_pixels: usize,
    ) -> Result<Self> {
        if outputs.len() != descriptors.len() {
            return Err(CrfhError::config(format!(
                "{} descriptor outputs for {} descriptors",
                outputs.len(),
                descriptors.len()
            )));
        }
        let Some(first) = outputs.first() else {
            return Err(CrfhError::config("no descriptor outputs"));
        };
        let (rows, cols) = first.dim();
        if let Some(other) = outputs.iter().find(|o| o.dim() != (rows, cols)) {
            return Err(CrfhError::DimensionMismatch {
                expected: (rows, cols),
                actual: other.dim(),
            });
        }

        let quantizers = descriptors
            .iter()
            .map(|d| AxisQuantizer::new(d.min(), d.max(), d.bins()))
            .collect_vec();
        let bins = descriptors.iter().map(|d| d.bins() as i64).collect_vec();

        let mut hist = Crfh {
            bins: BTreeMap::new(),
            total: 0.0,
            max: 0.0,
        };
        let skip = skip_border_pixels;
        if rows <= 2 * skip || cols <= 2 * skip {
            debug!("{rows}x{cols} outputs leave nothing inside a border of {skip}");
            return Ok(hist);
        }

        let mut coords = vec![0i64; outputs.len()];
        for row in skip..rows - skip {
            for col in skip..cols - skip {
                for (axis, ((coord, q), output)) in
                    coords.iter_mut().zip(&quantizers).zip(outputs).enumerate()
                {
                    let value = output[(row, col)];
                    *coord = q.bin(value).ok_or_else(|| {
                        CrfhError::config(format!(
                            "descriptor {axis} response {value} at ({row}, {col}) has no bin"
                        ))
                    })?;
                }
                let index = pack_index(&bins, &coords).ok_or_else(|| {
                    CrfhError::config(format!(
                        "joint bin index of bins {coords:?} at ({row}, {col}) overflows"
                    ))
                })?;
                let count = hist.bins.entry(index).or_insert(0.0);
                *count += 1.0;
                hist.max = hist.max.max(*count);
            }
        }
        hist.total = ((rows - 2 * skip) * (cols - 2 * skip)) as f64;
        debug!(
            "histogram with {} non-empty bins, total {}, max {}",
            hist.bins.len(),
            hist.total,
            hist.max
        );
        Ok(hist)
    }

    /// Remove every bin whose joint index is below `min_ratio * total`.
    ///
    /// The comparison is made against the bin index, not its count.
    pub fn filter(&mut self, min_ratio: f64) {
        let threshold = min_ratio * self.total;
        let before = self.bins.len();
        self.bins = std::mem::take(&mut self.bins)
            .into_iter()
            .filter(|(index, _)| *index as f64 >= threshold)
            .collect();
        debug!(
            "filter({min_ratio}) removed {} of {before} bins",
            before - self.bins.len()
        );
    }

    /// Divide every bin by the pre-normalisation total. A no-op on an empty histogram.
    pub fn normalize(&mut self) {
        if self.total == 0.0 {
            return;
        }
        let total = self.total;
        self.bins.values_mut().for_each(|v| *v /= total);
    }

    /// Write `index:value` pairs in ascending index order, separated by single spaces.
    pub fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "{self}")
    }

    /// Ascending `(index, value)` nodes followed by [`SparseNode::SENTINEL`].
    pub fn to_sparse_vector(&self) -> Vec<SparseNode> {
        self.iter()
            .map(|(index, value)| SparseNode { index, value })
            .chain(std::iter::once(SparseNode::SENTINEL))
            .collect()
    }

    /// Number of pixels that contributed, unaffected by [`Crfh::filter`] and [`Crfh::normalize`].
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Largest bin count before normalisation.
    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn get(&self, index: i64) -> Option<f64> {
        self.bins.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.bins.iter().map(|(index, value)| (*index, *value))
    }
}

impl fmt::Display for Crfh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.iter().format_with(" ", |(index, value), f| f(&format_args!(
                "{index}:{value}"
            )))
        )
    }
}

#[cfg(test)]
fn from_counts(counts: &[(i64, f64)], total: f64) -> Crfh {
    Crfh {
        bins: counts.iter().copied().collect(),
        total,
        max: counts.iter().map(|(_, c)| *c).fold(0.0, f64::max),
    }
}

#[test]
fn index_packing_axis_zero_least_significant() {
    assert_eq!(pack_index(&[4, 3], &[2, 1]), Some(6));
    assert_eq!(pack_index(&[4, 3, 5], &[3, 2, 4]), Some((4 * 3 + 2) * 4 + 3));
    assert_eq!(pack_index(&[7], &[5]), Some(5));
    assert_eq!(pack_index(&[], &[]), Some(0));
    // out-of-range coordinates are packed as they are
    assert_eq!(pack_index(&[4, 3], &[-1, 3]), Some(11));
    assert_eq!(pack_index(&[1_000_000; 3], &[i64::MAX / 2; 3]), None);
}

#[test]
fn top_of_range_maps_to_last_bin() {
    let q = AxisQuantizer::new(0.0, 255.0, 4);
    assert_eq!(q.bin(0.0), Some(0));
    assert_eq!(q.bin(255.0), Some(3));
    assert_eq!(q.bin(128.0), Some(2));
    let q = AxisQuantizer::new(-128.0, 128.0, 28);
    assert_eq!(q.bin(128.0), Some(27));
    assert_eq!(q.bin(-128.0), Some(0));
    assert_eq!(q.bin(0.0), Some(13));
    // out of range is not clamped
    assert_eq!(q.bin(-129.0), Some(-1));
    assert_eq!(q.bin(140.0), Some(29));
    assert_eq!(q.bin(f64::NAN), None);
    assert_eq!(q.bin(f64::INFINITY), None);
    assert_eq!(q.bin(1e300), None);
}

#[test]
fn filter_compares_index_not_count() {
    let mut hist = from_counts(&[(0, 50.0), (1, 30.0), (2, 20.0)], 100.0);
    hist.filter(0.015);
    assert_eq!(hist.iter().collect_vec(), vec![(2, 20.0)]);
    assert_eq!(hist.total(), 100.0);

    let mut hist = from_counts(&[(0, 50.0), (1, 30.0), (2, 20.0)], 100.0);
    hist.filter(0.01);
    // threshold 1.0: index 1 survives although its count is the smallest relative to max
    assert_eq!(hist.len(), 2);
    assert_eq!(hist.get(0), None);

    let mut hist = from_counts(&[(0, 50.0), (1, 30.0), (2, 20.0)], 100.0);
    hist.filter(0.0);
    assert_eq!(hist.len(), 3);
}

#[test]
fn normalize_divides_by_total() {
    let mut hist = from_counts(&[(3, 6.0), (9, 2.0)], 8.0);
    hist.normalize();
    assert_eq!(hist.get(3), Some(0.75));
    assert_eq!(hist.get(9), Some(0.25));
    assert_eq!(hist.total(), 8.0);
    for (_, v) in hist.iter() {
        assert!(v * hist.total() >= 1.0);
    }
}

#[test]
fn serialized_text() {
    let mut hist = from_counts(&[(12, 3.0), (2, 16.0), (40, 1.0)], 20.0);
    insta::assert_snapshot!(hist.to_string(), @"2:16 12:3 40:1");
    hist.normalize();
    let mut out = Vec::new();
    hist.serialize(&mut out).unwrap();
    insta::assert_snapshot!(String::from_utf8(out).unwrap(), @"2:0.8 12:0.15 40:0.05");
}

#[test]
fn sparse_vector_ends_with_sentinel() {
    let hist = from_counts(&[(5, 1.0), (1, 2.0)], 3.0);
    assert_eq!(
        hist.to_sparse_vector(),
        vec![
            SparseNode {
                index: 1,
                value: 2.0
            },
            SparseNode {
                index: 5,
                value: 1.0
            },
            SparseNode::SENTINEL,
        ]
    );
    assert_eq!(from_counts(&[], 0.0).to_sparse_vector(), vec![SparseNode::SENTINEL]);
}

#[test]
fn unbinnable_responses_are_rejected() {
    let wide: DescriptorList = "Lx(1,1000000)+Lx(1,1000000)+Lx(1,1000000)".parse().unwrap();
    let huge = vec![Array2::from_elem((2, 2), 1e9); 3];
    assert!(matches!(
        Crfh::new(&huge, &wide, 0),
        Err(CrfhError::Configuration(_))
    ));

    let list: DescriptorList = "L(0,4)+Lx(1,4)".parse().unwrap();
    let mut outputs = vec![Array2::from_elem((2, 2), 10.0); 2];
    outputs[1][(1, 0)] = f64::NAN;
    assert!(matches!(
        Crfh::new(&outputs, &list, 0),
        Err(CrfhError::Configuration(_))
    ));
    // the NaN pixel lies outside a border of 1, which leaves nothing
    assert!(Crfh::new(&outputs, &list, 1).unwrap().is_empty());

    // moderately out-of-range responses are still counted
    let outputs = vec![Array2::from_elem((2, 2), 300.0), Array2::from_elem((2, 2), -200.0)];
    let hist = Crfh::new(&outputs, &list, 0).unwrap();
    // L bin floor(300 * 4 / 255) = 4, Lx bin floor(-72 * 4 / 256) = -2
    assert_eq!(hist.iter().collect_vec(), vec![(-2 * 4 + 4, 4.0)]);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn pack_index_lengths_must_match() {
    let _ = pack_index(&[4], &[1, 2]);
}

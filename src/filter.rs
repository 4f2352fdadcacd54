//! Receptive-field filters and the cache that owns them.
//!
//! Every filter is identified by a [`FilterId`]: a Gaussian of a given variance or a Cartesian
//! derivative of a given order. The kernels are derived deterministically from the identity, so
//! two equal identities always describe the same filter and the [`FilterCache`] keeps at most
//! one instance of each.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use log::{debug, trace, warn};
use ndarray::{Array2, ArrayView2, Axis};

use crate::convolution::{convolve, convolve_into};
use crate::error::{CrfhError, Result};

/// How many standard deviations the Gaussian kernel extends to each side of its centre.
pub const GAUSSIAN_SIGMAS: f64 = 3.0;

/// Highest derivative order with a fixed kernel.
pub const MAX_DERIVATIVE_ORDER: u8 = 2;

/// Scale of a Gaussian scale-space sample, i.e. the variance σ² of the Gaussian.
///
/// Compared and hashed by bit pattern so it can key caches. `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct Scale(f64);

impl Scale {
    pub fn new(sigma2: f64) -> Self {
        // -0.0 == 0.0, this collapses the two bit patterns
        Scale(if sigma2 == 0.0 { 0.0 } else { sigma2 })
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl From<f64> for Scale {
    fn from(sigma2: f64) -> Self {
        Scale::new(sigma2)
    }
}

impl PartialEq for Scale {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Scale {}

impl Hash for Scale {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a filter. Equality is by kind and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterId {
    /// Separable Gaussian with variance `sigma2`.
    Gaussian { sigma2: Scale },
    /// Finite-difference derivative of order `dx` along columns and `dy` along rows.
    Cartesian { dx: u8, dy: u8 },
}

impl FilterId {
    pub fn gaussian(sigma2: f64) -> Self {
        FilterId::Gaussian {
            sigma2: Scale::new(sigma2),
        }
    }

    pub fn cartesian(dx: u8, dy: u8) -> Self {
        FilterId::Cartesian { dx, dy }
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterId::Gaussian { sigma2 } => write!(f, "Gaussian(sigma2={sigma2})"),
            FilterId::Cartesian { dx, dy } => write!(f, "Cartesian(dx={dx}, dy={dy})"),
        }
    }
}

/// One 1D convolution applied along one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub axis: Axis,
    pub taps: Vec<f64>,
}

/// A 2D filter built from one or two 1D passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    id: FilterId,
    passes: Vec<Pass>,
}

impl Filter {
    /// Derive the kernels for `id`.
    ///
    /// Fails for a negative or non-finite variance and for derivative orders above
    /// [`MAX_DERIVATIVE_ORDER`].
    pub fn new(id: FilterId) -> Result<Self> {
        let passes = match id {
            FilterId::Gaussian { sigma2 } => {
                let sigma2 = sigma2.get();
                if !sigma2.is_finite() || sigma2 < 0.0 {
                    return Err(CrfhError::config(format!(
                        "gaussian variance must be finite and non-negative, got {sigma2}"
                    )));
                }
                let taps = gaussian_kernel(sigma2);
                // vertical first, then horizontal
                vec![
                    Pass {
                        axis: Axis(0),
                        taps: taps.clone(),
                    },
                    Pass {
                        axis: Axis(1),
                        taps,
                    },
                ]
            }
            FilterId::Cartesian { dx, dy } => {
                if dx > MAX_DERIVATIVE_ORDER || dy > MAX_DERIVATIVE_ORDER {
                    return Err(CrfhError::config(format!(
                        "derivative order ({dx}, {dy}) is not supported, max is {MAX_DERIVATIVE_ORDER}"
                    )));
                }
                // x derivative first, then y
                [(Axis(1), dx), (Axis(0), dy)]
                    .into_iter()
                    .filter_map(|(axis, order)| {
                        derivative_kernel(order).map(|taps| Pass {
                            axis,
                            taps: taps.to_vec(),
                        })
                    })
                    .collect()
            }
        };
        Ok(Filter { id, passes })
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    /// The 1D passes in the order they are applied.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn apply(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let mut output = Array2::zeros(input.raw_dim());
        self.apply_into(input, &mut output);
        output
    }

    /// Filter `input` into `output`, reshaping `output` if needed.
    pub fn apply_into(&self, input: ArrayView2<f64>, output: &mut Array2<f64>) {
        let mut passes = self.passes.iter();
        match passes.next() {
            Some(first) => {
                convolve_into(input, &first.taps, first.axis, output);
                for pass in passes {
                    *output = convolve(output.view(), &pass.taps, pass.axis);
                }
            }
            None => {
                // zero-order derivative
                if output.dim() != input.dim() {
                    *output = input.to_owned();
                } else {
                    output.assign(&input);
                }
            }
        }
    }
}

/// Normalised Gaussian kernel of length `2 * max(ceil(3σ), 1) + 1`.
///
/// A zero variance yields the centred identity `[0, 1, 0]`.
pub fn gaussian_kernel(sigma2: f64) -> Vec<f64> {
    if sigma2 == 0.0 {
        return vec![0.0, 1.0, 0.0];
    }
    let half = ((sigma2.sqrt() * GAUSSIAN_SIGMAS).ceil() as usize).max(1);
    let mut taps: Vec<f64> = (0..2 * half + 1)
        .map(|i| {
            let d = i as f64 - half as f64;
            (-(d * d) / (2.0 * sigma2)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

/// Fixed 3-tap finite difference for the given order, `None` for order 0.
pub fn derivative_kernel(order: u8) -> Option<[f64; 3]> {
    match order {
        1 => Some([-0.5, 0.0, 0.5]),
        2 => Some([1.0, -2.0, 1.0]),
        _ => None,
    }
}

/// Owns every filter of a system, at most one per [`FilterId`].
///
/// Populated while the system is built and only read afterwards, so a shared reference can be
/// used from several threads at once.
#[derive(Debug, Default)]
pub struct FilterCache {
    filters: HashMap<FilterId, Filter>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached filter for `id`, constructing it first if it does not exist yet.
    pub fn create_filter(&mut self, id: FilterId) -> Result<&Filter> {
        match self.filters.entry(id) {
            Entry::Occupied(entry) => {
                trace!("filter {id} already cached");
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let filter = Filter::new(id)?;
                debug!(
                    "created filter {id} with kernel lengths {:?}",
                    filter.passes.iter().map(|p| p.taps.len()).collect::<Vec<_>>()
                );
                Ok(entry.insert(filter))
            }
        }
    }

    pub fn get(&self, id: &FilterId) -> Option<&Filter> {
        self.filters.get(id)
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        self.filters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply the cached filter `id` to `input`.
    pub fn apply_filter(&self, id: &FilterId, input: ArrayView2<f64>) -> Result<Array2<f64>> {
        Ok(self.lookup(id)?.apply(input))
    }

    /// Apply the cached filter `id` to `input`, writing into `output`.
    /// `output` is left untouched if the filter is missing.
    pub fn apply_filter_into(
        &self,
        id: &FilterId,
        input: ArrayView2<f64>,
        output: &mut Array2<f64>,
    ) -> Result<()> {
        self.lookup(id)?.apply_into(input, output);
        Ok(())
    }

    fn lookup(&self, id: &FilterId) -> Result<&Filter> {
        self.filters.get(id).ok_or_else(|| {
            warn!("filter {id} not found in cache");
            CrfhError::CacheMiss(format!("filter {id}"))
        })
    }
}

#[test]
fn filter_identity_equality() {
    assert_eq!(FilterId::gaussian(2.0), FilterId::gaussian(2.0));
    assert_ne!(FilterId::gaussian(2.0), FilterId::gaussian(8.0));
    assert_eq!(FilterId::cartesian(1, 0), FilterId::cartesian(1, 0));
    assert_ne!(FilterId::cartesian(1, 0), FilterId::cartesian(0, 1));
    assert_ne!(FilterId::cartesian(1, 1), FilterId::cartesian(2, 0));
    assert_ne!(FilterId::gaussian(1.0), FilterId::cartesian(1, 0));
    assert_eq!(FilterId::gaussian(-0.0), FilterId::gaussian(0.0));
}

#[test]
fn gaussian_kernel_sums_to_one() {
    for sigma2 in [0.25, 1.0, 2.0, 8.0, 16.0] {
        let kernel = gaussian_kernel(sigma2);
        let half = (sigma2.sqrt() * GAUSSIAN_SIGMAS).ceil() as usize;
        assert_eq!(kernel.len(), 2 * half.max(1) + 1, "sigma2={sigma2}");
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "sigma2={sigma2} sum={sum}");
        // symmetric, peak in the middle
        let mid = kernel.len() / 2;
        for i in 0..mid {
            assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-15);
            assert!(kernel[i] < kernel[mid]);
        }
    }
}

#[test]
fn gaussian_kernel_degenerates_at_zero_variance() {
    assert_eq!(gaussian_kernel(0.0), vec![0.0, 1.0, 0.0]);
    let filter = Filter::new(FilterId::gaussian(0.0)).unwrap();
    assert_eq!(filter.passes().len(), 2);
    assert!(filter.passes().iter().all(|p| p.taps == [0.0, 1.0, 0.0]));
    assert_eq!(filter.passes()[0].axis, Axis(0));
    assert_eq!(filter.passes()[1].axis, Axis(1));
}

#[test]
fn cartesian_passes_follow_orders() {
    let lx = Filter::new(FilterId::cartesian(1, 0)).unwrap();
    assert_eq!(
        lx.passes(),
        &[Pass {
            axis: Axis(1),
            taps: vec![-0.5, 0.0, 0.5]
        }]
    );
    let lyy = Filter::new(FilterId::cartesian(0, 2)).unwrap();
    assert_eq!(
        lyy.passes(),
        &[Pass {
            axis: Axis(0),
            taps: vec![1.0, -2.0, 1.0]
        }]
    );
    let lxy = Filter::new(FilterId::cartesian(1, 1)).unwrap();
    assert_eq!(lxy.passes().len(), 2);
    assert_eq!(lxy.passes()[0].axis, Axis(1));
    assert_eq!(lxy.passes()[1].axis, Axis(0));
    assert!(Filter::new(FilterId::cartesian(3, 0)).is_err());
    assert!(Filter::new(FilterId::gaussian(-1.0)).is_err());
    assert!(Filter::new(FilterId::gaussian(f64::NAN)).is_err());
}

#[test]
fn cache_never_duplicates() {
    let mut cache = FilterCache::new();
    let first = cache.create_filter(FilterId::gaussian(2.0)).unwrap() as *const Filter;
    let second = cache.create_filter(FilterId::gaussian(2.0)).unwrap() as *const Filter;
    assert!(std::ptr::eq(first, second));
    assert_eq!(cache.len(), 1);
    cache.create_filter(FilterId::cartesian(1, 0)).unwrap();
    cache.create_filter(FilterId::cartesian(1, 0)).unwrap();
    cache.create_filter(FilterId::gaussian(8.0)).unwrap();
    assert_eq!(cache.len(), 3);
    assert!(cache.contains(&FilterId::gaussian(8.0)));
    assert!(!cache.contains(&FilterId::cartesian(0, 1)));
}

#[test]
fn missing_filter_is_a_cache_miss() {
    let cache = FilterCache::new();
    let input = Array2::from_elem((3, 3), 1.0);
    let mut output = Array2::from_elem((1, 1), 7.0);
    let err = cache
        .apply_filter_into(&FilterId::gaussian(1.0), input.view(), &mut output)
        .unwrap_err();
    assert!(matches!(err, CrfhError::CacheMiss(_)));
    assert_eq!(output, Array2::from_elem((1, 1), 7.0));
}

#[test]
fn mixed_derivative_of_bilinear_surface() {
    // f(r, c) = r * c has d²f/dxdy = 1 everywhere away from the border
    let mut cache = FilterCache::new();
    let id = FilterId::cartesian(1, 1);
    cache.create_filter(id).unwrap();
    let input = Array2::from_shape_fn((6, 6), |(r, c)| (r * c) as f64);
    let out = cache.apply_filter(&id, input.view()).unwrap();
    for r in 1..5 {
        for c in 1..5 {
            assert!((out[(r, c)] - 1.0).abs() < 1e-12);
        }
    }
}

//! Receptive-field descriptors: which channel to read, at which scale, through which filter.
//!
//! Each descriptor yields one response channel and one histogram axis. A derivative descriptor
//! of order `n` at scale `t` (the Gaussian variance) is scale-normalised by `t^(n/2)`, so
//! responses at different scales share the fixed value range of their kind.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use ndarray::Array2;

use crate::channel::{ChannelCache, ChannelType};
use crate::error::{CrfhError, Result};
use crate::filter::{FilterCache, FilterId};
use crate::scale_space::ScaleSpaceCache;

/// The six supported descriptor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum DescriptorKind {
    /// Smoothed luminance.
    L,
    Lx,
    Ly,
    Lxx,
    Lyy,
    Lxy,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 6] = [
        DescriptorKind::L,
        DescriptorKind::Lx,
        DescriptorKind::Lxx,
        DescriptorKind::Ly,
        DescriptorKind::Lyy,
        DescriptorKind::Lxy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DescriptorKind::L => "L",
            DescriptorKind::Lx => "Lx",
            DescriptorKind::Ly => "Ly",
            DescriptorKind::Lxx => "Lxx",
            DescriptorKind::Lyy => "Lyy",
            DescriptorKind::Lxy => "Lxy",
        }
    }

    /// Case-sensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Fixed `(min, max)` range of the (normalised) response.
    pub fn range(self) -> (f64, f64) {
        match self {
            DescriptorKind::L => (0.0, 255.0),
            _ => (-128.0, 128.0),
        }
    }

    /// Derivative order `(dx, dy)`, `None` for plain smoothing.
    pub fn derivative_order(self) -> Option<(u8, u8)> {
        match self {
            DescriptorKind::L => None,
            DescriptorKind::Lx => Some((1, 0)),
            DescriptorKind::Ly => Some((0, 1)),
            DescriptorKind::Lxx => Some((2, 0)),
            DescriptorKind::Lyy => Some((0, 2)),
            DescriptorKind::Lxy => Some((1, 1)),
        }
    }

    /// Factor applied to the raw derivative at Gaussian variance `scale`.
    pub fn normalization_factor(self, scale: f64) -> f64 {
        match self {
            DescriptorKind::L => 1.0,
            DescriptorKind::Lx | DescriptorKind::Ly => scale.sqrt(),
            DescriptorKind::Lxx | DescriptorKind::Lyy | DescriptorKind::Lxy => scale,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DescriptorKind {
    type Err = CrfhError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| CrfhError::config(format!("unknown descriptor name '{s}'")))
    }
}

/// One descriptor: a kind evaluated at a scale and quantised into `bins` levels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Descriptor {
    kind: DescriptorKind,
    scale: f64,
    bins: usize,
}

impl Descriptor {
    /// Fails if `bins` is zero or `scale` is negative or not finite.
    pub fn new(kind: DescriptorKind, scale: f64, bins: usize) -> Result<Self> {
        if !scale.is_finite() || scale < 0.0 {
            return Err(CrfhError::config(format!(
                "{kind}: scale must be finite and non-negative, got {scale}"
            )));
        }
        if bins == 0 {
            return Err(CrfhError::config(format!("{kind}: bins must be positive")));
        }
        Ok(Descriptor { kind, scale, bins })
    }

    /// Like [`Descriptor::new`], with the kind given by its name (`L`, `Lx`, `Lxx`, `Ly`, `Lyy`
    /// or `Lxy`).
    pub fn from_name(name: &str, scale: f64, bins: usize) -> Result<Self> {
        Self::new(name.parse()?, scale, bins)
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn min(&self) -> f64 {
        self.kind.range().0
    }

    pub fn max(&self) -> f64 {
        self.kind.range().1
    }

    pub fn channel_type(&self) -> ChannelType {
        ChannelType::Luminance
    }

    /// Filters this descriptor reads: the scale-space Gaussian and, for derivative kinds, the
    /// matching Cartesian derivative.
    pub fn required_filters(&self) -> Vec<FilterId> {
        std::iter::once(FilterId::gaussian(self.scale))
            .chain(
                self.kind
                    .derivative_order()
                    .map(|(dx, dy)| FilterId::cartesian(dx, dy)),
            )
            .collect()
    }

    pub fn create_required_filters(&self, filters: &mut FilterCache) -> Result<()> {
        for id in self.required_filters() {
            filters.create_filter(id)?;
        }
        Ok(())
    }

    pub fn create_required_channels(&self, channels: &mut ChannelCache) {
        channels.create_channel(self.channel_type());
    }

    pub fn create_required_scales(&self, scale_space: &mut ScaleSpaceCache) {
        scale_space.create_scale_space_sample(self.channel_type(), self.scale);
    }

    /// Compute this descriptor's response channel.
    ///
    /// The caches are only read; the result is a new array.
    pub fn apply(
        &self,
        scale_space: &ScaleSpaceCache,
        filters: &FilterCache,
    ) -> Result<Array2<f64>> {
        let sample = scale_space.sample(self.channel_type(), self.scale)?;
        match self.kind.derivative_order() {
            None => Ok(sample.clone()),
            Some((dx, dy)) => {
                let mut response =
                    filters.apply_filter(&FilterId::cartesian(dx, dy), sample.view())?;
                let factor = self.kind.normalization_factor(self.scale);
                response.mapv_inplace(|v| v * factor);
                Ok(response)
            }
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.kind, self.scale, self.bins)
    }
}

/// Parse one `Name(scale,bins)` token.
impl FromStr for Descriptor {
    type Err = CrfhError;

    fn from_str(token: &str) -> Result<Self> {
        let malformed = || CrfhError::config(format!("malformed descriptor token '{token}'"));
        let token = token.trim();
        let (name, rest) = token.split_once('(').ok_or_else(malformed)?;
        let args = rest.strip_suffix(')').ok_or_else(malformed)?;
        let (scale, bins) = args.split_once(',').ok_or_else(malformed)?;
        let scale: f64 = scale.trim().parse().map_err(|_| malformed())?;
        let bins: usize = bins.trim().parse().map_err(|_| malformed())?;
        Descriptor::from_name(name.trim(), scale, bins)
    }
}

/// Ordered descriptors. The order fixes the histogram axis order: the first descriptor is the
/// least significant digit of the joint bin index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorList {
    descriptors: Vec<Descriptor>,
}

impl DescriptorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn add(&mut self, kind: DescriptorKind, scale: f64, bins: usize) -> Result<()> {
        self.push(Descriptor::new(kind, scale, bins)?);
        Ok(())
    }

    pub fn add_named(&mut self, name: &str, scale: f64, bins: usize) -> Result<()> {
        self.push(Descriptor::from_name(name, scale, bins)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Descriptor> {
        self.descriptors.iter()
    }

    /// Number of joint bins, i.e. the product of all bin counts, if it fits an `i64`.
    pub fn total_bins(&self) -> Option<i64> {
        self.descriptors
            .iter()
            .try_fold(1i64, |acc, d| acc.checked_mul(i64::try_from(d.bins).ok()?))
    }

    pub fn create_all_required_filters(&self, filters: &mut FilterCache) -> Result<()> {
        self.descriptors
            .iter()
            .try_for_each(|d| d.create_required_filters(filters))
    }

    pub fn create_all_required_channels(&self, channels: &mut ChannelCache) {
        self.descriptors
            .iter()
            .for_each(|d| d.create_required_channels(channels));
    }

    pub fn create_all_required_scales(&self, scale_space: &mut ScaleSpaceCache) {
        self.descriptors
            .iter()
            .for_each(|d| d.create_required_scales(scale_space));
    }

    /// Responses of all descriptors, in list order.
    pub fn apply_all(
        &self,
        scale_space: &ScaleSpaceCache,
        filters: &FilterCache,
    ) -> Result<Vec<Array2<f64>>> {
        self.descriptors
            .iter()
            .map(|d| d.apply(scale_space, filters))
            .collect()
    }
}

impl<'a> IntoIterator for &'a DescriptorList {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

impl FromIterator<Descriptor> for DescriptorList {
    fn from_iter<T: IntoIterator<Item = Descriptor>>(iter: T) -> Self {
        DescriptorList {
            descriptors: iter.into_iter().collect(),
        }
    }
}

/// Renders back to the `Name(scale,bins)+...` grammar.
impl fmt::Display for DescriptorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptors.iter().join("+"))
    }
}

/// Parse `Token ('+' Token)*`. Any bad token fails the whole list.
impl FromStr for DescriptorList {
    type Err = CrfhError;

    fn from_str(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(CrfhError::config("empty descriptor spec"));
        }
        let list: DescriptorList = spec
            .split('+')
            .map(str::parse::<Descriptor>)
            .collect::<Result<_>>()?;
        if list.total_bins().is_none() {
            return Err(CrfhError::config(format!(
                "joint bin count of '{spec}' overflows"
            )));
        }
        debug!("parsed {} descriptors from '{spec}'", list.len());
        Ok(list)
    }
}

#[test]
fn kinds_round_trip_names() {
    for kind in DescriptorKind::ALL {
        assert_eq!(DescriptorKind::from_name(kind.name()), Some(kind));
    }
    assert_eq!(DescriptorKind::from_name("lxx"), None);
    assert_eq!(DescriptorKind::from_name("Lzz"), None);
    assert_eq!(DescriptorKind::from_name(""), None);
}

#[test]
fn kind_table() {
    use DescriptorKind::*;
    assert_eq!(L.range(), (0.0, 255.0));
    for kind in [Lx, Ly, Lxx, Lyy, Lxy] {
        assert_eq!(kind.range(), (-128.0, 128.0));
    }
    assert_eq!(Lx.derivative_order(), Some((1, 0)));
    assert_eq!(Lyy.derivative_order(), Some((0, 2)));
    assert_eq!(Lxy.derivative_order(), Some((1, 1)));
    assert_eq!(L.normalization_factor(4.0), 1.0);
    assert_eq!(Ly.normalization_factor(4.0), 2.0);
    assert_eq!(Lxx.normalization_factor(4.0), 4.0);
    assert_eq!(Lxy.normalization_factor(4.0), 4.0);
}

#[test]
fn required_filters_per_kind() {
    let l = Descriptor::new(DescriptorKind::L, 2.0, 8).unwrap();
    assert_eq!(l.required_filters(), vec![FilterId::gaussian(2.0)]);
    let lxy = Descriptor::new(DescriptorKind::Lxy, 8.0, 28).unwrap();
    assert_eq!(
        lxy.required_filters(),
        vec![FilterId::gaussian(8.0), FilterId::cartesian(1, 1)]
    );
}

#[test]
fn parse_single_token() {
    let d: Descriptor = "Lxx(8,28)".parse().unwrap();
    assert_eq!(d.kind(), DescriptorKind::Lxx);
    assert_eq!(d.scale(), 8.0);
    assert_eq!(d.bins(), 28);
    assert_eq!(d.min(), -128.0);
    assert_eq!(d.max(), 128.0);
    let d: Descriptor = " Ly( 0.5 , 4 ) ".parse().unwrap();
    assert_eq!(d.kind(), DescriptorKind::Ly);
    assert_eq!(d.scale(), 0.5);
}

#[test]
fn parse_rejects_bad_tokens() {
    for token in [
        "Lzz(1,4)",
        "Lxx",
        "Lxx(1)",
        "Lxx(1,4",
        "Lxx(a,4)",
        "Lxx(1,b)",
        "Lxx(1,0)",
        "Lxx(-1,4)",
        "Lxx(1,-4)",
        "Lxx(inf,4)",
        "",
    ] {
        let err = token.parse::<Descriptor>().unwrap_err();
        assert!(matches!(err, CrfhError::Configuration(_)), "{token}: {err}");
    }
}

#[test]
fn list_preserves_order_and_renders() {
    let spec = "Lxx(8,28)+Lxy(8,28)+Lyy(8,28)+Lxx(2,28)+Lxy(2,28)+Lyy(2,28)";
    let list: DescriptorList = spec.parse().unwrap();
    assert_eq!(list.len(), 6);
    let kinds = list.iter().map(|d| d.kind()).collect_vec();
    assert_eq!(
        kinds,
        vec![
            DescriptorKind::Lxx,
            DescriptorKind::Lxy,
            DescriptorKind::Lyy,
            DescriptorKind::Lxx,
            DescriptorKind::Lxy,
            DescriptorKind::Lyy
        ]
    );
    assert_eq!(list.to_string(), spec);
    assert_eq!(list.total_bins(), Some(28i64.pow(6)));
}

#[test]
fn list_rejects_any_bad_token() {
    assert!("L(0,4)+Lzz(1,4)".parse::<DescriptorList>().is_err());
    assert!("L(0,4)++Lx(1,4)".parse::<DescriptorList>().is_err());
    assert!("".parse::<DescriptorList>().is_err());
    assert!("L(0,4)+".parse::<DescriptorList>().is_err());
}

#[test]
fn filters_shared_across_descriptors() {
    let list: DescriptorList = "Lxx(8,28)+Lxy(8,28)+Lyy(8,28)+Lxx(2,28)+Lxy(2,28)+Lyy(2,28)"
        .parse()
        .unwrap();
    let mut filters = FilterCache::new();
    list.create_all_required_filters(&mut filters).unwrap();
    // two gaussians and three derivative filters
    assert_eq!(filters.len(), 5);
}

#[cfg(test)]
fn responses(image: image::GrayImage, spec: &str) -> Vec<Array2<f64>> {
    let list: DescriptorList = spec.parse().unwrap();
    let mut filters = FilterCache::new();
    list.create_all_required_filters(&mut filters).unwrap();
    let image = image::DynamicImage::ImageLuma8(image);
    let mut channels = ChannelCache::new(&image);
    list.create_all_required_channels(&mut channels);
    let mut scale_space = ScaleSpaceCache::new(&channels, &filters);
    list.create_all_required_scales(&mut scale_space);
    list.apply_all(&scale_space, &filters).unwrap()
}

#[cfg(test)]
fn assert_interior(response: &Array2<f64>, margin: usize, expected: f64) {
    let (rows, cols) = response.dim();
    for r in margin..rows - margin {
        for c in margin..cols - margin {
            let v = response[(r, c)];
            assert!((v - expected).abs() < 1e-9, "({r},{c}) = {v}, expected {expected}");
        }
    }
}

#[test]
fn first_derivatives_are_scale_normalised() {
    use image::{GrayImage, Luma};
    // Gaussian(4) reaches 6 pixels, the derivative one more
    let margin = 7;

    let horizontal = GrayImage::from_fn(30, 20, |x, _| Luma([(3 * x) as u8]));
    let out = responses(horizontal, "Lx(4,8)+Ly(4,8)+Lxx(4,8)");
    // d/dx (3x) = 3, times sqrt(4)
    assert_interior(&out[0], margin, 6.0);
    assert!(out[1].iter().all(|v| v.abs() < 1e-9));
    assert_interior(&out[2], margin, 0.0);

    let vertical = GrayImage::from_fn(20, 30, |_, y| Luma([(3 * y) as u8]));
    let out = responses(vertical, "Ly(4,8)+Lx(4,8)+Lyy(4,8)");
    assert_interior(&out[0], margin, 6.0);
    assert!(out[1].iter().all(|v| v.abs() < 1e-9));
    assert_interior(&out[2], margin, 0.0);
}

#[test]
fn second_derivatives_are_scale_normalised() {
    use image::{GrayImage, Luma};
    // Gaussian(2) reaches 5 pixels
    let bilinear = GrayImage::from_fn(16, 16, |x, y| Luma([(x * y) as u8]));
    let out = responses(bilinear, "Lxy(2,8)+Lxx(2,8)+Lyy(2,8)");
    // d²(xy)/dxdy = 1, times the scale
    assert_interior(&out[0], 6, 2.0);
    assert_interior(&out[1], 6, 0.0);
    assert_interior(&out[2], 6, 0.0);
}

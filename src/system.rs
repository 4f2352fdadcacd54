use std::str::FromStr;

use image::DynamicImage;
use log::debug;
use ndarray::Array2;

use crate::channel::ChannelCache;
use crate::config::HistogramOptions;
use crate::descriptor::DescriptorList;
use crate::error::{CrfhError, Result};
use crate::filter::FilterCache;
use crate::histogram::Crfh;
use crate::scale_space::ScaleSpaceCache;

/// A parsed descriptor list together with every filter it needs.
///
/// Filters are built once on construction and only read afterwards, so one `System` can
/// process many images, also from several threads through `&System`. Channels and
/// scale-space samples are rebuilt for every image.
#[derive(Debug)]
pub struct System {
    descriptors: DescriptorList,
    filters: FilterCache,
}

impl System {
    /// Parse `spec` (`Name(scale,bins)` tokens joined with `+`) and build all required filters.
    pub fn new(spec: &str) -> Result<Self> {
        Self::from_descriptors(spec.parse()?)
    }

    pub fn from_descriptors(descriptors: DescriptorList) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(CrfhError::config("system without descriptors"));
        }
        let mut filters = FilterCache::new();
        descriptors.create_all_required_filters(&mut filters)?;
        debug!(
            "system {descriptors}: {} descriptors, {} filters",
            descriptors.len(),
            filters.len()
        );
        Ok(System {
            descriptors,
            filters,
        })
    }

    pub fn descriptors(&self) -> &DescriptorList {
        &self.descriptors
    }

    pub fn filters(&self) -> &FilterCache {
        &self.filters
    }

    /// The descriptor spec in canonical form.
    pub fn spec(&self) -> String {
        self.descriptors.to_string()
    }

    /// Response channel of every descriptor for `image`, in descriptor order.
    pub fn compute_descriptor_outputs(&self, image: &DynamicImage) -> Result<Vec<Array2<f64>>> {
        let mut channels = ChannelCache::new(image);
        self.descriptors.create_all_required_channels(&mut channels);
        let mut scale_space = ScaleSpaceCache::new(&channels, &self.filters);
        self.descriptors.create_all_required_scales(&mut scale_space);
        self.descriptors.apply_all(&scale_space, &self.filters)
    }

    /// Raw histogram of `image`, counting every pixel at least `skip_border_pixels` away from
    /// the border.
    pub fn compute_histogram(
        &self,
        image: &DynamicImage,
        skip_border_pixels: usize,
    ) -> Result<Crfh> {
        let outputs = self.compute_descriptor_outputs(image)?;
        Crfh::new(&outputs, &self.descriptors, skip_border_pixels)
    }

    /// Compute the histogram, filter it if `min_hist_value` is positive, then normalize it if
    /// requested.
    pub fn process(&self, image: &DynamicImage, options: &HistogramOptions) -> Result<Crfh> {
        let mut hist = self.compute_histogram(image, options.skip_border_pixels)?;
        if options.min_hist_value > 0.0 {
            hist.filter(options.min_hist_value);
        }
        if options.normalize {
            hist.normalize();
        }
        Ok(hist)
    }
}

impl FromStr for System {
    type Err = CrfhError;

    fn from_str(spec: &str) -> Result<Self> {
        System::new(spec)
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;
    use crate::filter::FilterId;

    fn checkerboard(size: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
            Luma([if (x / 4 + y / 4) % 2 == 0 { 30 } else { 220 }])
        }))
    }

    #[test]
    fn unknown_descriptor_fails_construction() {
        assert!(matches!(
            System::new("Lzz(1,4)"),
            Err(CrfhError::Configuration(_))
        ));
        assert!(matches!(
            "L(0,4)+Lzz(1,4)".parse::<System>(),
            Err(CrfhError::Configuration(_))
        ));
    }

    #[test]
    fn filters_built_on_construction() {
        let system = System::new("Lx(2,8)+Ly(2,8)+L(2,4)").unwrap();
        assert_eq!(system.descriptors().len(), 3);
        assert_eq!(system.filters().len(), 3);
        assert!(system.filters().contains(&FilterId::gaussian(2.0)));
        assert!(system.filters().contains(&FilterId::cartesian(1, 0)));
        assert!(system.filters().contains(&FilterId::cartesian(0, 1)));
        assert_eq!(system.spec(), "Lx(2,8)+Ly(2,8)+L(2,4)");
    }

    #[test]
    fn outputs_follow_descriptor_order() {
        let system = System::new("L(0,4)+Lx(1,8)+Lyy(4,8)").unwrap();
        let image = checkerboard(16);
        let outputs = system.compute_descriptor_outputs(&image).unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|o| o.dim() == (16, 16)));
        // L at scale 0 is the raw lightness
        assert_eq!(outputs[0][(0, 0)], 30.0);
        assert_eq!(outputs[0][(0, 4)], 220.0);
    }

    #[test]
    fn histogram_counts_inner_pixels() {
        let system = System::new("L(1,4)+Lx(1,4)").unwrap();
        let image = checkerboard(12);
        let hist = system.compute_histogram(&image, 2).unwrap();
        assert_eq!(hist.total(), 64.0);
        assert_eq!(hist.iter().map(|(_, c)| c).sum::<f64>(), 64.0);

        let hist = system.compute_histogram(&image, 6).unwrap();
        assert!(hist.is_empty());
        assert_eq!(hist.total(), 0.0);
    }

    #[test]
    fn process_normalizes() {
        let system = System::new("L(0,4)").unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([128])));
        let hist = system.process(&image, &HistogramOptions::default()).unwrap();
        assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(2, 1.0)]);
        let raw = system
            .process(
                &image,
                &HistogramOptions {
                    normalize: false,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(raw.get(2), Some(16.0));
    }

    #[test]
    fn empty_image_is_a_cache_miss() {
        let system = System::new("L(1,4)").unwrap();
        let image = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(matches!(
            system.compute_histogram(&image, 0),
            Err(CrfhError::CacheMiss(_))
        ));
    }

    #[test]
    fn shared_between_threads() {
        let system = System::new("Lxx(2,8)+Lxy(2,8)+Lyy(2,8)").unwrap();
        let images = (8..12).map(checkerboard).collect::<Vec<_>>();
        let expected = images
            .iter()
            .map(|img| system.compute_histogram(img, 1).unwrap())
            .collect::<Vec<_>>();
        let filters_before = system.filters().len();
        let system = &system;
        let actual = std::thread::scope(|s| {
            let handles = images
                .iter()
                .map(|img| s.spawn(move || system.compute_histogram(img, 1).unwrap()))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        assert_eq!(actual, expected);
        assert_eq!(system.filters().len(), filters_before);
    }
}

//! Gaussian scale-space samples of the derived channels.

use std::collections::HashMap;

use log::{debug, trace, warn};
use ndarray::Array2;

use crate::channel::{ChannelCache, ChannelType};
use crate::error::{CrfhError, Result};
use crate::filter::{FilterCache, FilterId, Scale};

/// Channels smoothed with a Gaussian of a given scale, keyed by `(channel, scale)`.
///
/// Built per image on top of that image's [`ChannelCache`] and the system-wide
/// [`FilterCache`], both of which it only borrows.
pub struct ScaleSpaceCache<'a> {
    channels: &'a ChannelCache<'a>,
    filters: &'a FilterCache,
    samples: HashMap<(ChannelType, Scale), Array2<f64>>,
}

impl<'a> ScaleSpaceCache<'a> {
    pub fn new(channels: &'a ChannelCache<'a>, filters: &'a FilterCache) -> Self {
        ScaleSpaceCache {
            channels,
            filters,
            samples: HashMap::new(),
        }
    }

    /// Smooth `channel_type` with `Gaussian(scale)` unless that sample already exists.
    ///
    /// Both the channel and the Gaussian filter must already be cached; if either is missing
    /// nothing is stored.
    pub fn create_scale_space_sample(&mut self, channel_type: ChannelType, scale: f64) {
        let key = (channel_type, Scale::new(scale));
        if self.samples.contains_key(&key) {
            trace!("scale-space sample ({channel_type}, {scale}) already cached");
            return;
        }
        let sample = self.channels.channel(channel_type).and_then(|channel| {
            self.filters
                .apply_filter(&FilterId::gaussian(scale), channel.view())
        });
        match sample {
            Ok(sample) => {
                debug!("created scale-space sample ({channel_type}, {scale})");
                self.samples.insert(key, sample);
            }
            Err(err) => warn!("skipping scale-space sample ({channel_type}, {scale}): {err}"),
        }
    }

    pub fn sample(&self, channel_type: ChannelType, scale: f64) -> Result<&Array2<f64>> {
        self.samples
            .get(&(channel_type, Scale::new(scale)))
            .ok_or_else(|| {
                warn!("no scale-space sample ({channel_type}, {scale}) in cache");
                CrfhError::CacheMiss(format!("scale-space sample ({channel_type}, {scale})"))
            })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GrayImage, Luma};

    use super::*;

    fn ramp() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(8, 6, |x, y| Luma([(x * 20 + y) as u8])))
    }

    #[test]
    fn sample_requires_channel_and_filter() {
        let img = ramp();
        let mut filters = FilterCache::new();
        filters.create_filter(FilterId::gaussian(2.0)).unwrap();

        // no channel yet
        let channels = ChannelCache::new(&img);
        let mut scale_space = ScaleSpaceCache::new(&channels, &filters);
        scale_space.create_scale_space_sample(ChannelType::Luminance, 2.0);
        assert!(scale_space.is_empty());

        let mut channels = ChannelCache::new(&img);
        channels.create_channel(ChannelType::Luminance);
        let mut scale_space = ScaleSpaceCache::new(&channels, &filters);
        // no Gaussian(4) filter
        scale_space.create_scale_space_sample(ChannelType::Luminance, 4.0);
        assert!(scale_space.is_empty());
        assert!(matches!(
            scale_space.sample(ChannelType::Luminance, 4.0),
            Err(CrfhError::CacheMiss(_))
        ));

        scale_space.create_scale_space_sample(ChannelType::Luminance, 2.0);
        scale_space.create_scale_space_sample(ChannelType::Luminance, 2.0);
        assert_eq!(scale_space.len(), 1);
        let sample = scale_space.sample(ChannelType::Luminance, 2.0).unwrap();
        assert_eq!(sample.dim(), (6, 8));
    }

    #[test]
    fn zero_scale_sample_equals_channel() {
        let img = ramp();
        let mut filters = FilterCache::new();
        filters.create_filter(FilterId::gaussian(0.0)).unwrap();
        let mut channels = ChannelCache::new(&img);
        channels.create_channel(ChannelType::Luminance);
        let mut scale_space = ScaleSpaceCache::new(&channels, &filters);
        scale_space.create_scale_space_sample(ChannelType::Luminance, 0.0);
        assert_eq!(
            scale_space.sample(ChannelType::Luminance, 0.0).unwrap(),
            channels.channel(ChannelType::Luminance).unwrap()
        );
    }
}

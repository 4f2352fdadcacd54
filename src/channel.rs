//! Per-image derived channels.

use std::collections::HashMap;
use std::fmt;

use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::map::map_colors;
use log::{debug, trace, warn};
use ndarray::Array2;
use nshare::AsNdarray2;

use crate::error::{CrfhError, Result};

/// Dense 2D array of filter inputs or responses, indexed `(row, col)`.
pub type Channel = Array2<f64>;

/// Kind of channel derived from the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ChannelType {
    /// HLS lightness in `[0, 255]`.
    Luminance,
}

impl ChannelType {
    /// Derive this channel from `image`. `None` if the image has no pixels.
    pub fn derive(self, image: &DynamicImage) -> Option<Channel> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        match self {
            ChannelType::Luminance => Some(luminance(image)),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Luminance => write!(f, "luminance"),
        }
    }
}

/// HLS lightness `(max + min) / 2` of an 8-bit RGB pixel, rounded to nearest.
pub fn lightness(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    let max = r.max(g).max(b) as u16;
    let min = r.min(g).min(b) as u16;
    ((max + min + 1) / 2) as u8
}

/// Lightness channel of `image`. Gray images are used as they are.
pub fn luminance(image: &DynamicImage) -> Channel {
    match image {
        DynamicImage::ImageLuma8(gray) => gray_to_channel(gray),
        other => gray_to_channel(&map_colors(&other.to_rgb8(), |px| Luma([lightness(px)]))),
    }
}

fn gray_to_channel(gray: &GrayImage) -> Channel {
    gray.as_ndarray2().mapv(f64::from)
}

/// Channels derived from one image, each computed at most once.
///
/// Lives for the duration of one extraction and borrows the image it was created for.
pub struct ChannelCache<'a> {
    image: &'a DynamicImage,
    channels: HashMap<ChannelType, Channel>,
}

impl<'a> ChannelCache<'a> {
    pub fn new(image: &'a DynamicImage) -> Self {
        ChannelCache {
            image,
            channels: HashMap::new(),
        }
    }

    /// Derive `channel_type` from the image unless it is already cached.
    ///
    /// Derivation failures are logged and leave the channel absent; a later [`Self::channel`]
    /// lookup reports the miss.
    pub fn create_channel(&mut self, channel_type: ChannelType) {
        if self.channels.contains_key(&channel_type) {
            trace!("channel {channel_type} already cached");
            return;
        }
        match channel_type.derive(self.image) {
            Some(channel) => {
                debug!("derived {channel_type} channel of shape {:?}", channel.dim());
                self.channels.insert(channel_type, channel);
            }
            None => warn!(
                "could not derive {channel_type} channel from {}x{} image",
                self.image.width(),
                self.image.height()
            ),
        }
    }

    pub fn channel(&self, channel_type: ChannelType) -> Result<&Channel> {
        self.channels.get(&channel_type).ok_or_else(|| {
            warn!("no {channel_type} channel in cache");
            CrfhError::CacheMiss(format!("{channel_type} channel"))
        })
    }

    pub fn contains(&self, channel_type: ChannelType) -> bool {
        self.channels.contains_key(&channel_type)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[test]
fn lightness_of_pixels() {
    assert_eq!(lightness(Rgb([0, 0, 0])), 0);
    assert_eq!(lightness(Rgb([255, 255, 255])), 255);
    assert_eq!(lightness(Rgb([128, 128, 128])), 128);
    assert_eq!(lightness(Rgb([255, 0, 0])), 128);
    assert_eq!(lightness(Rgb([10, 200, 30])), 105);
}

#[test]
fn gray_image_is_used_directly() {
    let img = GrayImage::from_fn(3, 2, |x, y| Luma([(10 * x + 100 * y) as u8]));
    let channel = luminance(&DynamicImage::ImageLuma8(img));
    // rows are image y, columns image x
    assert_eq!(channel.dim(), (2, 3));
    assert_eq!(channel[(1, 2)], 120.0);
    assert_eq!(channel[(0, 1)], 10.0);
}

#[test]
fn rgb_image_maps_to_lightness() {
    let img = image::RgbImage::from_fn(2, 2, |x, _| {
        if x == 0 {
            Rgb([255, 0, 0])
        } else {
            Rgb([40, 40, 40])
        }
    });
    let channel = luminance(&DynamicImage::ImageRgb8(img));
    assert_eq!(channel.dim(), (2, 2));
    assert_eq!(channel[(0, 0)], 128.0);
    assert_eq!(channel[(1, 1)], 40.0);
}

#[test]
fn channel_cache_is_idempotent() {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([7])));
    let mut cache = ChannelCache::new(&img);
    assert!(matches!(
        cache.channel(ChannelType::Luminance),
        Err(CrfhError::CacheMiss(_))
    ));
    cache.create_channel(ChannelType::Luminance);
    let first = cache.channel(ChannelType::Luminance).unwrap() as *const Channel;
    cache.create_channel(ChannelType::Luminance);
    let second = cache.channel(ChannelType::Luminance).unwrap() as *const Channel;
    assert!(std::ptr::eq(first, second));
    assert_eq!(cache.len(), 1);
}

#[test]
fn empty_image_leaves_channel_absent() {
    let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
    let mut cache = ChannelCache::new(&img);
    cache.create_channel(ChannelType::Luminance);
    assert!(cache.is_empty());
    assert!(cache.channel(ChannelType::Luminance).is_err());
}

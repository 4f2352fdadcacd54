// Composed Receptive-Field Histograms for Rust.
// It is made available under the terms of the MIT license included in the root of this repository.
//
// Copyright 2024 The crfh developers

//! This crate computes Composed Receptive-Field Histograms (CRFH), a global image descriptor
//! for appearance-based place and object recognition.
//!
//! An image is reduced to its lightness channel and smoothed with Gaussians of the requested
//! scales. Each descriptor then reads one smoothed sample, optionally through a Cartesian
//! derivative filter that is scale-normalised, and every pixel votes for one bin of the joint
//! histogram over all descriptor responses. The histogram is stored sparsely, so only bins
//! that are hit cost memory.
//!
//! Descriptors are written as `Name(scale,bins)` and joined with `+`, for example
//! `Lxx(8,28)+Lxy(8,28)+Lyy(8,28)`. The scale is the Gaussian variance and the supported names
//! are `L`, `Lx`, `Ly`, `Lxx`, `Lyy` and `Lxy`.
//!
//! Useful resources:
//! - [1]: Linde, Lindeberg 2004, "Object recognition using composed receptive field
//!   histograms of higher dimensionality"
//! - [2]: Lindeberg 1998, "Feature detection with automatic scale selection", for the
//!   scale-normalised derivatives
//!
//! ```no_run
//! use crfh::{crfh, ExtractionConfig};
//!
//! let img = image::open("room.png")?;
//! let hist = crfh(&img, &ExtractionConfig::new("Lxx(8,28)+Lxy(8,28)+Lyy(8,28)"))?;
//! println!("{hist}");
//! # Ok::<(), crfh::CrfhError>(())
//! ```

use image::DynamicImage;

pub mod channel;
pub mod config;
pub mod convolution;
pub mod descriptor;
mod error;
pub mod filter;
pub mod histogram;
pub mod scale_space;
mod system;

pub use channel::{Channel, ChannelCache, ChannelType};
pub use config::{ExtractionConfig, HistogramOptions};
pub use descriptor::{Descriptor, DescriptorKind, DescriptorList};
pub use error::{CrfhError, Result};
pub use filter::{Filter, FilterCache, FilterId};
pub use histogram::{Crfh, SparseNode};
pub use scale_space::ScaleSpaceCache;
pub use system::System;

/// Compute the histogram of `img` as described by `config`.
///
/// Builds a [`System`] for the configured descriptors, so prefer [`System::process`] when
/// extracting from many images.
pub fn crfh(img: &DynamicImage, config: &ExtractionConfig) -> Result<Crfh> {
    System::new(&config.descriptors)?.process(img, &config.histogram)
}

//! Extraction settings shared by the library entry points and the `crfh` binary.

use crate::descriptor::DescriptorList;

/// Second-order descriptors at scales 8 and 2 with 28 bins each.
pub const DEFAULT_DESCRIPTORS: &str = "Lxx(8,28)+Lxy(8,28)+Lyy(8,28)+Lxx(2,28)+Lxy(2,28)+Lyy(2,28)";

/// How a histogram is built from the descriptor responses and post-processed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct HistogramOptions {
    /// Pixels this close to the image border do not contribute.
    pub skip_border_pixels: usize,
    /// Passed to [`crate::Crfh::filter`] when positive.
    pub min_hist_value: f64,
    /// Divide by the total after filtering.
    pub normalize: bool,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        HistogramOptions {
            skip_border_pixels: 0,
            min_hist_value: 0.0,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ExtractionConfig {
    /// Descriptor spec, `Name(scale,bins)` tokens joined with `+`.
    pub descriptors: String,
    pub histogram: HistogramOptions,
}

impl ExtractionConfig {
    pub fn new(descriptors: impl Into<String>) -> Self {
        ExtractionConfig {
            descriptors: descriptors.into(),
            histogram: HistogramOptions::default(),
        }
    }

    /// Parse and validate the descriptor spec.
    pub fn descriptor_list(&self) -> crate::Result<DescriptorList> {
        self.descriptors.parse()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig::new(DEFAULT_DESCRIPTORS)
    }
}

#[test]
fn default_descriptors_parse() {
    let config = ExtractionConfig::default();
    let list = config.descriptor_list().unwrap();
    assert_eq!(list.len(), 6);
    assert_eq!(list.to_string(), DEFAULT_DESCRIPTORS);
    assert_eq!(list.total_bins(), Some(28i64.pow(6)));
    assert!(config.histogram.normalize);
}

#[test]
fn config_from_json() {
    let config: ExtractionConfig = serde_json::from_str(
        r#"{"descriptors":"L(0,4)","histogram":{"skip_border_pixels":2,"min_hist_value":0.01,"normalize":false}}"#,
    )
    .unwrap();
    assert_eq!(config.descriptors, "L(0,4)");
    assert_eq!(
        config.histogram,
        HistogramOptions {
            skip_border_pixels: 2,
            min_hist_value: 0.01,
            normalize: false,
        }
    );
}

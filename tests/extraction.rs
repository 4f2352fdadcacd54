mod common;

use common::synthetic_image::{bands, checkerboard, gradient, uniform_gray, uniform_rgb};
use crfh::{
    crfh, CrfhError, DescriptorList, ExtractionConfig, HistogramOptions, SparseNode, System,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn raw() -> HistogramOptions {
    HistogramOptions {
        normalize: false,
        ..Default::default()
    }
}

#[test]
fn uniform_image_fills_one_bin() {
    init_logger();
    let system = System::new("L(0,4)").unwrap();
    let img = uniform_gray(4, 4, 128);

    let hist = system.compute_histogram(&img, 0).unwrap();
    // floor(128 * (4 - eps) / 255) = 2
    assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(2, 16.0)]);
    assert_eq!(hist.total(), 16.0);
    assert_eq!(hist.max(), 16.0);
    insta::assert_snapshot!(hist.to_string(), @"2:16");

    let normalized = crfh(&img, &ExtractionConfig::new("L(0,4)")).unwrap();
    assert_eq!(normalized.iter().collect::<Vec<_>>(), vec![(2, 1.0)]);
    assert_eq!(
        normalized.to_sparse_vector(),
        vec![
            SparseNode {
                index: 2,
                value: 1.0
            },
            SparseNode::SENTINEL
        ]
    );
}

#[test]
fn counts_sum_to_total() {
    init_logger();
    let system = System::new(&ExtractionConfig::default().descriptors).unwrap();
    let img = gradient(40, 30);
    let hist = system.compute_histogram(&img, 3).unwrap();
    assert_eq!(hist.total(), (34 * 24) as f64);
    assert_eq!(hist.iter().map(|(_, c)| c).sum::<f64>(), hist.total());
    assert!(hist.max() <= hist.total());
    assert!(hist.iter().all(|(_, c)| c >= 1.0 && c <= hist.max()));
    let indices = hist.iter().map(|(i, _)| i).collect::<Vec<_>>();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn normalized_values_times_total_are_counts() {
    init_logger();
    let system = System::new("L(1,8)+Lx(1,8)+Ly(1,8)").unwrap();
    let img = checkerboard(24, 24, 6);
    let counts = system.process(&img, &raw()).unwrap();
    let normalized = system.process(&img, &HistogramOptions::default()).unwrap();
    assert_eq!(counts.len(), normalized.len());
    for ((i, c), (j, v)) in counts.iter().zip(normalized.iter()) {
        assert_eq!(i, j);
        assert!((v * normalized.total() - c).abs() < 1e-9);
    }
}

#[test]
fn descriptor_count_matches_tokens() {
    let spec = "Lxx(8,28)+Lxy(8,28)+Lyy(8,28)+Lxx(2,28)+Lxy(2,28)+Lyy(2,28)";
    let list: DescriptorList = spec.parse().unwrap();
    assert_eq!(list.len(), spec.split('+').count());
    assert_eq!(list.to_string(), spec);

    let system = System::new("L(0, 4) + Lx(1,8)").unwrap();
    assert_eq!(system.descriptors().len(), 2);
    assert_eq!(system.spec(), "L(0,4)+Lx(1,8)");
}

#[test]
fn unknown_descriptor_name_is_rejected() {
    init_logger();
    for spec in ["Lzz(1,4)", "L(0,4)+lx(1,4)", "L(0,4)+", "", "L[0,4]", "L(a,4)"] {
        assert!(
            matches!(System::new(spec), Err(CrfhError::Configuration(_))),
            "{spec:?} should not parse"
        );
    }
    let err = crfh(&uniform_gray(4, 4, 0), &ExtractionConfig::new("Lzz(1,4)")).unwrap_err();
    assert!(matches!(err, CrfhError::Configuration(_)));
}

#[test]
fn filter_drops_low_indices() {
    init_logger();
    // L(0,3): 0 -> bin 0, 100 -> bin 1, 200 -> bin 2
    let img = bands(10, &[(5, 0), (3, 100), (2, 200)]);
    let system = System::new("L(0,3)").unwrap();

    let hist = system.process(&img, &raw()).unwrap();
    assert_eq!(
        hist.iter().collect::<Vec<_>>(),
        vec![(0, 50.0), (1, 30.0), (2, 20.0)]
    );

    // threshold 0.015 * 100 = 1.5 is compared against the index
    let config = ExtractionConfig {
        descriptors: "L(0,3)".into(),
        histogram: HistogramOptions {
            min_hist_value: 0.015,
            ..Default::default()
        },
    };
    let hist = crfh(&img, &config).unwrap();
    assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(2, 0.2)]);
    assert_eq!(hist.total(), 100.0);
}

#[test]
fn rgb_input_uses_lightness() {
    init_logger();
    let system = System::new("L(1,8)+Lx(1,8)").unwrap();
    let rgb = system
        .compute_histogram(&uniform_rgb(6, 5, [255, 0, 0]), 0)
        .unwrap();
    let gray = system
        .compute_histogram(&uniform_gray(6, 5, 128), 0)
        .unwrap();
    assert_eq!(rgb, gray);
    assert_eq!(rgb.total(), 30.0);
}

#[test]
fn first_descriptor_is_least_significant() {
    init_logger();
    // L bin 2 of 4, Lx of a constant image is 0 and falls in bin 3 of 8
    let hist = System::new("L(0,4)+Lx(0,8)")
        .unwrap()
        .compute_histogram(&uniform_gray(4, 4, 128), 0)
        .unwrap();
    assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(3 * 4 + 2, 16.0)]);

    let hist = System::new("Lx(0,8)+L(0,4)")
        .unwrap()
        .compute_histogram(&uniform_gray(4, 4, 128), 0)
        .unwrap();
    assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(2 * 8 + 3, 16.0)]);
}

#[test]
fn border_swallowing_image_gives_empty_histogram() {
    init_logger();
    let system = System::new("L(1,4)").unwrap();
    let hist = system
        .process(
            &uniform_gray(6, 20, 10),
            &HistogramOptions {
                skip_border_pixels: 3,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(hist.is_empty());
    assert_eq!(hist.total(), 0.0);
    assert_eq!(hist.to_string(), "");
    assert_eq!(hist.to_sparse_vector(), vec![SparseNode::SENTINEL]);
}

use ndarray as nd;
use proptest::prelude::*;
use randbench::{
    ErrorKind,
    population::{ PopulationQuery, infer_populations },
    readout::{ ConfusionMatrix, correct_counts, fix_negative_counts, sort_counts },
};

fn calibration() -> ConfusionMatrix {
    ConfusionMatrix::from_counts([
        ("gg", vec![9100.0, 450.0, 420.0, 30.0]),
        ("ge", vec![800.0, 8700.0, 40.0, 460.0]),
        ("eg", vec![700.0, 35.0, 8800.0, 465.0]),
        ("ee", vec![60.0, 650.0, 720.0, 8570.0]),
    ]).unwrap()
}

#[test]
fn identity_calibration_is_noop() {
    let raw: nd::Array2<f64> = nd::array![[120.0, 30.0, 5.0, 845.0], [0.0, 1.0, 2.0, 3.0]];
    let corrected = correct_counts(&raw, &nd::Array2::eye(4)).unwrap();
    assert_eq!(corrected, raw);
}

#[test]
fn repair_small_negative() {
    let fixed = fix_negative_counts(&nd::array![[120.0, -5.0, 3.0, 2.0]]).unwrap();
    assert!(fixed.iter().all(|&n| n >= 0.0));
    assert!((fixed.sum() - 120.0).abs() < 1e-9);
    assert_eq!(fixed[[0, 1]], 0.0);
}

#[test]
fn sort_high_bit_first() {
    assert_eq!(
        sort_counts(&[false, true, false], &[true, true, false]).unwrap(),
        [1, 1, 0, 1],
    );
    let err = sort_counts(&[false], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn population_from_labels() {
    let counts: nd::Array2<f64> = nd::array![[80.0, 20.0]];
    let pops =
        infer_populations(&PopulationQuery::new(&[0], &counts, &["g", "e"]))
        .unwrap();
    assert!((pops.g(0) - 0.8).abs() < 1e-12);
    assert!((pops.e(0) - 0.2).abs() < 1e-12);
    assert_eq!(pops.f(0), 0.0);
}

#[test]
fn pseudo_inverse_recovers_prepared_distribution() {
    // three states read through two noiseless readouts of four bins each
    let std_readout = ConfusionMatrix::from_counts([
        ("g", vec![1000.0, 0.0]),
        ("e", vec![0.0, 1000.0]),
        ("f", vec![0.0, 1000.0]),
    ]).unwrap();
    let shelved = ConfusionMatrix::from_counts([
        ("g", vec![0.0, 1000.0]),
        ("e", vec![1000.0, 0.0]),
        ("f", vec![0.0, 1000.0]),
    ]).unwrap();
    let combined = std_readout.concat_bins(&shelved).unwrap();
    assert_eq!(combined.num_labels(), 3);
    assert_eq!(combined.num_bins(), 4);
    assert!(!combined.is_square());
    // 60% g, 30% e, 10% f
    let raw: nd::Array2<f64> = nd::array![[600.0, 400.0, 300.0, 700.0]];
    let corrected = combined.correct(&raw).unwrap();
    let total = corrected.sum();
    let probs: Vec<f64> = corrected.iter().map(|n| n / total).collect();
    assert!((probs[0] - 0.6).abs() < 1e-6);
    assert!((probs[1] - 0.3).abs() < 1e-6);
    assert!((probs[2] - 0.1).abs() < 1e-6);
}

#[test]
fn singular_calibration_is_numerical() {
    let conf = ConfusionMatrix::from_counts([
        ("g", vec![500.0, 500.0]),
        ("e", vec![500.0, 500.0]),
    ]).unwrap();
    let err = conf.correct(&nd::array![[10.0, 20.0]]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Numerical);
}

proptest! {
    #[test]
    fn correction_keeps_totals(counts in prop::collection::vec(0_u32..5000, 4)) {
        let raw: nd::Array2<f64> =
            nd::Array2::from_shape_fn((1, 4), |(_, j)| counts[j] as f64);
        prop_assume!(raw.sum() > 0.0);
        let corrected = calibration().correct(&raw).unwrap();
        prop_assert!((corrected.sum() - raw.sum()).abs() < 1e-3);
    }

    #[test]
    fn repair_is_nonnegative_and_keeps_totals(
        row in prop::collection::vec(-50.0_f64..1000.0, 2..8)
    ) {
        let total: f64 = row.iter().sum();
        prop_assume!(total > 1.0);
        let n = row.len();
        let counts: nd::Array2<f64> = nd::Array2::from_shape_vec((1, n), row).unwrap();
        let fixed = fix_negative_counts(&counts).unwrap();
        prop_assert!(fixed.iter().all(|&x| x >= 0.0));
        prop_assert!((fixed.sum() - total).abs() < 1e-6 * total.max(1.0));
    }

    #[test]
    fn populations_sum_to_one(counts in prop::collection::vec(1_u32..5000, 4)) {
        let raw: nd::Array2<f64> =
            nd::Array2::from_shape_fn((1, 4), |(_, j)| counts[j] as f64);
        let conf = calibration();
        let order: Vec<&str> = conf.labels().iter().map(String::as_str).collect();
        let pops =
            infer_populations(
                &PopulationQuery::new(&[0, 1], &raw, &order)
                    .with_confusion(conf.matrix())
            ).unwrap();
        for (_, p) in pops.iter() {
            prop_assert!((p.total() - 1.0).abs() < 1e-9);
            prop_assert!(p.g >= -1e-12 && p.e >= -1e-12);
        }
    }
}

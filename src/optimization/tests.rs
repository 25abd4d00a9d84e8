//! Tests for clipping-bound optimization

use super::*;
use crate::config::{Calibration, QuantizationConfig, SearchConfig};
use crate::error::QuantError;
use crate::utils::{Granularity, QuantMode, MIN_BOUND};
use ndarray::{arr1, arr2, Array1, Array2, ArrayD, Axis};
use proptest::prelude::*;

fn search_config(bits: u8, granularity: Granularity, mode: QuantMode) -> QuantizationConfig {
    QuantizationConfig::builder(bits)
        .mode(mode)
        .granularity(granularity)
        .calibration(Calibration::Search(SearchConfig::default()))
        .build()
        .unwrap()
}

/// Small values spread over [-1, 1] plus one large outlier
fn with_outlier(n: usize, outlier: f32) -> Array1<f32> {
    let mut values = Array1::from_shape_fn(n, |i| (i as f32 * 0.37).sin());
    values[n / 2] = outlier;
    values
}

#[test]
fn test_observed_bound_per_tensor() {
    let tensor = arr2(&[[-3.0f32, 0.0, 3.0], [1.5, -1.5, 2.0]]).into_dyn();
    let bound = observed_bound(tensor.view(), Granularity::PerTensor, QuantMode::Symmetric).unwrap();
    assert_eq!(bound.shape(), &[1, 1]);
    assert_eq!(bound.ranges(), vec![(-3.0, 3.0)]);
}

#[test]
fn test_observed_bound_per_channel() {
    let tensor = arr2(&[[-3.0f32, 0.0, 3.0], [1.5, -1.5, 2.0]]).into_dyn();
    let rows = observed_bound(
        tensor.view(),
        Granularity::PerChannel { axis: 0 },
        QuantMode::Symmetric,
    )
    .unwrap();
    assert_eq!(rows.shape(), &[2, 1]);
    assert_eq!(rows.ranges(), vec![(-3.0, 3.0), (-2.0, 2.0)]);

    let cols = observed_bound(
        tensor.view(),
        Granularity::PerChannel { axis: 1 },
        QuantMode::Asymmetric,
    )
    .unwrap();
    assert_eq!(cols.shape(), &[1, 3]);
    assert_eq!(cols.mode(), QuantMode::Asymmetric);
    // ranges are widened to include zero
    assert_eq!(cols.ranges(), vec![(-3.0, 1.5), (-1.5, 0.0), (0.0, 3.0)]);
}

#[test]
fn test_observed_bound_all_zero_uses_epsilon() {
    let zeros = ArrayD::<f32>::zeros(vec![4, 3]);
    let sym = observed_bound(zeros.view(), Granularity::PerTensor, QuantMode::Symmetric).unwrap();
    assert_eq!(sym.ranges(), vec![(-MIN_BOUND, MIN_BOUND)]);

    let asym = observed_bound(zeros.view(), Granularity::PerTensor, QuantMode::Asymmetric).unwrap();
    let (lo, hi) = asym.ranges()[0];
    assert_eq!(lo, 0.0);
    assert!(hi >= MIN_BOUND);
}

#[test]
fn test_observed_bound_bad_axis() {
    let tensor = ArrayD::<f32>::zeros(vec![2, 2]);
    let result = observed_bound(
        tensor.view(),
        Granularity::PerChannel { axis: 2 },
        QuantMode::Symmetric,
    );
    assert!(matches!(result, Err(QuantError::ShapeError(_))));
}

#[test]
fn test_blend_moves_towards_observation() {
    let old = ClippingBound::Symmetric(arr1(&[2.0f32]).into_dyn());
    let new = ClippingBound::Symmetric(arr1(&[4.0f32]).into_dyn());
    let blended = old.blend(&new, 0.25).unwrap();
    assert_eq!(blended.ranges(), vec![(-2.5, 2.5)]);
}

#[test]
fn test_blend_rejects_shape_change() {
    let old = ClippingBound::Symmetric(arr1(&[2.0f32]).into_dyn());
    let new = ClippingBound::Symmetric(arr1(&[4.0f32, 1.0]).into_dyn());
    assert!(matches!(
        old.blend(&new, 0.5),
        Err(QuantError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_search_clips_outlier() {
    let values = with_outlier(1001, 10.0);
    let found = search_channel(
        values.view(),
        (-10.0, 10.0),
        4,
        QuantMode::Symmetric,
        &SearchConfig::default(),
        ErrorMetric::Mse,
    )
    .unwrap();
    assert!(found.ratio < 1.0, "ratio {} did not clip", found.ratio);

    let unclipped =
        quantization_error(values.view(), -10.0, 10.0, 4, QuantMode::Symmetric, ErrorMetric::Mse)
            .unwrap();
    assert!(found.error < unclipped);
}

#[test]
fn test_search_never_worse_than_absmax() {
    let values = with_outlier(257, 3.0);
    for metric in [ErrorMetric::Mse, ErrorMetric::Mae, ErrorMetric::MaxAbs] {
        let found = search_channel(
            values.view(),
            (-3.0, 3.0),
            8,
            QuantMode::Symmetric,
            &SearchConfig::default(),
            metric,
        )
        .unwrap();
        let absmax =
            quantization_error(values.view(), -3.0, 3.0, 8, QuantMode::Symmetric, metric).unwrap();
        assert!(found.error <= absmax, "{metric:?}: {} > {absmax}", found.error);
    }
}

#[test]
fn test_search_respects_small_budget() {
    let values = with_outlier(64, 5.0);
    let search = SearchConfig {
        iteration_budget: 1,
        ..SearchConfig::default()
    };
    let found = search_channel(
        values.view(),
        (-5.0, 5.0),
        8,
        QuantMode::Symmetric,
        &search,
        ErrorMetric::Mse,
    )
    .unwrap();
    assert_eq!(found.evaluations, 1);
    assert_eq!(found.ratio, 1.0);
}

#[test]
fn test_search_bound_all_zero() {
    let zeros = ArrayD::<f32>::zeros(vec![3, 5]);
    let config = search_config(8, Granularity::PerChannel { axis: 0 }, QuantMode::Symmetric);
    let bound = search_bound(zeros.view(), &config, ErrorMetric::Mse).unwrap();
    assert_eq!(bound.shape(), &[3, 1]);
    for (lo, hi) in bound.ranges() {
        assert_eq!(lo, -MIN_BOUND);
        assert_eq!(hi, MIN_BOUND);
    }
}

#[test]
fn test_search_bound_deterministic() {
    let tensor = Array2::from_shape_fn((8, 64), |(r, c)| ((r * 64 + c) as f32 * 0.71).cos() * (r + 1) as f32)
        .into_dyn();
    let config = search_config(4, Granularity::PerChannel { axis: 0 }, QuantMode::Symmetric);
    let first = search_bound(tensor.view(), &config, ErrorMetric::Mse).unwrap();
    for _ in 0..3 {
        let again = search_bound(tensor.view(), &config, ErrorMetric::Mse).unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_search_bound_per_channel_independent() {
    let mut tensor = Array2::from_shape_fn((2, 128), |(_, c)| (c as f32 * 0.13).sin());
    tensor[[1, 7]] = 25.0;
    let config = search_config(4, Granularity::PerChannel { axis: 0 }, QuantMode::Symmetric);
    let both = search_bound(tensor.view().into_dyn(), &config, ErrorMetric::Mse).unwrap();
    let per_tensor = search_config(4, Granularity::PerTensor, QuantMode::Symmetric);

    for (channel, &(_, hi)) in both.ranges().iter().enumerate() {
        let row = tensor.index_axis(Axis(0), channel).to_owned().into_dyn();
        let alone = search_bound(row.view(), &per_tensor, ErrorMetric::Mse).unwrap();
        assert_eq!(alone.ranges()[0].1, hi, "channel {channel} depends on its neighbour");
    }
    // the outlier must not leak into the quiet channel
    assert!(both.ranges()[0].1 <= 1.0);
}

#[test]
fn test_search_bound_asymmetric_contains_zero() {
    let tensor = arr2(&[[0.5f32, 1.0, 2.0, 4.0], [0.1, 0.2, 0.3, 0.4]]).into_dyn();
    let config = search_config(8, Granularity::PerChannel { axis: 0 }, QuantMode::Asymmetric);
    let bound = search_bound(tensor.view(), &config, ErrorMetric::Mse).unwrap();
    assert!(matches!(bound, ClippingBound::Asymmetric { .. }));
    for (lo, hi) in bound.ranges() {
        assert!(lo <= 0.0 && hi > 0.0);
    }
}

#[test]
fn test_search_bound_falls_back_to_default_search() {
    // an AbsMax config still searches with default parameters when asked
    let tensor = with_outlier(301, 8.0).into_dyn();
    let config = QuantizationConfig::symmetric(4).unwrap();
    let bound = search_bound(tensor.view(), &config, ErrorMetric::Mse).unwrap();
    let (_, hi) = bound.ranges()[0];
    assert!(hi < 8.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_search_within_budget(
        values in proptest::collection::vec(-10.0f32..10.0, 1..64),
        budget in 1usize..40,
        grid in 2usize..16,
    ) {
        let values = Array1::from(values);
        let observed = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let search = SearchConfig { iteration_budget: budget, grid_points: grid, ..SearchConfig::default() };
        let found = search_channel(
            values.view(),
            (-observed, observed),
            8,
            QuantMode::Symmetric,
            &search,
            ErrorMetric::Mse,
        ).unwrap();
        prop_assert!(found.evaluations <= budget);
        prop_assert!(found.ratio >= search.min_ratio - 1e-6 && found.ratio <= 1.0);
    }

    #[test]
    fn prop_searched_bound_positive(values in proptest::collection::vec(-100.0f32..100.0, 1..48)) {
        let tensor = Array1::from(values).into_dyn();
        let config = search_config(8, Granularity::PerTensor, QuantMode::Symmetric);
        let bound = search_bound(tensor.view(), &config, ErrorMetric::Mse).unwrap();
        let (_, hi) = bound.ranges()[0];
        prop_assert!(hi >= MIN_BOUND);
    }
}

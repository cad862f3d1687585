// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{
    morphology::{dilate, scale_invariant_rank},
    selection::{frequency_selection, time_selection},
    stats::*,
    sum_threshold::*,
    var_threshold::var_threshold,
    *,
};
use crate::{
    data::{GridError, Image2D, Mask2D},
    simulate::{add_broadband_burst, add_narrowband_line, noise_image},
};

/// Noise with some strong samples, some flags and the odd non-finite sample.
fn messy_grid(width: usize, height: usize, seed: u64) -> (Image2D, Mask2D) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut image = noise_image(width, height, NoiseDistribution::Gaussian, 1.0, &mut rng);
    let mut mask = Mask2D::unflagged(width, height);
    for y in 0..height {
        for x in 0..width {
            let r: f64 = rng.random();
            if r < 0.05 {
                image.set_value(x, y, 8.0 * image.value(x, y));
            } else if r < 0.1 {
                mask.set_value(x, y, true);
            } else if r < 0.105 {
                image.set_value(x, y, f32::NAN);
            } else if r < 0.107 {
                image.set_value(x, y, f32::INFINITY);
            }
        }
    }
    (image, mask)
}

const SIZES: [(usize, usize); 8] = [
    (1, 1),
    (1, 9),
    (9, 1),
    (3, 17),
    (17, 3),
    (8, 8),
    (33, 20),
    (64, 41),
];
const LENGTHS: [usize; 9] = [1, 2, 3, 4, 7, 8, 16, 64, 300];

#[test]
fn test_vectorized_sum_threshold_matches_reference() {
    for (i_size, &(width, height)) in SIZES.iter().enumerate() {
        let (image, mask) = messy_grid(width, height, i_size as u64);
        for &length in &LENGTHS {
            for threshold in [0.0, 0.5, 1.3, 3.0] {
                let mut reference = mask.clone();
                let mut vectorized = mask.clone();
                horizontal_sum_threshold_reference(&image, &mut reference, length, threshold)
                    .unwrap();
                horizontal_sum_threshold_vectorized(&image, &mut vectorized, length, threshold)
                    .unwrap();
                assert_eq!(
                    reference, vectorized,
                    "horizontal {width}x{height}, length {length}, threshold {threshold}"
                );

                let mut reference = mask.clone();
                let mut vectorized = mask.clone();
                vertical_sum_threshold_reference(&image, &mut reference, length, threshold)
                    .unwrap();
                vertical_sum_threshold_vectorized(&image, &mut vectorized, length, threshold)
                    .unwrap();
                assert_eq!(
                    reference, vectorized,
                    "vertical {width}x{height}, length {length}, threshold {threshold}"
                );
            }
        }
    }
}

#[test]
fn test_vectorized_var_threshold_matches_reference() {
    for (i_size, &(width, height)) in SIZES.iter().enumerate() {
        let (image, mask) = messy_grid(width, height, 100 + i_size as u64);
        for &length in &LENGTHS {
            for direction in [Direction::Horizontal, Direction::Vertical] {
                let mut reference = mask.clone();
                let mut vectorized = mask.clone();
                var_threshold(
                    SumThresholdAlgorithm::Reference,
                    direction,
                    &image,
                    &mut reference,
                    length,
                    2.0,
                )
                .unwrap();
                var_threshold(
                    SumThresholdAlgorithm::Vectorized,
                    direction,
                    &image,
                    &mut vectorized,
                    length,
                    2.0,
                )
                .unwrap();
                assert_eq!(reference, vectorized, "{direction:?} {width}x{height}, {length}");
            }
        }
    }
}

#[test]
fn test_sum_threshold_flags_whole_window() {
    // The mean of samples 2 to 4 is 2, above the threshold, but no single
    // sample or pair exceeds it.
    let image = Image2D::from_array(array![[0.0, 0.0, 1.5, 3.0, 1.5, 0.0, 0.0]]);
    for algorithm in [SumThresholdAlgorithm::Reference, SumThresholdAlgorithm::Vectorized] {
        let mut mask = Mask2D::unflagged(7, 1);
        sum_threshold(algorithm, Direction::Horizontal, &image, &mut mask, 1, 3.5).unwrap();
        assert_eq!(mask.count_flagged(), 0);
        sum_threshold(algorithm, Direction::Horizontal, &image, &mut mask, 2, 2.3).unwrap();
        assert_eq!(mask.count_flagged(), 0);
        sum_threshold(algorithm, Direction::Horizontal, &image, &mut mask, 3, 1.9).unwrap();
        assert_eq!(
            mask.view().row(0).to_vec(),
            vec![false, false, true, true, true, false, false]
        );
    }
}

#[test]
fn test_sum_threshold_ignores_flagged_samples() {
    let image = Image2D::from_array(array![[100.0, 0.0, 0.0, 0.0]]);
    let mut mask = Mask2D::unflagged(4, 1);
    mask.set_value(0, 0, true);
    for algorithm in [SumThresholdAlgorithm::Reference, SumThresholdAlgorithm::Vectorized] {
        let mut m = mask.clone();
        sum_threshold(algorithm, Direction::Horizontal, &image, &mut m, 2, 1.0).unwrap();
        assert_eq!(m, mask);
    }
}

#[test]
fn test_sum_threshold_long_window_covers_axis() {
    let image = Image2D::from_elem(3, 2, 2.0);
    for algorithm in [SumThresholdAlgorithm::Reference, SumThresholdAlgorithm::Vectorized] {
        let mut mask = Mask2D::unflagged(3, 2);
        sum_threshold(algorithm, Direction::Horizontal, &image, &mut mask, 1000, 1.5).unwrap();
        assert_eq!(mask, Mask2D::flagged(3, 2));
    }
}

#[test]
fn test_sum_threshold_degenerate_sizes() {
    let image = Image2D::zeros(0, 0);
    let mut mask = Mask2D::unflagged(0, 0);
    horizontal_sum_threshold_vectorized(&image, &mut mask, 4, 1.0).unwrap();
    vertical_sum_threshold_reference(&image, &mut mask, 4, 1.0).unwrap();

    let mut wrong = Mask2D::unflagged(2, 2);
    assert!(horizontal_sum_threshold_reference(&Image2D::zeros(3, 3), &mut wrong, 1, 1.0).is_err());
}

/// Flags of a single-row image after one pass in each algorithm and direction.
fn row_flags(
    values: &[f32],
    length: usize,
    threshold: f32,
    pass: fn(
        SumThresholdAlgorithm,
        Direction,
        &Image2D,
        &mut Mask2D,
        usize,
        f32,
    ) -> Result<(), GridError>,
) -> Vec<Vec<bool>> {
    let row =
        Image2D::from_array(Array2::from_shape_vec((1, values.len()), values.to_vec()).unwrap());
    let column = Image2D::from_array(row.view().t().to_owned());
    let mut results = vec![];
    for algorithm in [SumThresholdAlgorithm::Reference, SumThresholdAlgorithm::Vectorized] {
        let mut mask = Mask2D::unflagged(values.len(), 1);
        pass(algorithm, Direction::Horizontal, &row, &mut mask, length, threshold).unwrap();
        results.push(mask.view().iter().copied().collect());

        let mut mask = Mask2D::unflagged(1, values.len());
        pass(algorithm, Direction::Vertical, &column, &mut mask, length, threshold).unwrap();
        results.push(mask.view().iter().copied().collect());
    }
    results
}

#[test]
fn test_huge_finite_samples_are_flagged() {
    let mut expected = vec![false; 16];
    expected[..3].fill(true);

    // Squares of these overflow single precision.
    let mut values = vec![0.0_f32; 16];
    values[..2].fill(1.5e19);
    for flags in row_flags(&values, 2, 1.0, var_threshold) {
        assert_eq!(flags, expected);
    }
    for flags in row_flags(&[0.0, 1e20, 0.0, 0.0], 1, 1.0, var_threshold) {
        assert_eq!(flags, vec![false, true, false, false]);
    }

    // The sum of these overflows single precision.
    let mut values = vec![0.0_f32; 16];
    values[..2].fill(3e38);
    for flags in row_flags(&values, 2, 1.0, sum_threshold) {
        assert_eq!(flags, expected);
    }
    let mut values = vec![0.0_f32; 16];
    values[..2].fill(f32::MAX);
    values[2] = -f32::MAX;
    for flags in row_flags(&values, 3, 1.0, sum_threshold) {
        assert_eq!(flags[..5], [true; 5]);
        assert!(!flags[5..].contains(&true));
    }
}

#[test]
fn test_default_lengths() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    assert_eq!(config.horizontal_operation_count(), 9);
    assert_eq!(config.vertical_operation_count(), 9);
    assert_eq!(config.horizontal_operation(0).length, 1);
    assert_eq!(config.vertical_operation(8).length, 256);

    config.initialize_lengths(3).unwrap();
    assert_eq!(config.horizontal_operation(2).length, 4);
    config.initialize_lengths_single(5);
    assert_eq!(config.vertical_operation_count(), 1);
    assert_eq!(config.vertical_operation(0).length, 5);
}

#[test]
fn test_length_count_limits() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths(usize::BITS as usize).unwrap();
    assert_eq!(
        config.horizontal_operation(usize::BITS as usize - 1).length,
        1 << (usize::BITS - 1)
    );

    for count in [usize::BITS as usize + 1, 70, usize::MAX] {
        assert_eq!(
            config.initialize_lengths(count),
            Err(ThresholdError::TooManyLengths(count))
        );
    }
    // The previous schedule is kept.
    assert_eq!(config.horizontal_operation_count(), usize::BITS as usize);
}

#[test]
fn test_base_threshold_must_be_positive_and_finite() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    for base in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            config.initialize_thresholds_from_first_threshold(base, NoiseDistribution::Gaussian),
            Err(ThresholdError::InvalidBaseThreshold(_))
        ));
    }
}

#[test]
#[should_panic]
fn test_operation_out_of_bounds_panics() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths(2).unwrap();
    config.horizontal_operation(2);
}

#[test]
fn test_thresholds_from_first_threshold() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    config.initialize_thresholds_from_first_threshold(6.0, NoiseDistribution::Gaussian).unwrap();
    assert_abs_diff_eq!(config.horizontal_operation(0).threshold, 6.0);
    assert_abs_diff_eq!(config.horizontal_operation(1).threshold, 4.5);
    assert_abs_diff_eq!(config.vertical_operation(2).threshold, 3.375);
    assert_abs_diff_eq!(
        config.vertical_operation(8).threshold,
        6.0 * 1.5_f64.powi(8) / 256.0,
        epsilon = 1e-12
    );

    config.initialize_thresholds_from_first_threshold(6.0, NoiseDistribution::Uniform).unwrap();
    assert_abs_diff_eq!(config.horizontal_operation(3).threshold, 0.75);
}

#[test]
fn test_thresholds_are_monotone_in_base() {
    for distribution in [
        NoiseDistribution::Gaussian,
        NoiseDistribution::Rayleigh,
        NoiseDistribution::Uniform,
    ] {
        let mut previous: Option<ThresholdConfig> = None;
        for base in [0.01, 0.1, 1.0, 2.5, 6.0, 6.0001, 50.0] {
            let mut config = ThresholdConfig::default();
            config.initialize_lengths_default();
            config.initialize_thresholds_from_first_threshold(base, distribution).unwrap();
            if let Some(previous) = previous {
                for i in 0..config.horizontal_operation_count() {
                    assert!(
                        config.horizontal_operation(i).threshold
                            >= previous.horizontal_operation(i).threshold
                    );
                    assert!(
                        config.horizontal_operation(i).expected_false_rate
                            <= previous.horizontal_operation(i).expected_false_rate
                    );
                }
            }
            previous = Some(config);
        }
    }
}

#[test]
fn test_distribution_from_str() {
    assert_eq!(
        "Gaussian".parse::<NoiseDistribution>().unwrap(),
        NoiseDistribution::Gaussian
    );
    assert_eq!(
        "rayleigh".parse::<NoiseDistribution>().unwrap(),
        NoiseDistribution::Rayleigh
    );
    assert!(matches!(
        "cauchy".parse::<NoiseDistribution>(),
        Err(ThresholdError::UnknownDistribution(s)) if s == "cauchy"
    ));
}

#[test]
fn test_expected_false_rates() {
    // Two-sided Gaussian tail at 1σ.
    assert_abs_diff_eq!(
        NoiseDistribution::Gaussian.expected_false_rate(1, 1.0),
        0.31731,
        epsilon = 1e-5
    );
    // The mean of 4 samples has σ = 0.5.
    assert_abs_diff_eq!(
        NoiseDistribution::Gaussian.expected_false_rate(4, 0.5),
        0.31731,
        epsilon = 1e-5
    );
    assert_abs_diff_eq!(
        NoiseDistribution::Rayleigh.expected_false_rate(1, 2.0),
        (-2.0_f64).exp()
    );
    assert_abs_diff_eq!(NoiseDistribution::Uniform.expected_false_rate(1, 10.0), 0.0);
}

#[test]
fn test_execute_non_additive_clears() {
    let image = Image2D::zeros(4, 4);
    let mut mask = Mask2D::flagged(4, 4);
    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    config.initialize_thresholds_from_first_threshold(6.0, NoiseDistribution::Gaussian).unwrap();
    config.execute(&image, &mut mask, true, 1.0).unwrap();
    assert_eq!(mask.count_flagged(), 16);
    config.execute(&image, &mut mask, false, 1.0).unwrap();
    assert_eq!(mask.count_flagged(), 0);
}

#[test]
fn test_execute_sensitivity_and_directions() {
    let mut image = Image2D::zeros(16, 16);
    image.set_value(3, 5, 5.0);
    let mut config = ThresholdConfig::default();
    config.initialize_lengths(1).unwrap();
    config.initialize_thresholds_from_first_threshold(6.0, NoiseDistribution::Gaussian).unwrap();

    let mut mask = Mask2D::unflagged(16, 16);
    config.execute(&image, &mut mask, false, 1.0).unwrap();
    assert_eq!(mask.count_flagged(), 0);
    config.execute(&image, &mut mask, false, 0.5).unwrap();
    assert_eq!(mask.count_flagged(), 1);

    // An axis without operations is skipped.
    config.remove_horizontal_operations();
    config.remove_vertical_operations();
    config.execute(&image, &mut mask, false, 0.5).unwrap();
    assert_eq!(mask.count_flagged(), 0);
}

#[test]
fn test_false_rate_search() {
    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    let low = config
        .initialize_thresholds_with_false_rate(64, 0.01, NoiseDistribution::Gaussian)
        .unwrap();
    assert!(low.probes <= 64);
    assert!(low.achieved_rate > 0.0 && low.achieved_rate < 0.03);
    assert_abs_diff_eq!(
        config.horizontal_operation(0).threshold,
        low.base_threshold
    );

    let high = config
        .initialize_thresholds_with_false_rate(64, 0.001, NoiseDistribution::Gaussian)
        .unwrap();
    assert!(high.base_threshold > low.base_threshold);

    assert!(matches!(
        config.initialize_thresholds_with_false_rate(64, 1.5, NoiseDistribution::Gaussian),
        Err(ThresholdError::InvalidFalseRate(_))
    ));
    assert!(matches!(
        config.initialize_thresholds_with_false_rate(0, 0.01, NoiseDistribution::Gaussian),
        Err(ThresholdError::InvalidResolution)
    ));
}

#[test]
fn test_gaussian_burst_is_flagged() {
    let (width, height) = (200, 128);
    let sigma = 2.0;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut image = noise_image(width, height, NoiseDistribution::Gaussian, sigma, &mut rng);
    let burst_x = 117;
    add_broadband_burst(&mut image, burst_x, (20.0 * sigma) as f32);

    let mut config = ThresholdConfig::default();
    config.initialize_lengths_default();
    config
        .initialize_thresholds_with_false_rate(64, 0.001, NoiseDistribution::Gaussian)
        .unwrap();

    let mut mask = Mask2D::unflagged(width, height);
    let values = unflagged_values(&image, &mask);
    let (_, std) = winsorised_mean_and_std(&values).unwrap();
    config.execute(&image, &mut mask, true, std).unwrap();

    assert!(mask.is_column_flagged(burst_x));
    let noise_flags = mask.count_flagged() - height;
    let noise_samples = (width - 1) * height;
    assert!(
        (noise_flags as f64) < 0.01 * noise_samples as f64,
        "{noise_flags} of {noise_samples} noise samples were flagged"
    );
}

#[test]
fn test_winsorised_statistics() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let image = noise_image(100, 100, NoiseDistribution::Gaussian, 3.0, &mut rng);
    let mut values = image.view().iter().copied().collect::<Vec<_>>();
    // Outliers barely move winsorised statistics.
    values[0] = 1e6;
    values[1] = -1e6;
    let (mean, std) = winsorised_mean_and_std(&values).unwrap();
    assert_abs_diff_eq!(mean, 0.0, epsilon = 0.1);
    assert_abs_diff_eq!(std, 3.0, epsilon = 0.15);

    assert!(winsorised_mean_and_std(&[]).is_none());
    assert!(mean_and_std(&[]).is_none());
    let (mean, std) = mean_and_std(&[1.0, 3.0]).unwrap();
    assert_abs_diff_eq!(mean, 2.0);
    assert_abs_diff_eq!(std, 1.0);
}

#[test]
fn test_rayleigh_mode_and_median() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let image = noise_image(100, 100, NoiseDistribution::Rayleigh, 2.0, &mut rng);
    let values = image.view().iter().copied().collect::<Vec<_>>();
    assert_abs_diff_eq!(rayleigh_mode(&values).unwrap(), 2.0, epsilon = 0.05);

    assert_abs_diff_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
    assert_abs_diff_eq!(median(&[4.0, 1.0, 2.0, 3.0]).unwrap(), 2.5);
    assert!(median(&[]).is_none());
}

#[test]
fn test_false_rate_tails() {
    // Two-sided tails of the unit normal.
    let gaussian = NoiseDistribution::Gaussian;
    assert_abs_diff_eq!(gaussian.expected_false_rate(1, 0.0), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(
        gaussian.expected_false_rate(1, 1.0),
        0.317_310_507_9,
        epsilon = 1e-9
    );
    // 3σ for the mean of 4 samples.
    assert_abs_diff_eq!(
        gaussian.expected_false_rate(4, 1.5),
        0.002_699_796_1,
        epsilon = 1e-9
    );

    let rayleigh = NoiseDistribution::Rayleigh;
    assert_abs_diff_eq!(
        rayleigh.expected_false_rate(1, 1.0),
        (-0.5_f64).exp(),
        epsilon = 1e-12
    );
    // Above the mean, the central limit rate falls with the window length.
    assert!(rayleigh.expected_false_rate(16, 1.5) < rayleigh.expected_false_rate(4, 1.5));
    assert!(rayleigh.expected_false_rate(4, 1.5) < 0.5);

    let uniform = NoiseDistribution::Uniform;
    assert_abs_diff_eq!(
        uniform.expected_false_rate(1, 3_f64.sqrt() / 2.0),
        0.5,
        epsilon = 1e-12
    );
    assert_eq!(uniform.expected_false_rate(1, 2.0), 0.0);
}

#[test]
fn test_dilate_empty_mask_is_noop() {
    for (t, f) in [(0, 0), (1, 0), (0, 3), (5, 5)] {
        let mut mask = Mask2D::unflagged(7, 5);
        dilate(&mut mask, t, f);
        assert_eq!(mask.count_flagged(), 0);
    }
}

#[test]
fn test_dilate_single_sample() {
    let mut mask = Mask2D::unflagged(5, 5);
    mask.set_value(2, 2, true);
    dilate(&mut mask, 1, 0);
    let expected = array![
        [false, false, false, false, false],
        [false, false, false, false, false],
        [false, true, true, true, false],
        [false, false, false, false, false],
        [false, false, false, false, false],
    ];
    assert_eq!(mask.view(), expected.view());

    // Clipped at the edge.
    let mut mask = Mask2D::unflagged(5, 5);
    mask.set_value(0, 4, true);
    dilate(&mut mask, 2, 1);
    assert_eq!(mask.count_flagged(), 6);
    assert!(mask.value(2, 3));
    assert!(!mask.value(3, 4));
}

#[test]
fn test_scale_invariant_rank() {
    // With eta = 0.5, every sample inside an interval that is at least half
    // flagged is flagged.
    let mut mask = Mask2D::from_array(array![[false, true, false, true, false, false, false]]);
    scale_invariant_rank(&mut mask, 0.5, 0.0);
    assert_eq!(
        mask.view().row(0).to_vec(),
        vec![true, true, true, true, true, false, false]
    );

    // eta = 0 changes nothing.
    let original = Mask2D::from_array(array![[true, false, true], [false, false, true]]);
    let mut mask = original.clone();
    scale_invariant_rank(&mut mask, 0.0, 0.0);
    assert_eq!(mask, original);

    // eta = 1 flags everything.
    let mut mask = original.clone();
    scale_invariant_rank(&mut mask, 1.0, 0.0);
    assert_eq!(mask, Mask2D::flagged(3, 2));
}

#[test]
fn test_time_and_frequency_selection() {
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut image = noise_image(64, 32, NoiseDistribution::Gaussian, 1.0, &mut rng);
    add_broadband_burst(&mut image, 10, 10.0);

    let mut mask = Mask2D::unflagged(64, 32);
    time_selection(&image, &mut mask, 3.5);
    assert!(mask.is_column_flagged(10));
    // Only whole timesteps are flagged.
    assert_eq!(mask.count_flagged() % 32, 0);

    let mut image = noise_image(64, 32, NoiseDistribution::Gaussian, 1.0, &mut rng);
    add_narrowband_line(&mut image, 5, 10.0);
    let mut mask = Mask2D::unflagged(64, 32);
    frequency_selection(&image, &mut mask, 3.0);
    assert!(mask.is_row_flagged(5));
    assert_eq!(mask.count_flagged() % 64, 0);
    assert!(mask.count_flagged() < 64 * 32 / 2);
}

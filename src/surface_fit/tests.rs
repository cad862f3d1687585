// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use num_complex::Complex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{fringe::geometric_phases, local_fit::fit_image, svd::remove_singular_values, *};
use crate::{
    data::{
        ComplexRepresentation, GridError, Image2D, Mask2D, MetadataError, Polarisation,
        TimeFrequencyData,
    },
    simulate::{noise_image, simulated_metadata, SimulationParams},
    threshold::NoiseDistribution,
};

fn noisy_amplitude(width: usize, height: usize, seed: u64) -> TimeFrequencyData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let image = noise_image(width, height, NoiseDistribution::Rayleigh, 1.0, &mut rng);
    TimeFrequencyData::from_single(ComplexRepresentation::Amplitude, Polarisation::XX, image)
        .unwrap()
}

fn params(method: LocalFitKind) -> LocalFitParams {
    LocalFitParams {
        method,
        half_window_width: 3,
        half_window_height: 2,
        kernel_width: 1.5,
        kernel_height: 1.0,
    }
}

#[test]
fn test_local_fit_none_is_identity() {
    let mut data = noisy_amplitude(13, 7, 1);
    let mut mask = Mask2D::unflagged(13, 7);
    mask.set_value(4, 4, true);
    data.set_global_mask(mask).unwrap();

    let mut method = LocalFitMethod::new(params(LocalFitKind::None), FftPlanLock::new());
    let background = fit_background(&mut method, &data).unwrap();
    assert_eq!(background, data);
}

#[test]
fn test_fit_before_initialize_is_an_error() {
    let method = LocalFitMethod::new(LocalFitParams::default(), FftPlanLock::new());
    assert_eq!(method.task_count(), Err(SurfaceFitError::NotInitialised));
    assert_eq!(method.perform_fit(0), Err(SurfaceFitError::NotInitialised));
    assert!(matches!(
        method.background(),
        Err(SurfaceFitError::NotInitialised)
    ));

    let svd = SvdMitigater::new(1);
    assert_eq!(svd.perform_fit(0), Err(SurfaceFitError::NotInitialised));

    let fringe = FringeStopFit::new(FringeStopParams::default(), Default::default());
    assert!(matches!(
        fringe.background(),
        Err(SurfaceFitError::NotInitialised)
    ));
}

#[test]
fn test_incomplete_fit_and_bad_task() {
    let data = TimeFrequencyData::new(
        ComplexRepresentation::Amplitude,
        vec![
            (Polarisation::XX, vec![Image2D::zeros(4, 4)]),
            (Polarisation::YY, vec![Image2D::zeros(4, 4)]),
        ],
    )
    .unwrap();
    let mut method = LocalFitMethod::new(params(LocalFitKind::Average), FftPlanLock::new());
    method.initialize(&data).unwrap();
    assert_eq!(method.task_count(), Ok(2));
    method.perform_fit(1).unwrap();
    assert_eq!(
        method.background(),
        Err(SurfaceFitError::IncompleteFit {
            completed: 1,
            total: 2
        })
    );
    assert_eq!(
        method.perform_fit(2),
        Err(SurfaceFitError::TaskIndex { index: 2, count: 2 })
    );
    method.perform_fit(0).unwrap();
    assert!(method.background().is_ok());
}

#[test]
fn test_average_ignores_flags() {
    let image = Image2D::from_array(array![[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]]);
    let mut mask = Mask2D::unflagged(4, 2);
    mask.set_value(1, 0, true);
    let p = LocalFitParams {
        half_window_width: 1,
        half_window_height: 0,
        ..params(LocalFitKind::Average)
    };
    let fit = fit_image(&image, &mask, &p, &FftPlanLock::new());
    // The flagged 2.0 isn't part of any window.
    assert_abs_diff_eq!(fit.value(0, 0), 1.0);
    assert_abs_diff_eq!(fit.value(1, 0), 2.0);
    assert_abs_diff_eq!(fit.value(2, 0), 3.5);
    assert_abs_diff_eq!(fit.value(3, 1), 7.5);
}

/// The weighted-sum definition, evaluated sample by sample.
fn brute_force_gaussian(image: &Image2D, mask: &Mask2D, p: &LocalFitParams) -> Array2<f64> {
    let (w, h) = (image.width() as isize, image.height() as isize);
    let (hw, hh) = (p.half_window_width as isize, p.half_window_height as isize);
    Array2::from_shape_fn((image.height(), image.width()), |(y, x)| {
        let (x, y) = (x as isize, y as isize);
        let (mut num, mut den) = (0.0, 0.0);
        for dy in -hh..=hh {
            for dx in -hw..=hw {
                let (xx, yy) = (x + dx, y + dy);
                if xx < 0 || yy < 0 || xx >= w || yy >= h {
                    continue;
                }
                if mask.value(xx as usize, yy as usize) {
                    continue;
                }
                let weight = (-((dx * dx) as f64) / (2.0 * p.kernel_width.powi(2))
                    - ((dy * dy) as f64) / (2.0 * p.kernel_height.powi(2)))
                .exp();
                num += weight * f64::from(image.value(xx as usize, yy as usize));
                den += weight;
            }
        }
        num / den
    })
}

#[test]
fn test_gaussian_fits_match_definition() {
    let data = noisy_amplitude(37, 19, 2);
    let image = data.get_single_image().unwrap();
    let mut mask = Mask2D::unflagged(37, 19);
    for x in 10..15 {
        mask.set_value(x, 6, true);
    }
    mask.set_value(30, 12, true);

    let expected =
        brute_force_gaussian(image, &mask, &params(LocalFitKind::GaussianWeightedAverage));
    let lock = FftPlanLock::new();
    let direct = fit_image(
        image,
        &mask,
        &params(LocalFitKind::GaussianWeightedAverage),
        &lock,
    );
    let fast = fit_image(
        image,
        &mask,
        &params(LocalFitKind::FastGaussianWeightedAverage),
        &lock,
    );
    for ((y, x), &e) in expected.indexed_iter() {
        assert_abs_diff_eq!(f64::from(direct.value(x, y)), e, epsilon = 1e-5);
        assert_abs_diff_eq!(f64::from(fast.value(x, y)), e, epsilon = 1e-4);
    }
}

#[test]
fn test_all_flagged_window_falls_back_to_channel_mean() {
    let image = Image2D::from_array(array![
        [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 4.0, 10.0],
        [3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
    ]);
    let mut mask = Mask2D::unflagged(8, 2);
    for x in 0..5 {
        mask.set_value(x, 0, true);
    }
    for x in 0..8 {
        mask.set_value(x, 1, true);
    }
    let lock = FftPlanLock::new();
    for method in [
        LocalFitKind::Average,
        LocalFitKind::GaussianWeightedAverage,
        LocalFitKind::FastGaussianWeightedAverage,
        LocalFitKind::Median,
        LocalFitKind::Minimum,
    ] {
        let p = LocalFitParams {
            half_window_width: 1,
            half_window_height: 0,
            ..params(method)
        };
        let fit = fit_image(&image, &mask, &p, &lock);
        // Timesteps 0 to 3 of channel 0 only see flagged samples; the mean
        // of the unflagged samples of the channel is 5.
        for x in 0..4 {
            assert_abs_diff_eq!(fit.value(x, 0), 5.0, epsilon = 1e-5);
        }
        // Channel 1 is entirely flagged.
        for x in 0..8 {
            assert_abs_diff_eq!(fit.value(x, 1), 0.0);
        }
        // Windows with unflagged samples use them.
        assert!(fit.value(7, 0) >= 4.0, "{method}");
    }
}

#[test]
fn test_median_and_minimum() {
    let image = Image2D::from_array(array![[5.0, 1.0, 9.0, 2.0, 7.0]]);
    let mask = Mask2D::unflagged(5, 1);
    let lock = FftPlanLock::new();
    let p = LocalFitParams {
        half_window_width: 1,
        half_window_height: 0,
        ..params(LocalFitKind::Median)
    };
    let median = fit_image(&image, &mask, &p, &lock);
    assert_abs_diff_eq!(median.view(), array![[3.0, 5.0, 2.0, 7.0, 4.5]].view());

    let p = LocalFitParams {
        method: LocalFitKind::Minimum,
        ..p
    };
    let minimum = fit_image(&image, &mask, &p, &lock);
    assert_abs_diff_eq!(minimum.view(), array![[1.0, 1.0, 1.0, 2.0, 2.0]].view());
}

fn complex_noise(width: usize, height: usize, seed: u64) -> TimeFrequencyData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let real = noise_image(width, height, NoiseDistribution::Gaussian, 1.0, &mut rng);
    let imag = noise_image(width, height, NoiseDistribution::Gaussian, 1.0, &mut rng);
    TimeFrequencyData::from_complex(Polarisation::XX, real, imag).unwrap()
}

#[test]
fn test_svd_without_removal_reproduces_input() {
    let data = complex_noise(12, 9, 3);
    let mut svd = SvdMitigater::new(0);
    let background = fit_background(&mut svd, &data).unwrap();
    for (b, d) in background.images().zip(data.images()) {
        assert_abs_diff_eq!(b.view(), d.view(), epsilon = 1e-4);
    }
}

#[test]
fn test_svd_removes_strongest_component() {
    // A rank-one grid plus weak noise: removing one singular value removes
    // almost everything.
    let noise = complex_noise(10, 8, 4);
    let real = Image2D::from_fn(10, 8, |x, y| {
        100.0 * (1.0 + x as f32) * (2.0 + y as f32) + 0.01 * noise.image(0).value(x, y)
    });
    let imag = Image2D::from_fn(10, 8, |x, y| 0.01 * noise.image(1).value(x, y));
    let (re, im) = remove_singular_values(&real, &imag, 1).unwrap();
    assert!(re.view().iter().all(|v| v.abs() < 0.1));
    assert!(im.view().iter().all(|v| v.abs() < 0.1));

    // Removing more components than exist leaves nothing.
    let (re, _) = remove_singular_values(&real, &imag, 100).unwrap();
    assert!(re.view().iter().all(|v| v.abs() < 1e-3));
}

#[test]
fn test_svd_rejects_bad_input() {
    let empty = TimeFrequencyData::from_complex(
        Polarisation::XX,
        Image2D::zeros(0, 4),
        Image2D::zeros(0, 4),
    )
    .unwrap();
    let mut svd = SvdMitigater::new(1);
    assert_eq!(
        svd.initialize(&empty),
        Err(SurfaceFitError::Degenerate {
            width: 0,
            height: 4
        })
    );

    let amplitude = noisy_amplitude(4, 4, 5);
    assert!(matches!(
        svd.initialize(&amplitude),
        Err(SurfaceFitError::Grid(GridError::Representation { .. }))
    ));

    let mut real = Image2D::zeros(3, 3);
    real.set_value(1, 1, f32::NAN);
    assert_eq!(
        remove_singular_values(&real, &Image2D::zeros(3, 3), 1),
        Err(SurfaceFitError::NonFinite("SVD input"))
    );
}

#[test]
fn test_fringe_fit_recovers_rotating_source() {
    let sim = SimulationParams {
        width: 64,
        height: 8,
        time_res: 8.0,
        ..Default::default()
    };
    // A long baseline so that the fringes rotate quickly.
    let metadata = simulated_metadata(&sim, 40);
    let phases = geometric_phases(&metadata).unwrap();
    let amplitude = Complex::new(3.0, -2.0);
    let model = phases.mapv(|p| amplitude * Complex::from_polar(1.0, p));
    let real = Image2D::from_array(model.mapv(|c: Complex<f64>| c.re as f32));
    let imag = Image2D::from_array(model.mapv(|c: Complex<f64>| c.im as f32));
    let mut data = TimeFrequencyData::from_complex(Polarisation::XX, real, imag).unwrap();
    let mut mask = Mask2D::unflagged(64, 8);
    for x in 20..30 {
        mask.set_value(x, 3, true);
    }
    data.set_global_mask(mask).unwrap();

    let params = FringeStopParams {
        min_window_size: 4,
        max_window_size: 16,
        ..Default::default()
    };
    let mut fit = FringeStopFit::new(params, metadata);
    let background = fit_background(&mut fit, &data).unwrap();
    for (b, d) in background.images().zip(data.images()) {
        assert_abs_diff_eq!(b.view(), d.view(), epsilon = 1e-3);
    }
}

#[test]
fn test_fringe_fit_needs_metadata() {
    let data = complex_noise(8, 4, 6);
    let mut fit = FringeStopFit::new(FringeStopParams::default(), Default::default());
    assert_eq!(
        fit.initialize(&data),
        Err(SurfaceFitError::Metadata(MetadataError::Missing(
            "channel frequencies"
        )))
    );

    // Metadata for a differently shaped grid.
    let sim = SimulationParams::default();
    let mut fit = FringeStopFit::new(FringeStopParams::default(), simulated_metadata(&sim, 0));
    assert!(matches!(
        fit.initialize(&data),
        Err(SurfaceFitError::Metadata(MetadataError::Inconsistent { .. }))
    ));
}

#[test]
fn test_fft_plan_lock_is_shared() {
    let lock = FftPlanLock::new();
    let clone = lock.clone();
    std::thread::scope(|s| {
        for _ in 0..4 {
            let lock = clone.clone();
            s.spawn(move || lock.plan(|| ()));
        }
    });
    assert_eq!(lock.plan(|| 5), 5);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::*;
use crate::threshold::stats::{mean_and_std, unflagged_values};

#[test]
fn test_same_seed_same_data() {
    let params = SimulationParams::default();
    let a = simulate_baseline(&params, 3, 100).unwrap();
    let b = simulate_baseline(&params, 3, 100).unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.rfi, b.rfi);

    let c = simulate_baseline(&params, 4, 100).unwrap();
    assert_ne!(a.data, c.data);
}

#[test]
fn test_noise_statistics() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mask = Mask2D::unflagged(200, 100);
    for (distribution, expected_mean, expected_std) in [
        (NoiseDistribution::Gaussian, 0.0, 2.0),
        (NoiseDistribution::Uniform, 0.0, 2.0),
        // Mode 2; the mean of a Rayleigh distribution is σ √(π/2) and its
        // standard deviation is σ √((4 - π) / 2).
        (
            NoiseDistribution::Rayleigh,
            2.0 * (std::f64::consts::PI / 2.0).sqrt(),
            2.0 * ((4.0 - std::f64::consts::PI) / 2.0).sqrt(),
        ),
    ] {
        let image = noise_image(200, 100, distribution, 2.0, &mut rng);
        let (mean, std) = mean_and_std(&unflagged_values(&image, &mask)).unwrap();
        assert_abs_diff_eq!(mean, expected_mean, epsilon = 0.05);
        assert_abs_diff_eq!(std, expected_std, epsilon = 0.05);
    }

    let uniform = noise_image(50, 50, NoiseDistribution::Uniform, 1.0, &mut rng);
    assert!(uniform
        .view()
        .iter()
        .all(|v| v.abs() <= 3_f32.sqrt()));
}

#[test]
fn test_rfi_mask_matches_injection() {
    let params = SimulationParams {
        noise_sigma: 0.0,
        rfi_amplitude: 10.0,
        ..Default::default()
    };
    // The RFI amplitude is relative to the noise, so noiseless data is zero.
    let sim = simulate_baseline(&params, 0, 7).unwrap();
    assert!(sim.data.images().all(|i| i.view().iter().all(|&v| v == 0.0)));

    let params = SimulationParams {
        noise_sigma: 1.0,
        rfi_amplitude: 1000.0,
        ..Default::default()
    };
    let sim = simulate_baseline(&params, 0, 7).unwrap();
    assert!(sim.rfi.count_flagged() > 0);
    for (i_image, image) in sim.data.images().enumerate() {
        for ((y, x), &v) in image.view().indexed_iter() {
            let contaminated = v.abs() > 500.0;
            if i_image % 2 == 0 {
                // Only the real parts carry RFI.
                assert_eq!(contaminated, sim.rfi.value(x, y), "({x}, {y})");
            } else {
                assert!(!contaminated);
            }
        }
    }
}

#[test]
fn test_simulated_data_shape() {
    let params = SimulationParams {
        width: 20,
        height: 10,
        polarisations: vec![Polarisation::XX, Polarisation::XY, Polarisation::YY],
        ..Default::default()
    };
    let sim = simulate_baseline(&params, 1, 0).unwrap();
    assert!(sim.data.is_complex());
    assert_eq!(sim.data.polarisation_count(), 3);
    assert_eq!(sim.data.image_count(), 6);
    assert_eq!((sim.data.width(), sim.data.height()), (20, 10));
    assert_eq!((sim.rfi.width(), sim.rfi.height()), (20, 10));

    let metadata = &sim.metadata;
    metadata.check_consistent(20, 10).unwrap();
    assert_eq!(metadata.timestamps().unwrap().len(), 20);
    let freqs = metadata.channel_freqs().unwrap();
    assert_abs_diff_eq!(freqs[0], 150e6);
    assert_abs_diff_eq!(freqs[9], 150e6 + 9.0 * 40e3);
    assert_eq!(
        metadata.baseline_description().as_deref(),
        Some("Tile000 x Tile002")
    );
}

#[test]
fn test_empty_simulation() {
    let params = SimulationParams {
        width: 0,
        height: 0,
        ..Default::default()
    };
    let sim = simulate_baseline(&params, 0, 0).unwrap();
    assert_eq!(sim.rfi.count_flagged(), 0);
    assert_eq!(sim.data.width(), 0);
}

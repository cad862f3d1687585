// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic time-frequency data: seeded noise with injected RFI.
//!
//! Used to find thresholds for a given false-alarm rate, by the
//! `flag-simulated` subcommand and by tests.

#[cfg(test)]
mod tests;

use hifitime::{Duration, Epoch};
use marlu::{constants::MWA_LONG_RAD, RADec, XyzGeodetic};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        Antenna, ComplexRepresentation, GridError, Image2D, Mask2D, Polarisation,
        TimeFrequencyData, TimeFrequencyMetadata,
    },
    threshold::NoiseDistribution,
};

/// An image of independent noise samples. Gaussian noise has standard
/// deviation `sigma`, Rayleigh noise has mode `sigma` and uniform noise is
/// spread over [-√3 `sigma`, √3 `sigma`] so that its standard deviation is
/// `sigma`.
pub fn noise_image<R: Rng + ?Sized>(
    width: usize,
    height: usize,
    distribution: NoiseDistribution,
    sigma: f64,
    rng: &mut R,
) -> Image2D {
    Image2D::from_fn(width, height, |_, _| {
        let v = match distribution {
            NoiseDistribution::Gaussian => sigma * rng.sample::<f64, _>(StandardNormal),
            NoiseDistribution::Rayleigh => {
                let re: f64 = rng.sample(StandardNormal);
                let im: f64 = rng.sample(StandardNormal);
                sigma * re.hypot(im)
            }
            NoiseDistribution::Uniform => {
                sigma * 3_f64.sqrt() * (2.0 * rng.random::<f64>() - 1.0)
            }
        };
        v as f32
    })
}

/// Add `amplitude` to every channel of timestep `x`.
pub fn add_broadband_burst(image: &mut Image2D, x: usize, amplitude: f32) {
    image
        .view_mut()
        .column_mut(x)
        .mapv_inplace(|v| v + amplitude);
}

/// Add `amplitude` to every timestep of channel `y`.
pub fn add_narrowband_line(image: &mut Image2D, y: usize, amplitude: f32) {
    image.view_mut().row_mut(y).mapv_inplace(|v| v + amplitude);
}

/// The shape of a simulated observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// The number of timesteps.
    pub width: usize,
    /// The number of channels.
    pub height: usize,
    pub polarisations: Vec<Polarisation>,
    /// The standard deviation of the real and imaginary noise.
    pub noise_sigma: f64,
    /// The number of broadband bursts per baseline.
    pub num_bursts: usize,
    /// The number of narrowband lines per baseline.
    pub num_lines: usize,
    /// The amplitude of injected RFI, in units of `noise_sigma`.
    pub rfi_amplitude: f64,
    pub first_freq_hz: f64,
    pub freq_res_hz: f64,
    /// \[seconds\]
    pub time_res: f64,
    /// GPS seconds of the first timestep.
    pub first_gps: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            width: 128,
            height: 64,
            polarisations: vec![Polarisation::XX, Polarisation::YY],
            noise_sigma: 1.0,
            num_bursts: 2,
            num_lines: 2,
            rfi_amplitude: 20.0,
            first_freq_hz: 150e6,
            freq_res_hz: 40e3,
            time_res: 2.0,
            first_gps: 1090008640.0,
        }
    }
}

/// One simulated baseline and the samples that RFI was injected into.
#[derive(Debug, Clone)]
pub struct SimulatedBaseline {
    pub data: TimeFrequencyData,
    pub metadata: TimeFrequencyMetadata,
    pub rfi: Mask2D,
}

/// Simulate complex data of a single baseline. The same seed always produces
/// the same data.
pub fn simulate_baseline(
    params: &SimulationParams,
    baseline_index: usize,
    seed: u64,
) -> Result<SimulatedBaseline, GridError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(baseline_index as u64));
    let (width, height) = (params.width, params.height);
    let amplitude = (params.rfi_amplitude * params.noise_sigma) as f32;

    let mut rfi = Mask2D::unflagged(width, height);
    let bursts: Vec<usize> = if width > 0 {
        (0..params.num_bursts)
            .map(|_| rng.random_range(0..width))
            .collect()
    } else {
        vec![]
    };
    let lines: Vec<usize> = if height > 0 {
        (0..params.num_lines)
            .map(|_| rng.random_range(0..height))
            .collect()
    } else {
        vec![]
    };
    for &x in &bursts {
        rfi.view_mut().column_mut(x).fill(true);
    }
    for &y in &lines {
        rfi.view_mut().row_mut(y).fill(true);
    }

    let mut polarisations = Vec::with_capacity(params.polarisations.len());
    for &pol in &params.polarisations {
        let mut real = noise_image(
            width,
            height,
            NoiseDistribution::Gaussian,
            params.noise_sigma,
            &mut rng,
        );
        let imag = noise_image(
            width,
            height,
            NoiseDistribution::Gaussian,
            params.noise_sigma,
            &mut rng,
        );
        for &x in &bursts {
            add_broadband_burst(&mut real, x, amplitude);
        }
        for &y in &lines {
            add_narrowband_line(&mut real, y, amplitude);
        }
        polarisations.push((pol, vec![real, imag]));
    }
    let data = TimeFrequencyData::new(ComplexRepresentation::Complex, polarisations)?;

    Ok(SimulatedBaseline {
        data,
        metadata: simulated_metadata(params, baseline_index),
        rfi,
    })
}

/// Plausible metadata for a simulated baseline: a regular band and time axis,
/// an east-west baseline whose length grows with its index, and a phase
/// centre near the zenith of the MWA.
pub fn simulated_metadata(
    params: &SimulationParams,
    baseline_index: usize,
) -> TimeFrequencyMetadata {
    let first_epoch = Epoch::from_gpst_seconds(params.first_gps);
    let timestamps = (0..params.width)
        .map(|i| first_epoch + Duration::from_seconds(i as f64 * params.time_res))
        .collect();
    let channel_freqs = (0..params.height)
        .map(|i| params.first_freq_hz + i as f64 * params.freq_res_hz)
        .collect();
    let antenna = |i: usize| Antenna {
        name: format!("Tile{i:03}"),
        position: XyzGeodetic {
            x: 0.0,
            y: 50.0 * i as f64,
            z: 0.0,
        },
    };

    TimeFrequencyMetadata {
        channel_freqs: Some(channel_freqs),
        timestamps: Some(timestamps),
        antenna1: Some(antenna(0)),
        antenna2: Some(antenna(baseline_index + 1)),
        phase_centre: Some(RADec::from_degrees(0.0, -27.0)),
        array_longitude_rad: Some(MWA_LONG_RAD),
        dut1: Duration::default(),
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fitting the fringes of a source at the phase centre.
//!
//! A source at the phase centre of a baseline rotates with the geometric
//! phase φ(t, f) = 2π f w(t) / c. For every channel, the complex amplitude of
//! `e^{iφ}` is fitted over a sliding window of timesteps, and the background
//! is that amplitude times `e^{iφ}`.

use log::{debug, trace};
use marlu::{pos::xyz::xyzs_to_cross_uvws, precession::get_lmst};
use ndarray::prelude::*;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use super::{FitState, SurfaceFitError, SurfaceFitMethod};
use crate::{
    constants::{TAU, VEL_C},
    data::{Image2D, Mask2D, MetadataError, TimeFrequencyData, TimeFrequencyMetadata},
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FringeStopParams {
    /// The number of fringes that a fitting window should span.
    pub fringes_to_consider: f64,
    /// \[timesteps\]
    pub min_window_size: usize,
    /// \[timesteps\]
    pub max_window_size: usize,
}

impl Default for FringeStopParams {
    fn default() -> Self {
        FringeStopParams {
            fringes_to_consider: 1.0,
            min_window_size: 32,
            max_window_size: 128,
        }
    }
}

/// One task per polarisation. Requires complex data and metadata with the
/// band, timestamps, antenna pair, phase centre and array longitude.
pub struct FringeStopFit {
    params: FringeStopParams,
    metadata: TimeFrequencyMetadata,
    state: Option<FringeState>,
}

struct FringeState {
    fit: FitState,
    /// Geometric phases with shape (channels, timesteps).
    phases: Array2<f64>,
    window_size: usize,
}

impl FringeStopFit {
    pub fn new(params: FringeStopParams, metadata: TimeFrequencyMetadata) -> FringeStopFit {
        FringeStopFit {
            params,
            metadata,
            state: None,
        }
    }

    fn state(&self) -> Result<&FringeState, SurfaceFitError> {
        self.state.as_ref().ok_or(SurfaceFitError::NotInitialised)
    }
}

/// The geometric phase of a source at the phase centre for every channel and
/// timestep, with shape (channels, timesteps).
pub fn geometric_phases(metadata: &TimeFrequencyMetadata) -> Result<Array2<f64>, MetadataError> {
    let freqs = metadata.channel_freqs()?;
    let timestamps = metadata.timestamps()?;
    let (antenna1, antenna2) = metadata.antennas()?;
    let phase_centre = metadata.phase_centre()?;
    let longitude = metadata.array_longitude_rad()?;

    let xyzs = [antenna1.position, antenna2.position];
    let ws: Vec<f64> = timestamps
        .iter()
        .map(|&epoch| {
            let lst = get_lmst(longitude, epoch, metadata.dut1);
            trace!(
                "GPS timestamp {}, LMST {}°",
                epoch.to_gpst_seconds(),
                lst.to_degrees()
            );
            xyzs_to_cross_uvws(&xyzs, phase_centre.to_hadec(lst))[0].w
        })
        .collect();

    Ok(Array2::from_shape_fn(
        (freqs.len(), ws.len()),
        |(i_freq, i_time)| TAU * freqs[i_freq] * ws[i_time] / VEL_C,
    ))
}

/// The number of timesteps that span `fringes_to_consider` fringes of the
/// fastest-rotating channel, clamped to the window limits and the number of
/// timesteps.
fn window_size(phases: &Array2<f64>, params: &FringeStopParams) -> usize {
    let num_timesteps = phases.ncols();
    let max_rate = phases
        .rows()
        .into_iter()
        .map(|row| {
            if num_timesteps < 2 {
                0.0
            } else {
                (row[num_timesteps - 1] - row[0]).abs() / (num_timesteps - 1) as f64
            }
        })
        .fold(0.0, f64::max);
    let fringes_per_timestep = max_rate / TAU;

    let min = params.min_window_size.max(1);
    let max = params.max_window_size.max(min);
    let size = if fringes_per_timestep > 0.0 {
        let size = params.fringes_to_consider / fringes_per_timestep;
        if size.is_finite() {
            (size.round() as usize).clamp(min, max)
        } else {
            max
        }
    } else {
        max
    };
    size.min(num_timesteps.max(1))
}

impl SurfaceFitMethod for FringeStopFit {
    fn initialize(&mut self, data: &TimeFrequencyData) -> Result<(), SurfaceFitError> {
        data.require_complex("Fringe stopping")?;
        self.metadata
            .check_consistent(data.width(), data.height())?;
        let phases = geometric_phases(&self.metadata)?;
        let window_size = window_size(&phases, &self.params);
        debug!("Fringe-stopping window is {window_size} timesteps");
        self.state = Some(FringeState {
            fit: FitState::new(data.clone(), data.polarisation_count()),
            phases,
            window_size,
        });
        Ok(())
    }

    fn task_count(&self) -> Result<usize, SurfaceFitError> {
        Ok(self.state()?.fit.slots.len())
    }

    fn perform_fit(&self, task: usize) -> Result<(), SurfaceFitError> {
        let state = self.state()?;
        state.fit.check_task(task)?;
        let images = state.fit.input.polarisation_images(task);
        let mask = state.fit.input.mask_for_polarisation(task);
        let (real, imag) =
            fit_fringes(&images[0], &images[1], &mask, &state.phases, state.window_size);
        state.fit.store(task, vec![real, imag]);
        Ok(())
    }

    fn background(&self) -> Result<TimeFrequencyData, SurfaceFitError> {
        let state = self.state()?;
        Ok(state.fit.input.with_images_replaced(state.fit.collect()?)?)
    }
}

/// Fit and evaluate the fringe model of one polarisation.
fn fit_fringes(
    real: &Image2D,
    imag: &Image2D,
    mask: &Mask2D,
    phases: &Array2<f64>,
    window_size: usize,
) -> (Image2D, Image2D) {
    let (width, height) = (real.width(), real.height());
    let half = window_size / 2;
    let mut out_real = Image2D::zeros(width, height);
    let mut out_imag = Image2D::zeros(width, height);

    for y in 0..height {
        // Derotate the usable samples, and keep prefix sums over time so that
        // each window is O(1).
        let mut prefix = Vec::with_capacity(width + 1);
        let mut counts = Vec::with_capacity(width + 1);
        prefix.push(Complex::<f64>::default());
        counts.push(0_usize);
        for x in 0..width {
            let v = Complex::new(f64::from(real.value(x, y)), f64::from(imag.value(x, y)));
            let usable = !mask.value(x, y) && v.re.is_finite() && v.im.is_finite();
            let derotated = if usable {
                v * Complex::from_polar(1.0, -phases[(y, x)])
            } else {
                Complex::default()
            };
            prefix.push(prefix[x] + derotated);
            counts.push(counts[x] + usize::from(usable));
        }
        let fallback = if counts[width] > 0 {
            prefix[width] / counts[width] as f64
        } else {
            Complex::default()
        };

        for x in 0..width {
            let lo = x.saturating_sub(half);
            let hi = (lo + window_size).min(width);
            let lo = hi.saturating_sub(window_size);
            let count = counts[hi] - counts[lo];
            let amplitude = if count > 0 {
                (prefix[hi] - prefix[lo]) / count as f64
            } else {
                fallback
            };
            let model = amplitude * Complex::from_polar(1.0, phases[(y, x)]);
            out_real.set_value(x, y, model.re as f32);
            out_imag.set_value(x, y, model.im as f32);
        }
    }
    (out_real, out_imag)
}

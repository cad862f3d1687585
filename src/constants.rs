// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

Geometry is done in double precision; visibility samples are single precision.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Speed of light \[metres/second\].
pub const VEL_C: f64 = 299_792_458.0;

/// The SumThreshold window lengths used when nothing else is specified.
pub const DEFAULT_SUM_THRESHOLD_LENGTHS: usize = 9;

/// The base SumThreshold threshold for a window of length 1, in units of the
/// estimated noise level.
pub const DEFAULT_BASE_THRESHOLD: f64 = 6.0;

/// Threshold factor per doubling of the window length for Gaussian and
/// Rayleigh noise.
pub const THRESHOLD_EXP_FACTOR: f64 = 1.5;

/// The fraction of samples clipped on each side when calculating winsorised
/// statistics.
pub const WINSORISE_FRACTION: f64 = 0.1;

/// Correction to turn the variance of 10%-winsorised Gaussian samples back
/// into the variance of the whole population.
pub const WINSORISED_STD_CORRECTION: f64 = 1.54;

/// The seed used for noise when searching for thresholds with a given false
/// alarm rate.
pub const FALSE_RATE_NOISE_SEED: u64 = 0x5eed;

/// The maximum number of probes used when searching for thresholds with a
/// given false alarm rate.
pub const FALSE_RATE_MAX_PROBES: usize = 64;

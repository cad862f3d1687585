// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust statistics used to estimate the noise level of a grid.

use crate::{
    constants::{WINSORISED_STD_CORRECTION, WINSORISE_FRACTION},
    data::{Image2D, Mask2D},
};

/// The finite, unflagged samples of an image.
pub fn unflagged_values(image: &Image2D, mask: &Mask2D) -> Vec<f32> {
    image
        .view()
        .iter()
        .zip(mask.view().iter())
        .filter(|(v, f)| !**f && v.is_finite())
        .map(|(&v, _)| v)
        .collect()
}

/// The plain mean and standard deviation. Returns `None` for no samples.
pub fn mean_and_std(values: &[f32]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    Some((mean, var.sqrt()))
}

/// The mean and standard deviation of the values after winsorising: the
/// lowest and highest 10% of the samples are replaced by the nearest retained
/// value. The variance is scaled so that Gaussian noise gives the standard
/// deviation of the full population. Returns `None` for no samples.
pub fn winsorised_mean_and_std(values: &[f32]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);

    let n = sorted.len();
    let low_index = (WINSORISE_FRACTION * n as f64).floor() as usize;
    let high_index = ((1.0 - WINSORISE_FRACTION) * n as f64).ceil() as usize;
    let high_index = high_index.saturating_sub(1).max(low_index);
    let (low, high) = (sorted[low_index], sorted[high_index]);

    let clipped = || sorted.iter().map(|&v| f64::from(v.clamp(low, high)));
    let mean = clipped().sum::<f64>() / n as f64;
    let var = clipped().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    Some((mean, (WINSORISED_STD_CORRECTION * var).sqrt()))
}

/// The mode of Rayleigh-distributed values, i.e. the σ parameter of the
/// distribution. Returns `None` for no samples.
pub fn rayleigh_mode(values: &[f32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum_sq = values.iter().map(|&v| f64::from(v).powi(2)).sum::<f64>();
    Some((sum_sq / (2.0 * values.len() as f64)).sqrt())
}

/// Returns `None` for no samples.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

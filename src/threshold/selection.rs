// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flagging of entire timesteps or channels whose RMS is an outlier.

use log::trace;
use ndarray::prelude::*;

use super::stats::winsorised_mean_and_std;
use crate::data::{Image2D, Mask2D};

const MAX_SELECTION_ROUNDS: usize = 10;

/// Flag every timestep whose RMS over unflagged samples deviates from the
/// typical timestep RMS by more than `threshold` standard deviations.
pub fn time_selection(image: &Image2D, mask: &mut Mask2D, threshold: f64) {
    let flagged = select_outliers(image, mask, Axis(1), threshold);
    for x in flagged {
        mask.view_mut().column_mut(x).fill(true);
    }
}

/// Flag every channel whose RMS over unflagged samples deviates from the
/// typical channel RMS by more than `threshold` standard deviations.
pub fn frequency_selection(image: &Image2D, mask: &mut Mask2D, threshold: f64) {
    let flagged = select_outliers(image, mask, Axis(0), threshold);
    for y in flagged {
        mask.view_mut().row_mut(y).fill(true);
    }
}

/// The indices of the lines along `axis` that are outliers. Lines are removed
/// from the statistics as they are found, and the search is repeated until no
/// new outliers are found.
fn select_outliers(image: &Image2D, mask: &Mask2D, axis: Axis, threshold: f64) -> Vec<usize> {
    let values = image.view();
    let flags = mask.view();
    let rms: Vec<Option<f32>> = values
        .axis_iter(axis)
        .zip(flags.axis_iter(axis))
        .map(|(values, flags)| {
            let (sum_sq, count) = values
                .iter()
                .zip(flags.iter())
                .filter(|(v, f)| !**f && v.is_finite())
                .fold((0.0_f64, 0_usize), |(s, c), (&v, _)| {
                    (s + f64::from(v).powi(2), c + 1)
                });
            (count > 0).then(|| (sum_sq / count as f64).sqrt() as f32)
        })
        .collect();

    let mut selected = vec![false; rms.len()];
    for round in 0..MAX_SELECTION_ROUNDS {
        let remaining: Vec<f32> = rms
            .iter()
            .zip(&selected)
            .filter_map(|(r, &s)| if s { None } else { *r })
            .collect();
        let Some((mean, std)) = winsorised_mean_and_std(&remaining) else {
            break;
        };

        let mut new_outliers = 0;
        for (r, s) in rms.iter().zip(selected.iter_mut()) {
            if let (Some(r), false) = (r, *s) {
                if (f64::from(*r) - mean).abs() > threshold * std {
                    *s = true;
                    new_outliers += 1;
                }
            }
        }
        trace!("Selection round {round}: {new_outliers} new outliers");
        if new_outliers == 0 {
            break;
        }
    }

    selected
        .into_iter()
        .enumerate()
        .filter_map(|(i, s)| s.then_some(i))
        .collect()
}

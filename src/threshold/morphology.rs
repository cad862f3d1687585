// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Morphological operations on masks.

use ndarray::prelude::*;

use crate::data::Mask2D;

/// Flag every sample within `time_size` timesteps or `frequency_size`
/// channels of a flagged sample. Neighbourhoods are clipped at the edges of
/// the mask.
pub fn dilate(mask: &mut Mask2D, time_size: usize, frequency_size: usize) {
    if time_size > 0 {
        for line in mask.view_mut().axis_iter_mut(Axis(0)) {
            dilate_line(line, time_size);
        }
    }
    if frequency_size > 0 {
        for line in mask.view_mut().axis_iter_mut(Axis(1)) {
            dilate_line(line, frequency_size);
        }
    }
}

fn dilate_line(mut line: ArrayViewMut1<bool>, size: usize) {
    let n = line.len();
    // Flagged samples seen before each index.
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0_usize);
    for &f in line.iter() {
        prefix.push(prefix[prefix.len() - 1] + usize::from(f));
    }
    for (i, f) in line.iter_mut().enumerate() {
        let lo = i.saturating_sub(size);
        let hi = (i + size + 1).min(n);
        *f = prefix[hi] > prefix[lo];
    }
}

/// The scale-invariant rank operator along time and frequency. Along each
/// line a sample is flagged if it lies inside an interval in which the
/// fraction of flagged samples is at least `1 - eta`. Both directions operate
/// on the flags as they were before this call, and the results are combined.
pub fn scale_invariant_rank(mask: &mut Mask2D, eta_time: f64, eta_frequency: f64) {
    let before = mask.clone();
    let mut along_time = before.clone();
    for line in along_time.view_mut().axis_iter_mut(Axis(0)) {
        sir_line(line, eta_time);
    }
    let mut along_frequency = before;
    for line in along_frequency.view_mut().axis_iter_mut(Axis(1)) {
        sir_line(line, eta_frequency);
    }
    mask.view_mut()
        .zip_mut_with(&along_time.view(), |m, &t| *m |= t);
    mask.view_mut()
        .zip_mut_with(&along_frequency.view(), |m, &f| *m |= f);
}

/// With `w = eta` for a flagged sample and `w = eta - 1` otherwise, sample `i`
/// is flagged if some interval containing it has a non-negative sum of `w`.
/// With prefix sums `W`, that is `max(W[j], j > i) - min(W[k], k <= i) >= 0`.
fn sir_line(mut line: ArrayViewMut1<bool>, eta: f64) {
    let n = line.len();
    if n == 0 {
        return;
    }
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &f in line.iter() {
        let w = if f { eta } else { eta - 1.0 };
        prefix.push(prefix[prefix.len() - 1] + w);
    }

    let mut prefix_min = Vec::with_capacity(n);
    let mut running_min = f64::INFINITY;
    for &p in &prefix[..n] {
        running_min = running_min.min(p);
        prefix_min.push(running_min);
    }
    let mut suffix_max = vec![f64::NEG_INFINITY; n];
    let mut running_max = f64::NEG_INFINITY;
    for i in (0..n).rev() {
        running_max = running_max.max(prefix[i + 1]);
        suffix_max[i] = running_max;
    }

    for (i, f) in line.iter_mut().enumerate() {
        *f = *f || suffix_max[i] - prefix_min[i] >= 0.0;
    }
}

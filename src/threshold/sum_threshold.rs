// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The SumThreshold algorithm.
//!
//! A window of `length` consecutive samples slides along an axis. If the mean
//! of the unflagged samples in the window exceeds the threshold, every sample
//! in the window is flagged. Windows read the flags as they were before the
//! pass and write into a scratch mask, so the result of a pass doesn't depend
//! on the order in which windows are visited. A window longer than the axis is
//! shortened to the whole axis. Non-finite samples are ignored like flagged
//! samples. Window sums are accumulated in double precision, so no finite
//! single-precision input can overflow them.
//!
//! There are two implementations. The reference implementation walks one row
//! (or column) at a time with a running sum. The vectorized implementation
//! processes [`LANES`] rows (or columns) at once with branchless lane
//! arithmetic, and spreads chunks of lanes over the rayon thread pool. Both
//! produce identical masks.

use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::data::{GridError, Image2D, Mask2D};

/// The number of rows or columns processed together by the vectorized
/// implementation.
pub const LANES: usize = 8;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SumThresholdAlgorithm {
    Reference,
    #[default]
    Vectorized,
}

/// Horizontal windows run along time for a single channel; vertical windows
/// run along frequency for a single timestep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// What is accumulated inside a window and how it is compared with the
/// threshold.
pub(crate) trait WindowStatistic {
    /// The contribution of a finite sample to the window sum.
    fn sample(value: f32) -> f64;

    fn exceeds(sum: f64, count: f64, threshold: f32) -> bool;
}

/// The mean of the window exceeds the threshold.
pub(crate) struct WindowMean;

impl WindowStatistic for WindowMean {
    #[inline(always)]
    fn sample(value: f32) -> f64 {
        f64::from(value)
    }

    #[inline(always)]
    fn exceeds(sum: f64, count: f64, threshold: f32) -> bool {
        (sum / count).abs() > f64::from(threshold)
    }
}

/// Run one SumThreshold pass with the given algorithm.
pub fn sum_threshold(
    algorithm: SumThresholdAlgorithm,
    direction: Direction,
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    window_threshold::<WindowMean>(algorithm, direction, image, mask, length, threshold)
}

pub fn horizontal_sum_threshold_reference(
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    sum_threshold(
        SumThresholdAlgorithm::Reference,
        Direction::Horizontal,
        image,
        mask,
        length,
        threshold,
    )
}

pub fn vertical_sum_threshold_reference(
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    sum_threshold(
        SumThresholdAlgorithm::Reference,
        Direction::Vertical,
        image,
        mask,
        length,
        threshold,
    )
}

pub fn horizontal_sum_threshold_vectorized(
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    sum_threshold(
        SumThresholdAlgorithm::Vectorized,
        Direction::Horizontal,
        image,
        mask,
        length,
        threshold,
    )
}

pub fn vertical_sum_threshold_vectorized(
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    sum_threshold(
        SumThresholdAlgorithm::Vectorized,
        Direction::Vertical,
        image,
        mask,
        length,
        threshold,
    )
}

pub(crate) fn window_threshold<S: WindowStatistic>(
    algorithm: SumThresholdAlgorithm,
    direction: Direction,
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    mask.check_same_shape(image.width(), image.height())?;
    if image.is_empty() {
        return Ok(());
    }

    // Both implementations see every axis as the first dimension of a view;
    // horizontal passes operate on the transpose.
    let values = image.view();
    let (values, axis_len) = match direction {
        Direction::Horizontal => (values.reversed_axes(), image.width()),
        Direction::Vertical => (values, image.height()),
    };
    let length = length.clamp(1, axis_len);

    let flags = mask.view_mut();
    let flags = match direction {
        Direction::Horizontal => flags.reversed_axes(),
        Direction::Vertical => flags,
    };

    match algorithm {
        SumThresholdAlgorithm::Reference => reference::<S>(values, flags, length, threshold),
        SumThresholdAlgorithm::Vectorized => vectorized::<S>(values, flags, length, threshold),
    }
    Ok(())
}

/// `values` and `flags` have shape (axis length, lines). Every line is
/// processed independently.
fn reference<S: WindowStatistic>(
    values: ArrayView2<f32>,
    mut flags: ArrayViewMut2<bool>,
    length: usize,
    threshold: f32,
) {
    let before = flags.to_owned();
    for ((values, before), mut flags) in values
        .axis_iter(Axis(1))
        .zip(before.axis_iter(Axis(1)))
        .zip(flags.axis_iter_mut(Axis(1)))
    {
        let axis_len = values.len();
        let mut sum = 0.0_f64;
        let mut count = 0_usize;
        // Everything up to and including this index has been flagged already
        // in this line.
        let mut flagged_until = None;

        let contribution = |pos: usize| {
            let value = values[pos];
            (!before[pos] && value.is_finite()).then(|| S::sample(value))
        };

        for pos in 0..length - 1 {
            if let Some(sample) = contribution(pos) {
                sum += sample;
                count += 1;
            }
        }
        for start in 0..=axis_len - length {
            let end = start + length - 1;
            if let Some(sample) = contribution(end) {
                sum += sample;
                count += 1;
            }
            if count > 0 && S::exceeds(sum, count as f64, threshold) {
                let first = flagged_until.map_or(start, |f: usize| (f + 1).max(start));
                flags.slice_mut(s![first..=end]).fill(true);
                flagged_until = Some(end);
            }
            if let Some(sample) = contribution(start) {
                sum -= sample;
                count -= 1;
            }
        }
    }
}

/// `values` and `flags` have shape (axis length, lines). Lines are processed
/// [`LANES`] at a time; each chunk writes into its own scratch flags, which are
/// ORed into `flags` afterwards.
fn vectorized<S: WindowStatistic>(
    values: ArrayView2<f32>,
    mut flags: ArrayViewMut2<bool>,
    length: usize,
    threshold: f32,
) {
    let num_lines = values.len_of(Axis(1));
    let num_chunks = num_lines.div_ceil(LANES);
    let before = flags.view();

    let chunk_flags: Vec<Array2<bool>> = (0..num_chunks)
        .into_par_iter()
        .map(|i_chunk| {
            let lines = i_chunk * LANES..((i_chunk + 1) * LANES).min(num_lines);
            let values = values.slice(s![.., lines.clone()]);
            let before = before.slice(s![.., lines]);
            if length == 1 {
                single_sample_lanes::<S>(values, before, threshold)
            } else {
                window_lanes::<S>(values, before, length, threshold)
            }
        })
        .collect();

    for (i_chunk, chunk) in chunk_flags.into_iter().enumerate() {
        let lines = i_chunk * LANES..((i_chunk + 1) * LANES).min(num_lines);
        flags
            .slice_mut(s![.., lines])
            .zip_mut_with(&chunk, |f, &c| *f |= c);
    }
}

/// A window of a single sample needs no running sum.
fn single_sample_lanes<S: WindowStatistic>(
    values: ArrayView2<f32>,
    before: ArrayView2<bool>,
    threshold: f32,
) -> Array2<bool> {
    ndarray::Zip::from(&values)
        .and(&before)
        .map_collect(|&v, &f| f || (v.is_finite() && S::exceeds(S::sample(v), 1.0, threshold)))
}

fn window_lanes<S: WindowStatistic>(
    values: ArrayView2<f32>,
    before: ArrayView2<bool>,
    length: usize,
    threshold: f32,
) -> Array2<bool> {
    let (axis_len, lanes) = values.dim();
    let mut out = before.to_owned();
    let mut sum = [0.0_f64; LANES];
    let mut count = [0_u32; LANES];
    let mut flagged_until = [None::<usize>; LANES];

    // Branchless: ignored samples contribute zero.
    let contributions = |pos: usize| {
        let mut samples = [0.0_f64; LANES];
        let mut used = [false; LANES];
        for lane in 0..lanes {
            let value = values[(pos, lane)];
            used[lane] = !before[(pos, lane)] & value.is_finite();
            samples[lane] = if used[lane] { S::sample(value) } else { 0.0 };
        }
        (samples, used)
    };
    let accumulate = |pos: usize, sum: &mut [f64; LANES], count: &mut [u32; LANES]| {
        let (samples, used) = contributions(pos);
        for lane in 0..LANES {
            sum[lane] += samples[lane];
            count[lane] += u32::from(used[lane]);
        }
    };

    for pos in 0..length - 1 {
        accumulate(pos, &mut sum, &mut count);
    }
    for start in 0..=axis_len - length {
        let end = start + length - 1;
        accumulate(end, &mut sum, &mut count);

        for lane in 0..lanes {
            if count[lane] > 0 && S::exceeds(sum[lane], f64::from(count[lane]), threshold) {
                let first = flagged_until[lane].map_or(start, |f| (f + 1).max(start));
                out.slice_mut(s![first..=end, lane]).fill(true);
                flagged_until[lane] = Some(end);
            }
        }

        let (samples, used) = contributions(start);
        for lane in 0..LANES {
            sum[lane] -= samples[lane];
            count[lane] -= u32::from(used[lane]);
        }
    }
    out
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The VarThreshold algorithm: SumThreshold windowing, but a window is flagged
//! when its local variance about zero (the mean of the squared unflagged
//! samples) exceeds the square of the threshold.

use super::sum_threshold::{window_threshold, Direction, SumThresholdAlgorithm, WindowStatistic};
use crate::data::{GridError, Image2D, Mask2D};

struct WindowVariance;

impl WindowStatistic for WindowVariance {
    #[inline(always)]
    fn sample(value: f32) -> f64 {
        let value = f64::from(value);
        value * value
    }

    #[inline(always)]
    fn exceeds(sum: f64, count: f64, threshold: f32) -> bool {
        let threshold = f64::from(threshold);
        sum / count > threshold * threshold
    }
}

/// Run one VarThreshold pass with the given algorithm.
pub fn var_threshold(
    algorithm: SumThresholdAlgorithm,
    direction: Direction,
    image: &Image2D,
    mask: &mut Mask2D,
    length: usize,
    threshold: f32,
) -> Result<(), GridError> {
    window_threshold::<WindowVariance>(algorithm, direction, image, mask, length, threshold)
}

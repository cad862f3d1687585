// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with thresholding.

use thiserror::Error;

use crate::data::GridError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Unknown noise distribution '{0}'; supported distributions are 'gaussian', 'rayleigh' and 'uniform'")]
    UnknownDistribution(String),

    #[error("Can't use {0} SumThreshold window lengths; the longest would be 2^{}", .0 - 1)]
    TooManyLengths(usize),

    #[error("The target false-alarm rate must be between 0 and 1 (exclusive), but got {0}")]
    InvalidFalseRate(f64),

    #[error("The resolution used to search for thresholds must be at least 1")]
    InvalidResolution,

    #[error("The base threshold must be positive and finite, but got {0}")]
    InvalidBaseThreshold(f64),

    #[error(transparent)]
    Grid(#[from] GridError),
}

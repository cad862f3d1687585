// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flagging by thresholding.
//!
//! [`ThresholdConfig`] holds a schedule of window lengths and thresholds and
//! applies it with the SumThreshold (or VarThreshold) algorithm. The other
//! modules hold the statistics used to find the noise level and the
//! operations that post-process masks.

mod config;
mod error;
pub mod morphology;
pub mod selection;
pub mod stats;
pub mod sum_threshold;
pub mod var_threshold;
#[cfg(test)]
mod tests;

pub use config::{
    FalseRateSearch, NoiseDistribution, ThresholdConfig, ThresholdMethod, ThresholdOperation,
};
pub use error::ThresholdError;
pub use sum_threshold::{Direction, SumThresholdAlgorithm};

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Schedules of SumThreshold window lengths and thresholds.

use std::str::FromStr;

use log::{debug, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use strum_macros::{Display, EnumIter};

use super::{
    sum_threshold::{sum_threshold, Direction, SumThresholdAlgorithm},
    var_threshold::var_threshold,
    ThresholdError,
};
use crate::{
    constants::{
        DEFAULT_SUM_THRESHOLD_LENGTHS, FALSE_RATE_MAX_PROBES, FALSE_RATE_NOISE_SEED,
        THRESHOLD_EXP_FACTOR,
    },
    data::{Image2D, Mask2D},
    simulate::noise_image,
};

/// The assumed distribution of the noise being thresholded.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoiseDistribution {
    #[default]
    Gaussian,
    Rayleigh,
    Uniform,
}

impl FromStr for NoiseDistribution {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gaussian" | "normal" => Ok(NoiseDistribution::Gaussian),
            "rayleigh" => Ok(NoiseDistribution::Rayleigh),
            "uniform" => Ok(NoiseDistribution::Uniform),
            _ => Err(ThresholdError::UnknownDistribution(s.to_string())),
        }
    }
}

impl NoiseDistribution {
    /// The probability that the statistic of a window of `length` samples of
    /// unit noise exceeds `threshold`. Gaussian noise has σ = 1, Rayleigh
    /// noise has mode 1 and uniform noise is spread over [-√3, √3] (σ = 1).
    /// Windows of Rayleigh and uniform noise longer than one sample use the
    /// central limit theorem.
    pub fn expected_false_rate(self, length: usize, threshold: f64) -> f64 {
        let n = length.max(1) as f64;
        match self {
            NoiseDistribution::Gaussian => erfc(threshold * n.sqrt() / std::f64::consts::SQRT_2),

            NoiseDistribution::Uniform if length <= 1 => (1.0 - threshold / 3_f64.sqrt()).max(0.0),
            NoiseDistribution::Uniform => erfc(threshold * n.sqrt() / std::f64::consts::SQRT_2),

            NoiseDistribution::Rayleigh if length <= 1 => (-threshold * threshold / 2.0).exp(),
            NoiseDistribution::Rayleigh => {
                let mean = (std::f64::consts::PI / 2.0).sqrt();
                let var = (4.0 - std::f64::consts::PI) / 2.0;
                0.5 * erfc((threshold - mean) * n.sqrt() / (2.0 * var).sqrt())
            }
        }
    }
}

/// The statistic tested inside each window.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdMethod {
    #[default]
    SumThreshold,
    VarThreshold,
}

/// A single pass of the algorithm along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOperation {
    pub length: usize,
    pub threshold: f64,
    /// The probability that a window of unit noise is flagged by this
    /// operation.
    pub expected_false_rate: f64,
}

/// The result of [`ThresholdConfig::initialize_thresholds_with_false_rate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FalseRateSearch {
    pub base_threshold: f64,
    pub achieved_rate: f64,
    pub probes: usize,
}

/// An ordered schedule of window lengths and thresholds for each axis.
///
/// Lengths are set first with one of the `initialize_lengths` methods, then
/// thresholds for those lengths with one of the `initialize_thresholds`
/// methods.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    horizontal: Vec<ThresholdOperation>,
    vertical: Vec<ThresholdOperation>,
    method: ThresholdMethod,
    algorithm: SumThresholdAlgorithm,
    distribution: NoiseDistribution,
}

fn operations_from_lengths(lengths: impl Iterator<Item = usize>) -> Vec<ThresholdOperation> {
    lengths
        .map(|length| ThresholdOperation {
            length,
            threshold: 0.0,
            expected_false_rate: 0.0,
        })
        .collect()
}

impl ThresholdConfig {
    pub fn new(method: ThresholdMethod, algorithm: SumThresholdAlgorithm) -> ThresholdConfig {
        ThresholdConfig {
            method,
            algorithm,
            ..Default::default()
        }
    }

    pub fn method(&self) -> ThresholdMethod {
        self.method
    }

    pub fn algorithm(&self) -> SumThresholdAlgorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: SumThresholdAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn distribution(&self) -> NoiseDistribution {
        self.distribution
    }

    /// Lengths 1, 2, 4, ..., 256 on both axes.
    pub fn initialize_lengths_default(&mut self) {
        self.set_power_of_two_lengths(DEFAULT_SUM_THRESHOLD_LENGTHS as u32);
    }

    /// The first `count` powers of two (starting at 1) on both axes. Every
    /// length must fit in a `usize`.
    pub fn initialize_lengths(&mut self, count: usize) -> Result<(), ThresholdError> {
        match u32::try_from(count) {
            Ok(count) if count <= usize::BITS => {
                self.set_power_of_two_lengths(count);
                Ok(())
            }
            _ => Err(ThresholdError::TooManyLengths(count)),
        }
    }

    fn set_power_of_two_lengths(&mut self, count: u32) {
        self.horizontal = operations_from_lengths((0..count).map(|i| 1 << i));
        self.vertical = self.horizontal.clone();
    }

    /// A single length on both axes.
    pub fn initialize_lengths_single(&mut self, length: usize) {
        self.horizontal = operations_from_lengths(std::iter::once(length));
        self.vertical = self.horizontal.clone();
    }

    /// Disable thresholding along time.
    pub fn remove_horizontal_operations(&mut self) {
        self.horizontal.clear();
    }

    /// Disable thresholding along frequency.
    pub fn remove_vertical_operations(&mut self) {
        self.vertical.clear();
    }

    pub fn horizontal_operation_count(&self) -> usize {
        self.horizontal.len()
    }

    pub fn vertical_operation_count(&self) -> usize {
        self.vertical.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is not less than the horizontal operation count.
    pub fn horizontal_operation(&self, index: usize) -> &ThresholdOperation {
        &self.horizontal[index]
    }

    /// # Panics
    ///
    /// Panics if `index` is not less than the vertical operation count.
    pub fn vertical_operation(&self, index: usize) -> &ThresholdOperation {
        &self.vertical[index]
    }

    /// Set the thresholds of every configured length from the threshold of a
    /// window of a single sample. Longer windows get lower thresholds:
    /// `base / L` for uniform noise and `base × 1.5^log2(L) / L` otherwise.
    pub fn initialize_thresholds_from_first_threshold(
        &mut self,
        base: f64,
        distribution: NoiseDistribution,
    ) -> Result<(), ThresholdError> {
        if !(base.is_finite() && base > 0.0) {
            return Err(ThresholdError::InvalidBaseThreshold(base));
        }
        self.distribution = distribution;
        for op in self.horizontal.iter_mut().chain(self.vertical.iter_mut()) {
            let length = op.length.max(1) as f64;
            op.threshold = match distribution {
                NoiseDistribution::Uniform => base / length,
                NoiseDistribution::Gaussian | NoiseDistribution::Rayleigh => {
                    base * THRESHOLD_EXP_FACTOR.powf(length.log2()) / length
                }
            };
            op.expected_false_rate = distribution.expected_false_rate(op.length, op.threshold);
            trace!(
                "Length {:>3}: threshold {:.5} (expected false rate {:.3e})",
                op.length,
                op.threshold,
                op.expected_false_rate
            );
        }
        Ok(())
    }

    /// Find the base threshold for which the full schedule flags
    /// `target_rate` of a `resolution` × `resolution` image of seeded unit
    /// noise, and set the thresholds from it. The flagged fraction never
    /// increases with the base threshold, so the base is found by bisection
    /// on [0, 100].
    pub fn initialize_thresholds_with_false_rate(
        &mut self,
        resolution: usize,
        target_rate: f64,
        distribution: NoiseDistribution,
    ) -> Result<FalseRateSearch, ThresholdError> {
        if resolution == 0 {
            return Err(ThresholdError::InvalidResolution);
        }
        if !(target_rate > 0.0 && target_rate < 1.0) {
            return Err(ThresholdError::InvalidFalseRate(target_rate));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(FALSE_RATE_NOISE_SEED);
        let noise = noise_image(resolution, resolution, distribution, 1.0, &mut rng);

        let mut probe = |base: f64| -> Result<f64, ThresholdError> {
            self.initialize_thresholds_from_first_threshold(base, distribution)?;
            let mut mask = Mask2D::unflagged(resolution, resolution);
            self.execute(&noise, &mut mask, false, 1.0)?;
            Ok(mask.flagged_fraction())
        };

        let (mut low, mut high) = (0.0, 100.0);
        let mut search = FalseRateSearch {
            base_threshold: 0.5 * (low + high),
            achieved_rate: 1.0,
            probes: 0,
        };
        while search.probes < FALSE_RATE_MAX_PROBES {
            let mid = 0.5 * (low + high);
            let rate = probe(mid)?;
            search = FalseRateSearch {
                base_threshold: mid,
                achieved_rate: rate,
                probes: search.probes + 1,
            };
            trace!("False-rate probe {}: base {mid:.6} flags {rate:.6}", search.probes);

            if (rate - target_rate).abs() <= 0.01 * target_rate || high - low < 1e-4 {
                break;
            }
            if rate > target_rate {
                low = mid;
            } else {
                high = mid;
            }
        }

        self.initialize_thresholds_from_first_threshold(search.base_threshold, distribution)?;
        debug!(
            "Base threshold {:.5} gives a false rate of {:.5} (target {target_rate}) after {} probes",
            search.base_threshold, search.achieved_rate, search.probes
        );
        Ok(search)
    }

    /// Apply every operation to `image`, flagging into `mask`. Operations are
    /// applied in order of increasing length, alternating between the
    /// horizontal and vertical schedules. Every threshold is multiplied by
    /// `sensitivity`. If `additive` is false, the mask is cleared first.
    pub fn execute(
        &self,
        image: &Image2D,
        mask: &mut Mask2D,
        additive: bool,
        sensitivity: f64,
    ) -> Result<(), ThresholdError> {
        mask.check_same_shape(image.width(), image.height())?;
        if !additive {
            mask.clear();
        }

        let pass = match self.method {
            ThresholdMethod::SumThreshold => sum_threshold,
            ThresholdMethod::VarThreshold => var_threshold,
        };
        let count = self.horizontal.len().max(self.vertical.len());
        for i in 0..count {
            if let Some(op) = self.horizontal.get(i) {
                let threshold = (op.threshold * sensitivity) as f32;
                pass(
                    self.algorithm,
                    Direction::Horizontal,
                    image,
                    mask,
                    op.length,
                    threshold,
                )?;
            }
            if let Some(op) = self.vertical.get(i) {
                let threshold = (op.threshold * sensitivity) as f32;
                pass(
                    self.algorithm,
                    Direction::Vertical,
                    image,
                    mask,
                    op.length,
                    threshold,
                )?;
            }
        }
        Ok(())
    }
}

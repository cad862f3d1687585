// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The steps that a strategy is built from.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants, EnumIter};

use crate::{
    constants::DEFAULT_BASE_THRESHOLD,
    surface_fit::{FringeStopParams, LocalFitParams},
    threshold::{NoiseDistribution, SumThresholdAlgorithm, ThresholdMethod},
};

/// A node of a strategy tree. Blocks own child actions and decide how the
/// children see the data; leaves flag or transform the data.
///
/// Every variant has an [`ActionType`] that identifies it in logs and
/// progress reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(ActionType))]
#[strum_discriminants(derive(Display, EnumIter, Hash))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Run the children in order.
    Block {
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run the children once for each polarisation, on data containing only
    /// that polarisation.
    ForEachPolarisation {
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run the children on each selected component of complex data. The flags
    /// found for every component are combined.
    ForEachComplexComponent {
        #[serde(default)]
        on_amplitude: bool,
        #[serde(default)]
        on_phase: bool,
        #[serde(default)]
        on_real: bool,
        #[serde(default)]
        on_imaginary: bool,
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run the children `iterations` times. The thresholds of the first pass
    /// are `sensitivity_start` times higher than those of the parent, and the
    /// factor shrinks geometrically towards 1 with every pass.
    Iteration {
        iterations: usize,
        sensitivity_start: f64,
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run each child on its own copy of the data and flag everything that
    /// any child flagged.
    CombineFlagResults {
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run the children on averaged data, then bring the results back to the
    /// full resolution.
    ChangeResolution {
        time_decrease_factor: usize,
        frequency_decrease_factor: usize,
        /// Upsample the background found by the children.
        #[serde(default)]
        restore_revised: bool,
        /// Subtract the upsampled background from the full-resolution data.
        #[serde(default)]
        restore_contaminated: bool,
        /// Flag everything the children flagged.
        #[serde(default)]
        restore_masks: bool,
        #[serde(default)]
        children: Vec<Action>,
    },

    /// Run the children on every baseline of a [`BaselineSource`], and write
    /// the resulting flags back to the source.
    ///
    /// Errors caused by a violated precondition stop all processing. Other
    /// errors are reported, the remaining baselines are still processed, and
    /// then a [`StrategyError::BaselineFailures`] listing the failed baselines
    /// is returned.
    ///
    /// [`BaselineSource`]: super::BaselineSource
    /// [`StrategyError::BaselineFailures`]: super::StrategyError::BaselineFailures
    ForEachBaseline {
        /// The number of worker threads. Zero means one per CPU.
        #[serde(default)]
        threads: usize,
        #[serde(default)]
        children: Vec<Action>,
    },

    SumThreshold(SumThresholdParams),

    SetFlagging { mode: SetFlaggingMode },

    SetImage { operation: SetImageOperation },

    /// Fit a smooth background with a sliding window and subtract it.
    SlidingWindowFit(LocalFitParams),

    /// Remove the strongest components of complex data by singular value
    /// decomposition.
    SvdMitigation { singular_value_count: usize },

    /// Fit the fringes of a source at the phase centre and subtract them.
    FringeStopping(FringeStopParams),

    /// Widen flagged areas by up to `time_size` timesteps and
    /// `frequency_size` channels on either side.
    Dilate {
        time_size: usize,
        frequency_size: usize,
    },

    ScaleInvariantRank { eta_time: f64, eta_frequency: f64 },

    /// Flag timesteps whose RMS is an outlier.
    TimeSelection { threshold: f64 },

    /// Flag channels whose RMS is an outlier.
    FrequencySelection { threshold: f64 },
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        ActionType::from(self)
    }

    /// The child actions of a block, or an empty slice for leaves.
    pub fn children(&self) -> &[Action] {
        match self {
            Action::Block { children }
            | Action::ForEachPolarisation { children }
            | Action::ForEachComplexComponent { children, .. }
            | Action::Iteration { children, .. }
            | Action::CombineFlagResults { children }
            | Action::ChangeResolution { children, .. }
            | Action::ForEachBaseline { children, .. } => children,
            _ => &[],
        }
    }

    /// The number of actions in this tree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(Action::count).sum::<usize>()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SumThresholdParams {
    /// The threshold of a single sample, in units of the estimated noise
    /// level.
    pub base_threshold: f64,
    /// Multiplies every threshold, on top of the sensitivity of enclosing
    /// [`Action::Iteration`]s.
    pub base_sensitivity: f64,
    pub distribution: NoiseDistribution,
    pub method: ThresholdMethod,
    pub algorithm: SumThresholdAlgorithm,
    /// The number of window lengths (1, 2, 4, ...).
    pub lengths: usize,
    /// Slide windows along time.
    pub time_direction: bool,
    /// Slide windows along frequency.
    pub frequency_direction: bool,
}

impl Default for SumThresholdParams {
    fn default() -> Self {
        SumThresholdParams {
            base_threshold: DEFAULT_BASE_THRESHOLD,
            base_sensitivity: 1.0,
            distribution: NoiseDistribution::Gaussian,
            method: ThresholdMethod::SumThreshold,
            algorithm: SumThresholdAlgorithm::Vectorized,
            lengths: crate::constants::DEFAULT_SUM_THRESHOLD_LENGTHS,
            time_direction: true,
            frequency_direction: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SetFlaggingMode {
    /// Unflag everything.
    Clear,
    /// Flag everything.
    Everything,
    /// Replace the flags with those of the original data.
    FromOriginal,
    /// Also flag everything that is flagged in the original data.
    OrOriginal,
    Invert,
    /// Flag a sample in every polarisation if it is flagged in any.
    PolarisationsEqual,
    /// Flag samples whose images are all exactly zero.
    FlagZeros,
    /// Flag samples with a NaN or infinite value in any image.
    FlagNonFinite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SetImageOperation {
    /// Reset the contaminated images to the original images.
    FromOriginal,
    /// Set the contaminated images to the background.
    FromRevised,
    /// Zero the background.
    ZeroRevised,
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    Action, ArtifactSet, ProgressListener, SetFlaggingMode, SetImageOperation, StrategyError,
    SumThresholdParams,
};
use crate::surface_fit::LocalFitParams;

/// A named tree of actions, as stored in strategy files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub root: Action,
}

impl Strategy {
    pub fn run(
        &self,
        artifacts: &mut ArtifactSet,
        listener: &dyn ProgressListener,
    ) -> Result<(), StrategyError> {
        debug!(
            "Running strategy '{}' ({} actions)",
            self.name,
            self.root.count()
        );
        self.root.perform(artifacts, listener)
    }
}

/// Fit and subtract a background, then threshold what's left.
fn fit_and_threshold() -> [Action; 3] {
    [
        Action::SetImage {
            operation: SetImageOperation::FromOriginal,
        },
        Action::SlidingWindowFit(LocalFitParams::default()),
        Action::SumThreshold(SumThresholdParams::default()),
    ]
}

/// The strategy used when none is given. Each polarisation's amplitudes are
/// flagged twice, first at reduced sensitivity, with a smooth background
/// removed before thresholding; the flags of all polarisations are then
/// combined and widened.
pub fn default_strategy() -> Strategy {
    let mut iteration = fit_and_threshold().to_vec();
    iteration.push(Action::CombineFlagResults {
        children: vec![
            Action::FrequencySelection { threshold: 3.0 },
            Action::TimeSelection { threshold: 3.5 },
        ],
    });

    let mut amplitude = vec![Action::Iteration {
        iterations: 2,
        sensitivity_start: 4.0,
        children: iteration,
    }];
    amplitude.extend(fit_and_threshold());

    Strategy {
        name: "default".to_string(),
        root: Action::Block {
            children: vec![
                Action::SetFlagging {
                    mode: SetFlaggingMode::FlagNonFinite,
                },
                Action::ForEachPolarisation {
                    children: vec![Action::ForEachComplexComponent {
                        on_amplitude: true,
                        on_phase: false,
                        on_real: false,
                        on_imaginary: false,
                        children: amplitude,
                    }],
                },
                Action::SetFlagging {
                    mode: SetFlaggingMode::PolarisationsEqual,
                },
                Action::ScaleInvariantRank {
                    eta_time: 0.2,
                    eta_frequency: 0.2,
                },
                Action::SetFlagging {
                    mode: SetFlaggingMode::OrOriginal,
                },
            ],
        },
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::debug;

use super::{
    blocks::{self, ResolutionChange},
    leaves, Action, ArtifactSet, ProgressListener, StrategyError,
};

impl Action {
    /// Apply this action (and its children, depth first) to `artifacts`.
    ///
    /// If an error occurs, the artifacts keep every change made before it.
    pub fn perform(
        &self,
        artifacts: &mut ArtifactSet,
        listener: &dyn ProgressListener,
    ) -> Result<(), StrategyError> {
        debug!("{}", self.action_type());
        match self {
            Action::Block { children } => blocks::run_children(children, artifacts, listener),

            Action::ForEachPolarisation { children } => {
                blocks::for_each_polarisation(children, artifacts, listener)
            }

            Action::ForEachComplexComponent {
                on_amplitude,
                on_phase,
                on_real,
                on_imaginary,
                children,
            } => blocks::for_each_complex_component(
                [*on_amplitude, *on_phase, *on_real, *on_imaginary],
                children,
                artifacts,
                listener,
            ),

            Action::Iteration {
                iterations,
                sensitivity_start,
                children,
            } => blocks::iteration(
                *iterations,
                *sensitivity_start,
                children,
                artifacts,
                listener,
            ),

            Action::CombineFlagResults { children } => {
                blocks::combine_flag_results(children, artifacts, listener)
            }

            Action::ChangeResolution {
                time_decrease_factor,
                frequency_decrease_factor,
                restore_revised,
                restore_contaminated,
                restore_masks,
                children,
            } => blocks::change_resolution(
                ResolutionChange {
                    time_factor: *time_decrease_factor,
                    frequency_factor: *frequency_decrease_factor,
                    restore_revised: *restore_revised,
                    restore_contaminated: *restore_contaminated,
                    restore_masks: *restore_masks,
                },
                children,
                artifacts,
                listener,
            ),

            Action::ForEachBaseline { threads, children } => {
                blocks::for_each_baseline(*threads, children, artifacts, listener)
            }

            Action::SumThreshold(params) => leaves::sum_threshold(params, artifacts),
            Action::SetFlagging { mode } => leaves::set_flagging(*mode, artifacts),
            Action::SetImage { operation } => leaves::set_image(*operation, artifacts),
            Action::SlidingWindowFit(params) => leaves::sliding_window_fit(params, artifacts),
            Action::SvdMitigation {
                singular_value_count,
            } => leaves::svd_mitigation(*singular_value_count, artifacts),
            Action::FringeStopping(params) => leaves::fringe_stopping(params, artifacts),

            Action::Dilate {
                time_size,
                frequency_size,
            } => {
                leaves::dilate_masks(*time_size, *frequency_size, artifacts);
                Ok(())
            }
            Action::ScaleInvariantRank {
                eta_time,
                eta_frequency,
            } => {
                leaves::scale_invariant_rank_masks(*eta_time, *eta_frequency, artifacts);
                Ok(())
            }
            Action::TimeSelection { threshold } => leaves::selection(*threshold, true, artifacts),
            Action::FrequencySelection { threshold } => {
                leaves::selection(*threshold, false, artifacts)
            }
        }
    }
}

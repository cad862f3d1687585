// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Actions without children.

use log::{debug, trace};

use super::{
    ActionType, ArtifactSet, SetFlaggingMode, SetImageOperation, StrategyError, SumThresholdParams,
};
use crate::{
    data::{GridError, Image2D, Mask2D, TimeFrequencyData},
    surface_fit::{
        fit_background, FringeStopFit, FringeStopParams, LocalFitMethod, LocalFitParams,
        SurfaceFitMethod, SvdMitigater,
    },
    threshold::{
        morphology::{dilate, scale_invariant_rank},
        selection::{frequency_selection, time_selection},
        stats::{mean_and_std, rayleigh_mode, unflagged_values, winsorised_mean_and_std},
        NoiseDistribution, ThresholdConfig,
    },
};

fn single_image(data: &TimeFrequencyData, action: ActionType) -> Result<&Image2D, StrategyError> {
    data.get_single_image()
        .map_err(|_| StrategyError::NotSingleImage {
            action,
            count: data.image_count(),
        })
}

pub(super) fn sum_threshold(
    params: &SumThresholdParams,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let image = single_image(&artifacts.contaminated, ActionType::SumThreshold)?;
    let mut mask = artifacts.contaminated.get_single_mask();

    let values = unflagged_values(image, &mask);
    let noise = match params.distribution {
        NoiseDistribution::Gaussian => winsorised_mean_and_std(&values).map(|(_, std)| std),
        NoiseDistribution::Rayleigh => rayleigh_mode(&values),
        NoiseDistribution::Uniform => mean_and_std(&values).map(|(_, std)| std),
    };
    let Some(noise) = noise.filter(|n| n.is_finite() && *n > 0.0) else {
        debug!("No noise left to threshold; not flagging");
        return Ok(());
    };

    let mut config = ThresholdConfig::new(params.method, params.algorithm);
    config.initialize_lengths(params.lengths)?;
    if !params.time_direction {
        config.remove_horizontal_operations();
    }
    if !params.frequency_direction {
        config.remove_vertical_operations();
    }
    config.initialize_thresholds_from_first_threshold(
        params.base_threshold * noise,
        params.distribution,
    )?;
    let sensitivity = params.base_sensitivity * artifacts.sensitivity;
    trace!(
        "{} with noise {noise:.4e} at sensitivity {sensitivity}",
        params.method
    );

    let before = mask.count_flagged();
    config.execute(image, &mut mask, true, sensitivity)?;
    trace!("Flagged {} more samples", mask.count_flagged() - before);
    artifacts.contaminated.set_global_mask(mask)?;
    Ok(())
}

/// Flag every sample for which `predicate` is true of the values of all
/// images of its polarisation.
fn flag_samples(
    data: &mut TimeFrequencyData,
    predicate: impl Fn(&[f32]) -> bool,
) -> Result<(), GridError> {
    let (width, height) = (data.width(), data.height());
    let masks: Vec<Mask2D> = (0..data.polarisation_count())
        .map(|i_pol| {
            let images = data.polarisation_images(i_pol);
            let mut mask = data.mask_for_polarisation(i_pol);
            let mut values = Vec::with_capacity(images.len());
            for y in 0..height {
                for x in 0..width {
                    values.clear();
                    values.extend(images.iter().map(|i| i.value(x, y)));
                    if predicate(&values) {
                        mask.set_value(x, y, true);
                    }
                }
            }
            mask
        })
        .collect();
    for (i_pol, mask) in masks.into_iter().enumerate() {
        data.set_polarisation_mask(i_pol, mask)?;
    }
    Ok(())
}

pub(super) fn set_flagging(
    mode: SetFlaggingMode,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let data = &mut artifacts.contaminated;
    match mode {
        SetFlaggingMode::Clear => data.set_no_mask(),
        SetFlaggingMode::Everything => {
            data.set_global_mask(Mask2D::flagged(data.width(), data.height()))?
        }
        SetFlaggingMode::FromOriginal => data.set_masks_from(&artifacts.original)?,
        SetFlaggingMode::OrOriginal => data.join_mask(&artifacts.original)?,
        SetFlaggingMode::Invert => data.for_each_mask_mut(Mask2D::invert),
        SetFlaggingMode::PolarisationsEqual => {
            let mask = data.get_single_mask();
            data.set_global_mask(mask)?;
        }
        SetFlaggingMode::FlagZeros => flag_samples(data, |v| v.iter().all(|&v| v == 0.0))?,
        SetFlaggingMode::FlagNonFinite => {
            flag_samples(data, |v| v.iter().any(|v| !v.is_finite()))?
        }
    }
    Ok(())
}

pub(super) fn set_image(
    operation: SetImageOperation,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    match operation {
        SetImageOperation::FromOriginal => {
            artifacts.contaminated.set_images_from(&artifacts.original)?
        }
        SetImageOperation::FromRevised => {
            artifacts.contaminated.set_images_from(&artifacts.revised)?
        }
        SetImageOperation::ZeroRevised => artifacts
            .revised
            .images_mut()
            .for_each(|image| image.fill(0.0)),
    }
    Ok(())
}

/// Fit the background of the contaminated data, make it the revised data and
/// subtract it from the contaminated data.
fn subtract_background(
    method: &mut dyn SurfaceFitMethod,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let background = fit_background(method, &artifacts.contaminated)?;
    artifacts.contaminated = artifacts.contaminated.subtract(&background)?;
    artifacts.revised = background;
    Ok(())
}

pub(super) fn sliding_window_fit(
    params: &LocalFitParams,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let mut method = LocalFitMethod::new(*params, artifacts.fft_lock.clone());
    subtract_background(&mut method, artifacts)
}

pub(super) fn svd_mitigation(
    singular_value_count: usize,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let mut method = SvdMitigater::new(singular_value_count);
    subtract_background(&mut method, artifacts)
}

pub(super) fn fringe_stopping(
    params: &FringeStopParams,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let metadata = artifacts.require_metadata()?.clone();
    let mut method = FringeStopFit::new(*params, metadata);
    subtract_background(&mut method, artifacts)
}

pub(super) fn dilate_masks(time_size: usize, frequency_size: usize, artifacts: &mut ArtifactSet) {
    artifacts
        .contaminated
        .for_each_mask_mut(|mask| dilate(mask, time_size, frequency_size));
}

pub(super) fn scale_invariant_rank_masks(
    eta_time: f64,
    eta_frequency: f64,
    artifacts: &mut ArtifactSet,
) {
    artifacts
        .contaminated
        .for_each_mask_mut(|mask| scale_invariant_rank(mask, eta_time, eta_frequency));
}

/// Flag outlying timesteps (`by_time`) or channels of the single contaminated
/// image.
pub(super) fn selection(
    threshold: f64,
    by_time: bool,
    artifacts: &mut ArtifactSet,
) -> Result<(), StrategyError> {
    let action = if by_time {
        ActionType::TimeSelection
    } else {
        ActionType::FrequencySelection
    };
    let image = single_image(&artifacts.contaminated, action)?;
    let mut mask = artifacts.contaminated.get_single_mask();
    if by_time {
        time_selection(image, &mut mask, threshold);
    } else {
        frequency_selection(image, &mut mask, threshold);
    }
    artifacts.contaminated.set_global_mask(mask)?;
    Ok(())
}

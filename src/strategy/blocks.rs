// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Actions with children.

use std::thread;

use crossbeam_channel::{bounded, Receiver};
use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace, warn};
use scopeguard::defer_on_unwind;

use super::{
    Action, ActionType, ArtifactSet, BaselineData, BaselineFailure, BaselineSource,
    ProgressListener, StrategyError,
};
use crate::data::ComplexRepresentation;

/// Run `children` in order. The first error stops the rest.
pub(super) fn run_children(
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    for child in children {
        child.perform(artifacts, listener)?;
    }
    Ok(())
}

/// Run `f` as task `index` of `count` of `action`. The task is ended even if
/// `f` fails.
fn as_task<T>(
    listener: &dyn ProgressListener,
    action: ActionType,
    (index, count): (usize, usize),
    description: &str,
    f: impl FnOnce() -> T,
) -> T {
    listener.on_start_task(action, index, count, description, 1.0);
    let result = f();
    listener.on_end_task(action);
    result
}

pub(super) fn for_each_polarisation(
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    let polarisations = artifacts.contaminated.polarisations();
    if polarisations.len() == 1 {
        return run_children(children, artifacts, listener);
    }

    let count = polarisations.len();
    for (i_pol, pol) in polarisations.into_iter().enumerate() {
        as_task(
            listener,
            ActionType::ForEachPolarisation,
            (i_pol, count),
            &format!("Polarisation {pol}"),
            || -> Result<(), StrategyError> {
                let mut local = artifacts.local_copy(
                    artifacts.original.polarisation_data(i_pol)?,
                    artifacts.contaminated.polarisation_data(i_pol)?,
                    artifacts.revised.polarisation_data(i_pol)?,
                );
                run_children(children, &mut local, listener)?;
                artifacts
                    .contaminated
                    .set_polarisation_data(i_pol, local.contaminated)?;
                artifacts
                    .revised
                    .set_polarisation_data(i_pol, local.revised)?;
                Ok(())
            },
        )?;
    }
    Ok(())
}

pub(super) fn for_each_complex_component(
    components: [bool; 4],
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    artifacts
        .contaminated
        .require_complex("Splitting complex components")?;

    let selected: Vec<ComplexRepresentation> = [
        ComplexRepresentation::Amplitude,
        ComplexRepresentation::Phase,
        ComplexRepresentation::Real,
        ComplexRepresentation::Imaginary,
    ]
    .into_iter()
    .zip(components)
    .filter(|(_, on)| *on)
    .map(|(r, _)| r)
    .collect();

    let count = selected.len();
    for (i, representation) in selected.into_iter().enumerate() {
        as_task(
            listener,
            ActionType::ForEachComplexComponent,
            (i, count),
            &representation.to_string(),
            || -> Result<(), StrategyError> {
                let mut local = artifacts.local_copy(
                    artifacts.original.make(representation)?,
                    artifacts.contaminated.make(representation)?,
                    artifacts.revised.make(representation)?,
                );
                run_children(children, &mut local, listener)?;
                artifacts.contaminated.join_mask(&local.contaminated)?;
                Ok(())
            },
        )?;
    }
    Ok(())
}

/// The sensitivity of pass `i` of `iterations`: `sensitivity_start` times
/// the parent's for the first pass, falling geometrically towards the
/// parent's.
pub(super) fn pass_sensitivity(
    parent: f64,
    sensitivity_start: f64,
    iterations: usize,
    i: usize,
) -> f64 {
    let exponent = (iterations - i) as f64 / iterations as f64;
    parent * sensitivity_start.powf(exponent)
}

pub(super) fn iteration(
    iterations: usize,
    sensitivity_start: f64,
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    let parent = artifacts.sensitivity;
    let result = (0..iterations).try_for_each(|i| {
        artifacts.sensitivity = pass_sensitivity(parent, sensitivity_start, iterations, i);
        trace!(
            "Iteration {} of {iterations}: sensitivity {}",
            i + 1,
            artifacts.sensitivity
        );
        run_children(children, artifacts, listener)?;
        listener.on_progress(ActionType::Iteration, i + 1, iterations);
        Ok(())
    });
    artifacts.sensitivity = parent;
    result
}

pub(super) fn combine_flag_results(
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    let start = artifacts.duplicate();
    for child in children {
        let mut local = start.duplicate();
        child.perform(&mut local, listener)?;
        artifacts.contaminated.join_mask(&local.contaminated)?;
    }
    Ok(())
}

pub(super) struct ResolutionChange {
    pub(super) time_factor: usize,
    pub(super) frequency_factor: usize,
    pub(super) restore_revised: bool,
    pub(super) restore_contaminated: bool,
    pub(super) restore_masks: bool,
}

pub(super) fn change_resolution(
    change: ResolutionChange,
    children: &[Action],
    artifacts: &mut ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    let (tf, ff) = (change.time_factor, change.frequency_factor);
    if tf == 0 || ff == 0 {
        return Err(StrategyError::InvalidParameter {
            action: ActionType::ChangeResolution,
            reason: "decrease factors must be at least 1",
        });
    }

    let mut local = artifacts.local_copy(
        artifacts.original.downsample(tf, ff)?,
        artifacts.contaminated.downsample(tf, ff)?,
        artifacts.revised.downsample(tf, ff)?,
    );
    local.replace_metadata(artifacts.metadata().map(|m| m.downsampled(tf, ff)));
    debug!(
        "Changed resolution from {}x{} to {}x{}",
        artifacts.contaminated.width(),
        artifacts.contaminated.height(),
        local.contaminated.width(),
        local.contaminated.height()
    );
    run_children(children, &mut local, listener)?;

    if change.restore_revised {
        artifacts.revised.set_images_upsampled(&local.revised, tf, ff)?;
    }
    if change.restore_contaminated {
        artifacts.contaminated = artifacts.contaminated.subtract(&artifacts.revised)?;
    }
    if change.restore_masks {
        artifacts
            .contaminated
            .join_mask_upsampled(&local.contaminated, tf, ff)?;
    }
    Ok(())
}

/// Everything a baseline worker thread needs.
struct BaselineWork<'a> {
    source: &'a dyn BaselineSource,
    num_baselines: usize,
    children: &'a [Action],
    parent: &'a ArtifactSet,
    listener: &'a dyn ProgressListener,
    error: &'a AtomicCell<bool>,
}

pub(super) fn for_each_baseline(
    threads: usize,
    children: &[Action],
    artifacts: &ArtifactSet,
    listener: &dyn ProgressListener,
) -> Result<(), StrategyError> {
    let source = artifacts
        .baselines
        .as_deref()
        .ok_or(StrategyError::NoBaselines(ActionType::ForEachBaseline))?;
    let num_baselines = source.num_baselines();
    let threads = match threads {
        0 => thread::available_parallelism().map_or(1, |n| n.get()),
        n => n,
    }
    .clamp(1, num_baselines.max(1));
    debug!("Processing {num_baselines} baselines on {threads} threads");

    let error = AtomicCell::new(false);
    let work = BaselineWork {
        source,
        num_baselines,
        children,
        parent: artifacts,
        listener,
        error: &error,
    };
    let (tx, rx) = bounded(threads);

    let mut failures = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let rx = rx.clone();
                let work = &work;
                scope.spawn(move || {
                    // If a panic happens, update our atomic error.
                    defer_on_unwind! { work.error.store(true); }
                    baseline_worker(rx, work)
                })
            })
            .collect();
        drop(rx);

        for index in 0..num_baselines {
            // If a worker has hit a fatal error, or every worker has exited,
            // stop handing out baselines.
            if error.load() || tx.send(index).is_err() {
                break;
            }
        }
        drop(tx);

        let mut failures = vec![];
        let mut fatal = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(mut f)) => failures.append(&mut f),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(failures),
        }
    })?;

    if failures.is_empty() {
        Ok(())
    } else {
        failures.sort_unstable_by_key(|f| f.index);
        Err(StrategyError::BaselineFailures {
            failures,
            total: num_baselines,
        })
    }
}

/// Flag the baselines received on `rx`. A usage error stops this worker and
/// tells the others to stop; other errors are collected.
fn baseline_worker(
    rx: Receiver<usize>,
    work: &BaselineWork,
) -> Result<Vec<BaselineFailure>, StrategyError> {
    let mut failures = vec![];
    for index in rx.iter() {
        if work.error.load() {
            break;
        }

        let (description, result) = match work.source.load(index) {
            Ok(baseline) => {
                let description = baseline
                    .metadata
                    .baseline_description()
                    .unwrap_or_else(|| format!("baseline {index}"));
                let result = as_task(
                    work.listener,
                    ActionType::ForEachBaseline,
                    (index, work.num_baselines),
                    &description,
                    || flag_baseline(index, baseline, work),
                );
                (description, result)
            }
            Err(e) => (format!("baseline {index}"), Err(e.into())),
        };

        match result {
            Ok(()) => (),
            Err(e) if e.is_usage_error() => {
                work.error.store(true);
                return Err(e);
            }
            Err(e) => {
                warn!("Couldn't flag {description}: {e}");
                work.listener.on_exception(ActionType::ForEachBaseline, &e);
                failures.push(BaselineFailure {
                    index,
                    description,
                    error: e,
                });
            }
        }
    }
    Ok(failures)
}

fn flag_baseline(
    index: usize,
    baseline: BaselineData,
    work: &BaselineWork,
) -> Result<(), StrategyError> {
    let BaselineData { data, metadata } = baseline;
    let revised = data.zeros_like();
    let mut local = work.parent.local_copy(data.clone(), data, revised);
    local.replace_metadata(Some(metadata));
    run_children(work.children, &mut local, work.listener)?;
    work.source.write_flags(index, &local.contaminated)?;
    Ok(())
}

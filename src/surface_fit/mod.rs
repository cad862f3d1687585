// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Methods that estimate the smooth background of time-frequency data.
//!
//! Every method splits its work into independent tasks, so that a caller can
//! spread them over a thread pool. The usual sequence is
//! [`SurfaceFitMethod::initialize`], [`SurfaceFitMethod::perform_fit`] for
//! every task, then [`SurfaceFitMethod::background`]; [`fit_background`] does
//! all three with rayon.

mod error;
pub mod fft;
pub mod fringe;
pub mod local_fit;
pub mod svd;
#[cfg(test)]
mod tests;

pub use error::SurfaceFitError;
pub use fft::FftPlanLock;
pub use fringe::{FringeStopFit, FringeStopParams};
pub use local_fit::{LocalFitKind, LocalFitMethod, LocalFitParams};
pub use svd::SvdMitigater;

use std::sync::OnceLock;

use rayon::prelude::*;

use crate::data::{Image2D, TimeFrequencyData};

pub trait SurfaceFitMethod: Sync {
    /// Capture the data (and its flags) to fit, discarding any previous fit.
    fn initialize(&mut self, data: &TimeFrequencyData) -> Result<(), SurfaceFitError>;

    /// The number of independent units of work.
    fn task_count(&self) -> Result<usize, SurfaceFitError>;

    /// Do one unit of work. Tasks may be performed in any order and
    /// concurrently.
    fn perform_fit(&self, task: usize) -> Result<(), SurfaceFitError>;

    /// The fitted background, as new data with the representation and
    /// polarisations of the input. The input isn't modified.
    fn background(&self) -> Result<TimeFrequencyData, SurfaceFitError>;
}

/// Initialise `method` with `data`, perform every task in parallel and return
/// the background.
pub fn fit_background<M: SurfaceFitMethod + ?Sized>(
    method: &mut M,
    data: &TimeFrequencyData,
) -> Result<TimeFrequencyData, SurfaceFitError> {
    method.initialize(data)?;
    let task_count = method.task_count()?;
    (0..task_count)
        .into_par_iter()
        .try_for_each(|task| method.perform_fit(task))?;
    method.background()
}

/// The captured input of a fit and one result slot per task. Each slot holds
/// the images produced by its task.
struct FitState {
    input: TimeFrequencyData,
    slots: Vec<OnceLock<Vec<Image2D>>>,
}

impl FitState {
    fn new(input: TimeFrequencyData, task_count: usize) -> FitState {
        FitState {
            input,
            slots: (0..task_count).map(|_| OnceLock::new()).collect(),
        }
    }

    fn check_task(&self, task: usize) -> Result<(), SurfaceFitError> {
        if task >= self.slots.len() {
            return Err(SurfaceFitError::TaskIndex {
                index: task,
                count: self.slots.len(),
            });
        }
        Ok(())
    }

    /// Store the result of a task. Repeating a task keeps the first result.
    fn store(&self, task: usize, images: Vec<Image2D>) {
        let _ = self.slots[task].set(images);
    }

    /// All task results in task order, or an error if any task hasn't been
    /// performed.
    fn collect(&self) -> Result<Vec<Image2D>, SurfaceFitError> {
        let completed = self.slots.iter().filter(|s| s.get().is_some()).count();
        if completed != self.slots.len() {
            return Err(SurfaceFitError::IncompleteFit {
                completed,
                total: self.slots.len(),
            });
        }
        Ok(self
            .slots
            .iter()
            .filter_map(|s| s.get())
            .flat_map(|images| images.iter().cloned())
            .collect())
    }
}

/// The per-channel fallback used where every sample of a fitting window is
/// flagged: the mean of the usable samples of the channel, or zero if there
/// are none.
fn channel_fallbacks(values: &Image2D, usable: impl Fn(usize, usize) -> bool) -> Vec<f32> {
    (0..values.height())
        .map(|y| {
            let (sum, count) = (0..values.width())
                .filter(|&x| usable(x, y))
                .fold((0.0_f64, 0_usize), |(s, c), x| {
                    (s + f64::from(values.value(x, y)), c + 1)
                });
            if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect()
}

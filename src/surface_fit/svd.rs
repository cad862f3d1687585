// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Background estimation by singular value decomposition.
//!
//! The complex grid of each polarisation is decomposed, the `remove_count`
//! largest singular values are zeroed and the grid is recomposed. Flags are
//! ignored.

use log::debug;
use nalgebra::DMatrix;
use num_complex::Complex;

use super::{FitState, SurfaceFitError, SurfaceFitMethod};
use crate::data::{Image2D, TimeFrequencyData};

const SVD_MAX_ITERATIONS: usize = 10_000;

/// One task per polarisation. Requires complex data.
pub struct SvdMitigater {
    remove_count: usize,
    state: Option<FitState>,
}

impl SvdMitigater {
    pub fn new(remove_count: usize) -> SvdMitigater {
        SvdMitigater {
            remove_count,
            state: None,
        }
    }

    fn state(&self) -> Result<&FitState, SurfaceFitError> {
        self.state.as_ref().ok_or(SurfaceFitError::NotInitialised)
    }
}

impl SurfaceFitMethod for SvdMitigater {
    fn initialize(&mut self, data: &TimeFrequencyData) -> Result<(), SurfaceFitError> {
        data.require_complex("SVD mitigation")?;
        if data.width() == 0 || data.height() == 0 {
            return Err(SurfaceFitError::Degenerate {
                width: data.width(),
                height: data.height(),
            });
        }
        self.state = Some(FitState::new(data.clone(), data.polarisation_count()));
        Ok(())
    }

    fn task_count(&self) -> Result<usize, SurfaceFitError> {
        Ok(self.state()?.slots.len())
    }

    fn perform_fit(&self, task: usize) -> Result<(), SurfaceFitError> {
        let state = self.state()?;
        state.check_task(task)?;
        let images = state.input.polarisation_images(task);
        let (real, imag) = remove_singular_values(&images[0], &images[1], self.remove_count)?;
        state.store(task, vec![real, imag]);
        Ok(())
    }

    fn background(&self) -> Result<TimeFrequencyData, SurfaceFitError> {
        let state = self.state()?;
        Ok(state.input.with_images_replaced(state.collect()?)?)
    }
}

/// Zero the `remove_count` largest singular values of a complex grid and
/// recompose it.
pub fn remove_singular_values(
    real: &Image2D,
    imag: &Image2D,
    remove_count: usize,
) -> Result<(Image2D, Image2D), SurfaceFitError> {
    let (width, height) = (real.width(), real.height());
    if width == 0 || height == 0 {
        return Err(SurfaceFitError::Degenerate { width, height });
    }
    if !real.all_finite() || !imag.all_finite() {
        return Err(SurfaceFitError::NonFinite("SVD input"));
    }

    let matrix = DMatrix::from_fn(height, width, |y, x| {
        Complex::new(f64::from(real.value(x, y)), f64::from(imag.value(x, y)))
    });
    let mut svd = matrix
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or(SurfaceFitError::SvdNotConverged)?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_unstable_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
    for &i in order.iter().take(remove_count) {
        svd.singular_values[i] = 0.0;
    }
    debug!(
        "Removed {} of {} singular values",
        remove_count.min(order.len()),
        order.len()
    );

    let recomposed = svd
        .recompose()
        .map_err(|e| SurfaceFitError::SvdRecompose(e.to_string()))?;
    if recomposed.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
        return Err(SurfaceFitError::NonFinite("SVD reconstruction"));
    }

    Ok((
        Image2D::from_fn(width, height, |x, y| recomposed[(y, x)].re as f32),
        Image2D::from_fn(width, height, |x, y| recomposed[(y, x)].im as f32),
    ))
}

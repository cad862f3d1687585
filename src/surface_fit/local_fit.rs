// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sliding-window background estimation.
//!
//! Every sample of the background is a statistic of the unflagged, finite
//! samples in a `(2 × half_window_width + 1)` × `(2 × half_window_height + 1)`
//! window centred on it. Where every sample of a window is flagged, the
//! estimate is the mean of the unflagged samples of the same channel, or zero
//! if the whole channel is flagged.

use log::trace;
use ndarray::prelude::*;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::{
    channel_fallbacks,
    fft::{Fft2Plans, FftPlanLock},
    FitState, SurfaceFitError, SurfaceFitMethod,
};
use crate::{
    data::{Image2D, Mask2D, TimeFrequencyData},
    threshold::stats::median,
};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocalFitKind {
    /// The background is the input.
    None,
    Average,
    #[default]
    GaussianWeightedAverage,
    /// The same as [`LocalFitKind::GaussianWeightedAverage`], but the
    /// convolutions are done with FFTs.
    FastGaussianWeightedAverage,
    Median,
    Minimum,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFitParams {
    pub method: LocalFitKind,
    /// Half the window size along time \[timesteps\].
    pub half_window_width: usize,
    /// Half the window size along frequency \[channels\].
    pub half_window_height: usize,
    /// The standard deviation of the Gaussian kernel along time
    /// \[timesteps\].
    pub kernel_width: f64,
    /// The standard deviation of the Gaussian kernel along frequency
    /// \[channels\].
    pub kernel_height: f64,
}

impl Default for LocalFitParams {
    fn default() -> Self {
        LocalFitParams {
            method: LocalFitKind::GaussianWeightedAverage,
            half_window_width: 20,
            half_window_height: 10,
            kernel_width: 7.5,
            kernel_height: 5.0,
        }
    }
}

/// One task per image.
pub struct LocalFitMethod {
    params: LocalFitParams,
    fft_lock: FftPlanLock,
    state: Option<FitState>,
}

impl LocalFitMethod {
    pub fn new(params: LocalFitParams, fft_lock: FftPlanLock) -> LocalFitMethod {
        LocalFitMethod {
            params,
            fft_lock,
            state: None,
        }
    }

    fn state(&self) -> Result<&FitState, SurfaceFitError> {
        self.state.as_ref().ok_or(SurfaceFitError::NotInitialised)
    }
}

impl SurfaceFitMethod for LocalFitMethod {
    fn initialize(&mut self, data: &TimeFrequencyData) -> Result<(), SurfaceFitError> {
        self.state = Some(FitState::new(data.clone(), data.image_count()));
        Ok(())
    }

    fn task_count(&self) -> Result<usize, SurfaceFitError> {
        Ok(self.state()?.slots.len())
    }

    fn perform_fit(&self, task: usize) -> Result<(), SurfaceFitError> {
        let state = self.state()?;
        state.check_task(task)?;
        let image = state.input.image(task);
        let mask = state.input.mask_for_image(task);
        trace!("Local fit ({}) of image {task}", self.params.method);
        let background = fit_image(image, &mask, &self.params, &self.fft_lock);
        state.store(task, vec![background]);
        Ok(())
    }

    fn background(&self) -> Result<TimeFrequencyData, SurfaceFitError> {
        let state = self.state()?;
        Ok(state.input.with_images_replaced(state.collect()?)?)
    }
}

/// Fit the background of a single image.
pub fn fit_image(
    image: &Image2D,
    mask: &Mask2D,
    params: &LocalFitParams,
    fft_lock: &FftPlanLock,
) -> Image2D {
    if params.method == LocalFitKind::None || image.is_empty() {
        return image.clone();
    }

    let usable = usable_samples(image, mask);
    let fallbacks = channel_fallbacks(image, |x, y| usable[(y, x)]);
    let (hw, hh) = (params.half_window_width, params.half_window_height);

    match params.method {
        LocalFitKind::None => unreachable!(),
        LocalFitKind::Average => {
            let sums = IntegralImage::new(image, &usable);
            Image2D::from_fn(image.width(), image.height(), |x, y| {
                let (sum, count) = sums.window(x, y, hw, hh);
                if count == 0 {
                    fallbacks[y]
                } else {
                    (sum / count as f64) as f32
                }
            })
        }
        LocalFitKind::GaussianWeightedAverage => {
            gaussian_direct(image, &usable, params, &fallbacks)
        }
        LocalFitKind::FastGaussianWeightedAverage => {
            gaussian_fft(image, &usable, params, &fallbacks, fft_lock)
        }
        LocalFitKind::Median | LocalFitKind::Minimum => {
            Image2D::from_fn(image.width(), image.height(), |x, y| {
                let window = window_values(image, &usable, x, y, hw, hh);
                let statistic = if params.method == LocalFitKind::Median {
                    median(&window)
                } else {
                    window.iter().copied().reduce(f32::min)
                };
                statistic.unwrap_or(fallbacks[y])
            })
        }
    }
}

/// Unflagged samples with finite values.
fn usable_samples(image: &Image2D, mask: &Mask2D) -> Array2<bool> {
    ndarray::Zip::from(&image.view())
        .and(&mask.view())
        .map_collect(|v, &f| !f && v.is_finite())
}

/// Clip a window centred on `centre` with half-size `half` to `0..len`.
fn window_range(centre: usize, half: usize, len: usize) -> std::ops::Range<usize> {
    centre.saturating_sub(half)..(centre + half + 1).min(len)
}

fn window_values(
    image: &Image2D,
    usable: &Array2<bool>,
    x: usize,
    y: usize,
    hw: usize,
    hh: usize,
) -> Vec<f32> {
    let xs = window_range(x, hw, image.width());
    let ys = window_range(y, hh, image.height());
    let values = image.view();
    let values = values.slice(s![ys.clone(), xs.clone()]);
    let usable = usable.slice(s![ys, xs]);
    values
        .iter()
        .zip(usable.iter())
        .filter(|(_, u)| **u)
        .map(|(&v, _)| v)
        .collect()
}

/// Sums and counts of usable samples over rectangles.
struct IntegralImage {
    sums: Array2<f64>,
    counts: Array2<usize>,
}

impl IntegralImage {
    fn new(image: &Image2D, usable: &Array2<bool>) -> IntegralImage {
        let (h, w) = (image.height(), image.width());
        let mut sums = Array2::zeros((h + 1, w + 1));
        let mut counts = Array2::zeros((h + 1, w + 1));
        for y in 0..h {
            for x in 0..w {
                let (v, c) = if usable[(y, x)] {
                    (f64::from(image.value(x, y)), 1)
                } else {
                    (0.0, 0)
                };
                sums[(y + 1, x + 1)] = v + sums[(y, x + 1)] + sums[(y + 1, x)] - sums[(y, x)];
                counts[(y + 1, x + 1)] =
                    c + counts[(y, x + 1)] + counts[(y + 1, x)] - counts[(y, x)];
            }
        }
        IntegralImage { sums, counts }
    }

    /// The sum and count of usable samples in the window around `(x, y)`.
    fn window(&self, x: usize, y: usize, hw: usize, hh: usize) -> (f64, usize) {
        let (h, w) = (self.sums.nrows() - 1, self.sums.ncols() - 1);
        let xs = window_range(x, hw, w);
        let ys = window_range(y, hh, h);
        let sum = self.sums[(ys.end, xs.end)] - self.sums[(ys.start, xs.end)]
            - self.sums[(ys.end, xs.start)]
            + self.sums[(ys.start, xs.start)];
        let count = self.counts[(ys.end, xs.end)] + self.counts[(ys.start, xs.start)]
            - self.counts[(ys.start, xs.end)]
            - self.counts[(ys.end, xs.start)];
        (sum, count)
    }
}

/// Gaussian weights for offsets `-half..=half`. A non-positive standard
/// deviation gives a kernel that only weights the centre.
fn gaussian_kernel(half: usize, sigma: f64) -> Vec<f64> {
    (0..2 * half + 1)
        .map(|i| {
            let d = i as f64 - half as f64;
            if sigma > 0.0 {
                (-d * d / (2.0 * sigma * sigma)).exp()
            } else if d == 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Convolve every row (`axis` = 1) or column (`axis` = 0) with a kernel of
/// odd length, treating samples beyond the edges as zero.
fn convolve_1d(input: &Array2<f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
    let half = kernel.len() / 2;
    let mut output = Array2::zeros(input.raw_dim());
    for (line_in, mut line_out) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let n = line_in.len();
        for (i, out) in line_out.iter_mut().enumerate() {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            *out = (lo..hi).map(|j| kernel[j + half - i] * line_in[j]).sum();
        }
    }
    output
}

/// Normalised convolution with a separable Gaussian kernel: flagged samples
/// have no weight, and the result is divided by the total weight of the
/// samples that were used.
fn gaussian_direct(
    image: &Image2D,
    usable: &Array2<bool>,
    params: &LocalFitParams,
    fallbacks: &[f32],
) -> Image2D {
    let (weighted, weights) = weighted_inputs(image, usable);
    let kx = gaussian_kernel(params.half_window_width, params.kernel_width);
    let ky = gaussian_kernel(params.half_window_height, params.kernel_height);
    let numerator = convolve_1d(&convolve_1d(&weighted, &kx, Axis(1)), &ky, Axis(0));
    let denominator = convolve_1d(&convolve_1d(&weights, &kx, Axis(1)), &ky, Axis(0));

    let counts = IntegralImage::new(image, usable);
    Image2D::from_fn(image.width(), image.height(), |x, y| {
        let (_, count) = counts.window(x, y, params.half_window_width, params.half_window_height);
        let d = denominator[(y, x)];
        if count == 0 || d <= 0.0 {
            fallbacks[y]
        } else {
            (numerator[(y, x)] / d) as f32
        }
    })
}

/// The same normalised convolution as [`gaussian_direct`], but both
/// convolutions are done with zero-padded 2D FFTs.
fn gaussian_fft(
    image: &Image2D,
    usable: &Array2<bool>,
    params: &LocalFitParams,
    fallbacks: &[f32],
    fft_lock: &FftPlanLock,
) -> Image2D {
    let (hw, hh) = (params.half_window_width, params.half_window_height);
    let (h, w) = (image.height(), image.width());
    // Padding by the full kernel size keeps wrapped-around contributions out
    // of the grid.
    let (ph, pw) = (h + 2 * hh, w + 2 * hw);
    let plans = Fft2Plans::new(ph, pw, fft_lock);

    let kx = gaussian_kernel(hw, params.kernel_width);
    let ky = gaussian_kernel(hh, params.kernel_height);
    let mut kernel = vec![Complex::default(); ph * pw];
    for (iy, &gy) in ky.iter().enumerate() {
        for (ix, &gx) in kx.iter().enumerate() {
            let row = (iy + ph - hh) % ph;
            let col = (ix + pw - hw) % pw;
            kernel[row * pw + col] = Complex::new(gy * gx, 0.0);
        }
    }
    plans.forward(&mut kernel);

    let (weighted, weights) = weighted_inputs(image, usable);
    let convolve = |input: &Array2<f64>| {
        let mut buffer = vec![Complex::default(); ph * pw];
        for ((y, x), &v) in input.indexed_iter() {
            buffer[y * pw + x] = Complex::new(v, 0.0);
        }
        plans.forward(&mut buffer);
        buffer.iter_mut().zip(&kernel).for_each(|(b, k)| *b *= k);
        plans.inverse(&mut buffer);
        buffer
    };
    let numerator = convolve(&weighted);
    let denominator = convolve(&weights);

    let counts = IntegralImage::new(image, usable);
    Image2D::from_fn(w, h, |x, y| {
        let (_, count) = counts.window(x, y, hw, hh);
        let d = denominator[y * pw + x].re;
        if count == 0 || d <= 0.0 {
            fallbacks[y]
        } else {
            (numerator[y * pw + x].re / d) as f32
        }
    })
}

/// The image with unusable samples zeroed, and the weights (1 for usable
/// samples, 0 otherwise).
fn weighted_inputs(image: &Image2D, usable: &Array2<bool>) -> (Array2<f64>, Array2<f64>) {
    let weighted = ndarray::Zip::from(&image.view())
        .and(usable)
        .map_collect(|&v, &u| if u { f64::from(v) } else { 0.0 });
    let weights = usable.mapv(|u| if u { 1.0 } else { 0.0 });
    (weighted, weights)
}

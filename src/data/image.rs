// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A two-dimensional grid of samples.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::GridError;

/// A two-dimensional, fixed-size grid of single-precision samples.
///
/// The width is the number of timesteps and the height the number of
/// channels. The backing array has shape `(height, width)`, so a row is one
/// channel over all timesteps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image2D {
    data: Array2<f32>,
}

impl Image2D {
    pub fn zeros(width: usize, height: usize) -> Image2D {
        Image2D {
            data: Array2::zeros((height, width)),
        }
    }

    pub fn from_elem(width: usize, height: usize, value: f32) -> Image2D {
        Image2D {
            data: Array2::from_elem((height, width), value),
        }
    }

    /// Make an image from an array with shape `(height, width)`.
    pub fn from_array(data: Array2<f32>) -> Image2D {
        Image2D { data }
    }

    /// Make an image by evaluating `f(x, y)` for every sample.
    pub fn from_fn<F: FnMut(usize, usize) -> f32>(
        width: usize,
        height: usize,
        mut f: F,
    ) -> Image2D {
        Image2D {
            data: Array2::from_shape_fn((height, width), |(y, x)| f(x, y)),
        }
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sample at timestep `x` and channel `y`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.data[(y, x)]
    }

    #[inline]
    pub fn set_value(&mut self, x: usize, y: usize, value: f32) {
        self.data[(y, x)] = value;
    }

    pub fn view(&self) -> ArrayView2<f32> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<f32> {
        self.data.view_mut()
    }

    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    pub(crate) fn check_same_shape(&self, other: &Image2D) -> Result<(), GridError> {
        if self.data.dim() != other.data.dim() {
            return Err(GridError::DimensionMismatch {
                expected_width: self.width(),
                expected_height: self.height(),
                found_width: other.width(),
                found_height: other.height(),
            });
        }
        Ok(())
    }

    /// `self - other`, as a new image.
    pub fn subtract(&self, other: &Image2D) -> Result<Image2D, GridError> {
        self.check_same_shape(other)?;
        Ok(Image2D {
            data: &self.data - &other.data,
        })
    }

    pub fn add_assign(&mut self, other: &Image2D) -> Result<(), GridError> {
        self.check_same_shape(other)?;
        self.data += &other.data;
        Ok(())
    }

    /// Overwrite all samples with those of `other`.
    pub fn assign(&mut self, other: &Image2D) -> Result<(), GridError> {
        self.check_same_shape(other)?;
        self.data.assign(&other.data);
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

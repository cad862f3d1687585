// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A two-dimensional grid of flags.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::GridError;

/// A two-dimensional grid of flags; `true` means the sample is flagged.
///
/// As with [`super::Image2D`], the backing array has shape `(height, width)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask2D {
    flags: Array2<bool>,
}

impl Mask2D {
    /// A mask with nothing flagged.
    pub fn unflagged(width: usize, height: usize) -> Mask2D {
        Mask2D {
            flags: Array2::from_elem((height, width), false),
        }
    }

    /// A mask with everything flagged.
    pub fn flagged(width: usize, height: usize) -> Mask2D {
        Mask2D {
            flags: Array2::from_elem((height, width), true),
        }
    }

    /// Make a mask from an array with shape `(height, width)`.
    pub fn from_array(flags: Array2<bool>) -> Mask2D {
        Mask2D { flags }
    }

    pub fn width(&self) -> usize {
        self.flags.len_of(Axis(1))
    }

    pub fn height(&self) -> usize {
        self.flags.len_of(Axis(0))
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the mask.
    #[inline]
    pub fn value(&self, x: usize, y: usize) -> bool {
        self.flags[(y, x)]
    }

    #[inline]
    pub fn set_value(&mut self, x: usize, y: usize, flag: bool) {
        self.flags[(y, x)] = flag;
    }

    pub fn view(&self) -> ArrayView2<bool> {
        self.flags.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<bool> {
        self.flags.view_mut()
    }

    pub fn into_array(self) -> Array2<bool> {
        self.flags
    }

    pub fn count_flagged(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// The fraction of samples that are flagged. An empty mask is 0% flagged.
    pub fn flagged_fraction(&self) -> f64 {
        if self.flags.is_empty() {
            0.0
        } else {
            self.count_flagged() as f64 / self.flags.len() as f64
        }
    }

    pub(crate) fn check_same_shape(&self, width: usize, height: usize) -> Result<(), GridError> {
        if self.width() != width || self.height() != height {
            return Err(GridError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                found_width: self.width(),
                found_height: self.height(),
            });
        }
        Ok(())
    }

    /// Flag everything that is flagged in `other`. Nothing is ever unflagged.
    pub fn union_with(&mut self, other: &Mask2D) -> Result<(), GridError> {
        other.check_same_shape(self.width(), self.height())?;
        self.flags
            .zip_mut_with(&other.flags, |this, &that| *this = *this || that);
        Ok(())
    }

    /// Unflag everything.
    pub fn clear(&mut self) {
        self.flags.fill(false);
    }

    pub fn invert(&mut self) {
        self.flags.mapv_inplace(|f| !f);
    }

    pub fn is_row_flagged(&self, y: usize) -> bool {
        self.flags.row(y).iter().all(|&f| f)
    }

    pub fn is_column_flagged(&self, x: usize) -> bool {
        self.flags.column(x).iter().all(|&f| f)
    }
}

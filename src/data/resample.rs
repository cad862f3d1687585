// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Changing the time and frequency resolution of grids.
//!
//! Downsampling averages blocks of `time_factor` × `frequency_factor` samples,
//! ignoring flagged samples. A block where every sample is flagged is averaged
//! without regard to flags and the output sample is flagged. Upsampling is
//! nearest-neighbour.

use ndarray::prelude::*;

use super::{GridError, Image2D, Mask2D, MaskLayout, TimeFrequencyData};

fn check_factors(time_factor: usize, frequency_factor: usize) -> Result<(), GridError> {
    if time_factor == 0 || frequency_factor == 0 {
        return Err(GridError::ResampleFactor {
            time: time_factor,
            frequency: frequency_factor,
        });
    }
    Ok(())
}

/// Average blocks of samples of an image, respecting the flags in `mask`.
pub fn downsample_image(
    image: &Image2D,
    mask: &Mask2D,
    time_factor: usize,
    frequency_factor: usize,
) -> Result<(Image2D, Mask2D), GridError> {
    check_factors(time_factor, frequency_factor)?;
    mask.check_same_shape(image.width(), image.height())?;

    let new_width = image.width().div_ceil(time_factor);
    let new_height = image.height().div_ceil(frequency_factor);
    let mut out_image = Array2::zeros((new_height, new_width));
    let mut out_mask = Array2::from_elem((new_height, new_width), false);

    let data = image.view();
    let flags = mask.view();
    for ((y, x), out) in out_image.indexed_iter_mut() {
        let rows = y * frequency_factor..((y + 1) * frequency_factor).min(image.height());
        let cols = x * time_factor..((x + 1) * time_factor).min(image.width());
        let block = data.slice(s![rows.clone(), cols.clone()]);
        let block_flags = flags.slice(s![rows, cols]);

        let (mut sum, mut count) = (0.0_f64, 0_usize);
        for (&v, &f) in block.iter().zip(block_flags.iter()) {
            if !f {
                sum += v as f64;
                count += 1;
            }
        }
        if count > 0 {
            *out = (sum / count as f64) as f32;
        } else {
            let total: f64 = block.iter().map(|&v| v as f64).sum();
            *out = (total / block.len() as f64) as f32;
            out_mask[(y, x)] = true;
        }
    }

    Ok((Image2D::from_array(out_image), Mask2D::from_array(out_mask)))
}

/// Nearest-neighbour upsampling of a low-resolution image to `width` ×
/// `height`.
pub fn upsample_image(
    image: &Image2D,
    width: usize,
    height: usize,
    time_factor: usize,
    frequency_factor: usize,
) -> Result<Image2D, GridError> {
    check_factors(time_factor, frequency_factor)?;
    let expected = (width.div_ceil(time_factor), height.div_ceil(frequency_factor));
    if (image.width(), image.height()) != expected {
        return Err(GridError::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            found_width: image.width(),
            found_height: image.height(),
        });
    }
    Ok(Image2D::from_fn(width, height, |x, y| {
        image.value(x / time_factor, y / frequency_factor)
    }))
}

/// Nearest-neighbour upsampling of a low-resolution mask to `width` ×
/// `height`.
pub fn upsample_mask(
    mask: &Mask2D,
    width: usize,
    height: usize,
    time_factor: usize,
    frequency_factor: usize,
) -> Result<Mask2D, GridError> {
    check_factors(time_factor, frequency_factor)?;
    mask.check_same_shape(width.div_ceil(time_factor), height.div_ceil(frequency_factor))?;
    Ok(Mask2D::from_array(Array2::from_shape_fn(
        (height, width),
        |(y, x)| mask.value(x / time_factor, y / frequency_factor),
    )))
}

impl TimeFrequencyData {
    /// Average to a lower resolution. Each polarisation is averaged with its
    /// own flags, and the result carries one mask per polarisation (or a
    /// shared mask if there was one).
    pub fn downsample(
        &self,
        time_factor: usize,
        frequency_factor: usize,
    ) -> Result<TimeFrequencyData, GridError> {
        check_factors(time_factor, frequency_factor)?;
        let mut images = Vec::with_capacity(self.image_count());
        let mut masks = Vec::with_capacity(self.polarisation_count());
        for i_pol in 0..self.polarisation_count() {
            let mask = self.mask_for_polarisation(i_pol);
            let mut pol_mask = None;
            for image in self.polarisation_images(i_pol) {
                let (low_image, low_mask) =
                    downsample_image(image, &mask, time_factor, frequency_factor)?;
                images.push(low_image);
                pol_mask.get_or_insert(low_mask);
            }
            masks.extend(pol_mask);
        }

        let polarisations = self
            .polarisations()
            .into_iter()
            .zip(images.chunks(self.representation().images_per_polarisation()))
            .map(|(pol, images)| (pol, images.to_vec()))
            .collect();
        let mut low = TimeFrequencyData::new(self.representation(), polarisations)?;
        match self.mask_layout() {
            MaskLayout::Unset => (),
            MaskLayout::Shared(_) => low.set_global_mask(masks.swap_remove(0))?,
            MaskLayout::PerPolarisation(_) => {
                for (i_pol, mask) in masks.into_iter().enumerate() {
                    low.set_polarisation_mask(i_pol, mask)?;
                }
            }
        }
        Ok(low)
    }

    /// Nearest-neighbour upsampling of the images of low-resolution data to
    /// the resolution of `self`; the images of `self` are replaced, and its
    /// flags are kept.
    pub fn set_images_upsampled(
        &mut self,
        low: &TimeFrequencyData,
        time_factor: usize,
        frequency_factor: usize,
    ) -> Result<(), GridError> {
        if low.image_count() != self.image_count() {
            return Err(GridError::PolarisationCountMismatch(
                self.polarisation_count(),
                low.polarisation_count(),
            ));
        }
        let (width, height) = (self.width(), self.height());
        for (i, image) in self.images_mut().enumerate() {
            *image = upsample_image(low.image(i), width, height, time_factor, frequency_factor)?;
        }
        Ok(())
    }

    /// Flag everything that is flagged in low-resolution data, upsampled to
    /// the resolution of `self`.
    pub fn join_mask_upsampled(
        &mut self,
        low: &TimeFrequencyData,
        time_factor: usize,
        frequency_factor: usize,
    ) -> Result<(), GridError> {
        let (width, height) = (self.width(), self.height());
        let mut high = self.zeros_like();
        match low.mask_layout() {
            MaskLayout::Unset => return Ok(()),
            MaskLayout::Shared(m) => high.set_global_mask(upsample_mask(
                m,
                width,
                height,
                time_factor,
                frequency_factor,
            )?)?,
            MaskLayout::PerPolarisation(masks) => {
                if masks.len() != high.polarisation_count() {
                    return Err(GridError::PolarisationCountMismatch(
                        high.polarisation_count(),
                        masks.len(),
                    ));
                }
                for (i_pol, m) in masks.iter().enumerate() {
                    high.set_polarisation_mask(
                        i_pol,
                        upsample_mask(m, width, height, time_factor, frequency_factor)?,
                    )?;
                }
            }
        }
        self.join_mask(&high)
    }
}

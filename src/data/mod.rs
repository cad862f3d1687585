// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time-frequency grids, their flags and their metadata.

mod error;
mod image;
mod mask;
mod metadata;
mod resample;
mod tf_data;

pub use error::{GridError, MetadataError};
pub use image::Image2D;
pub use mask::Mask2D;
pub use metadata::{Antenna, TimeFrequencyMetadata};
pub use resample::{downsample_image, upsample_image, upsample_mask};
pub use tf_data::{
    ComplexRepresentation, MaskLayout, Polarisation, PolarisedImages, TimeFrequencyData,
};

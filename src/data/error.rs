// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with time-frequency grids and their metadata.

use thiserror::Error;

use super::ComplexRepresentation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid dimensions don't match: expected {expected_width}x{expected_height}, found {found_width}x{found_height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("{operation} requires {expected} data, but the data is {found}")]
    Representation {
        operation: &'static str,
        expected: ComplexRepresentation,
        found: ComplexRepresentation,
    },

    #[error("Representations don't match: {0} vs {1}")]
    RepresentationMismatch(ComplexRepresentation, ComplexRepresentation),

    #[error("{representation} data needs {expected} image(s) per polarisation, but {found} were given")]
    ImageCount {
        representation: ComplexRepresentation,
        expected: usize,
        found: usize,
    },

    #[error("Expected {expected} mask(s) (one per polarisation), but {found} were given")]
    MaskCount { expected: usize, found: usize },

    #[error("Polarisation counts don't match: {0} vs {1}")]
    PolarisationCountMismatch(usize, usize),

    #[error("Polarisation index {index} is out of range; there are {count} polarisations")]
    PolarisationIndex { index: usize, count: usize },

    #[error("Expected data with a single image, but there are {0} images")]
    NotSingleImage(usize),

    #[error("Time-frequency data needs at least one polarisation")]
    NoPolarisations,

    #[error("Resampling factors must be at least 1; got {time} (time) and {frequency} (frequency)")]
    ResampleFactor { time: usize, frequency: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("The '{0}' metadata is required but wasn't supplied")]
    Missing(&'static str),

    #[error("The metadata has {found} {what}, but the data has {expected}")]
    Inconsistent {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

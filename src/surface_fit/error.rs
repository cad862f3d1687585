// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with background fitting.

use thiserror::Error;

use crate::data::{GridError, MetadataError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceFitError {
    #[error("The fit hasn't been initialised with data")]
    NotInitialised,

    #[error("Only {completed} of {total} fit tasks have been performed")]
    IncompleteFit { completed: usize, total: usize },

    #[error("Fit task {index} doesn't exist; there are {count} tasks")]
    TaskIndex { index: usize, count: usize },

    #[error("Can't fit a background to a {width}x{height} grid")]
    Degenerate { width: usize, height: usize },

    #[error("The {0} contains non-finite values")]
    NonFinite(&'static str),

    #[error("The singular value decomposition didn't converge")]
    SvdNotConverged,

    #[error("Couldn't recompose the singular value decomposition: {0}")]
    SvdRecompose(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with running strategies.

use itertools::Itertools;
use thiserror::Error;

use super::ActionType;
use crate::{
    data::{GridError, MetadataError},
    surface_fit::SurfaceFitError,
    threshold::ThresholdError,
};

#[derive(Error, Debug)]
pub enum BaselineSourceError {
    #[error("Baseline {index} doesn't exist; there are {count} baselines")]
    Index { index: usize, count: usize },

    #[error("Couldn't write the flags of baseline {index}: {source}")]
    Flags {
        index: usize,
        #[source]
        source: GridError,
    },

    #[error("Baseline {0} is unusable; a thread panicked while holding it")]
    Poisoned(usize),

    /// For sources other than those in this crate.
    #[error("{0}")]
    Generic(String),
}

/// A baseline that couldn't be processed by a
/// [`Action::ForEachBaseline`](super::Action::ForEachBaseline).
#[derive(Debug)]
pub struct BaselineFailure {
    pub index: usize,
    /// e.g. "Tile011 x Tile012", or the index if the antenna names are unknown.
    pub description: String,
    pub error: StrategyError,
}

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("{action} needs a single image, but the data has {count}")]
    NotSingleImage { action: ActionType, count: usize },

    #[error("{0} needs a baseline source, but none was supplied")]
    NoBaselines(ActionType),

    #[error("{action}: {reason}")]
    InvalidParameter {
        action: ActionType,
        reason: &'static str,
    },

    #[error("{} of {total} baselines failed:\n{}", .failures.len(), summarise(.failures))]
    BaselineFailures {
        failures: Vec<BaselineFailure>,
        total: usize,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    SurfaceFit(#[from] SurfaceFitError),

    #[error(transparent)]
    BaselineSource(#[from] BaselineSourceError),
}

fn summarise(failures: &[BaselineFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}: {}", f.description, f.error))
        .join("\n")
}

impl StrategyError {
    /// Is this error caused by a violated precondition (missing metadata, the
    /// wrong representation, mismatched dimensions, an uninitialised fit)?
    /// Such errors would occur for every baseline, so processing stops.
    /// Other errors are numerical failures or problems with a single
    /// baseline's data.
    pub fn is_usage_error(&self) -> bool {
        match self {
            StrategyError::NotSingleImage { .. }
            | StrategyError::NoBaselines(_)
            | StrategyError::InvalidParameter { .. }
            | StrategyError::Grid(_)
            | StrategyError::Metadata(_)
            | StrategyError::Threshold(_) => true,

            StrategyError::SurfaceFit(e) => !matches!(
                e,
                SurfaceFitError::Degenerate { .. }
                    | SurfaceFitError::NonFinite(_)
                    | SurfaceFitError::SvdNotConverged
                    | SurfaceFitError::SvdRecompose(_)
            ),

            StrategyError::BaselineFailures { .. } | StrategyError::BaselineSource(_) => false,
        }
    }
}

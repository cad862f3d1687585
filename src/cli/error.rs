// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all hyperflag-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use super::{flag_simulated::FlagSimulatedArgsError, strategy_file::StrategyFileError};
use crate::{data::GridError, strategy::StrategyError};

/// The *only* publicly visible error from hyperflag. Each error message should
/// hint at what can be done about it, unless it's "generic".
#[derive(Error, Debug)]
pub enum HyperflagError {
    /// An error encountered while running a strategy.
    #[error("{0}\n\nTurning up the verbosity (-v or -vv) shows which action failed.")]
    Strategy(String),

    /// An error reading or writing a strategy file.
    #[error("{0}\n\nA strategy file with every action and its defaults can be made with 'hyperflag strategy-write'.")]
    StrategyFile(String),

    /// An error related to flag-simulated.
    #[error("{0}")]
    FlagSimulated(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files can be made with --save-toml.")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<StrategyError> for HyperflagError {
    fn from(e: StrategyError) -> Self {
        Self::Strategy(e.to_string())
    }
}

impl From<StrategyFileError> for HyperflagError {
    fn from(e: StrategyFileError) -> Self {
        match e {
            StrategyFileError::IO(e) => Self::from(e),
            _ => Self::StrategyFile(e.to_string()),
        }
    }
}

impl From<FlagSimulatedArgsError> for HyperflagError {
    fn from(e: FlagSimulatedArgsError) -> Self {
        match e {
            FlagSimulatedArgsError::Strategy(e) => Self::from(e),
            FlagSimulatedArgsError::Grid(e) => Self::from(e),
            _ => Self::FlagSimulated(e.to_string()),
        }
    }
}

impl From<GridError> for HyperflagError {
    fn from(e: GridError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<serde_json::Error> for HyperflagError {
    fn from(e: serde_json::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for HyperflagError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

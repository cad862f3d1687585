// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Strategies: trees of actions that flag and clean time-frequency data.
//!
//! A strategy is run by calling [`Action::perform`] on its root with an
//! [`ArtifactSet`]. Actions are performed depth first, left to right, and
//! every action sees the flags set by the actions before it. An error stops
//! the enclosing block; only [`Action::ForEachBaseline`] carries on after
//! errors, and only after errors that aren't usage errors (see
//! [`StrategyError::is_usage_error`]).

mod action;
mod artifacts;
mod baselines;
mod blocks;
mod default;
mod error;
mod leaves;
mod listener;
mod perform;

pub use action::{Action, ActionType, SetFlaggingMode, SetImageOperation, SumThresholdParams};
pub use artifacts::ArtifactSet;
pub use baselines::{BaselineData, BaselineSource, MemoryBaselineSet};
pub use default::{default_strategy, Strategy};
pub use error::{BaselineFailure, BaselineSourceError, StrategyError};
pub use listener::{NullListener, ProgressListener};

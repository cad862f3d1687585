// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Radio-frequency interference (RFI) detection and mitigation for
radio-astronomical visibilities.

The core of this crate is a tree of [`strategy::Action`]s that operate on an
[`strategy::ArtifactSet`]. Leaf actions either flag outliers with the
SumThreshold algorithm ([`threshold`]) or estimate a smooth background with one
of the [`surface_fit`] methods.
 */

mod cli;
pub mod constants;
pub mod data;
pub mod simulate;
pub mod strategy;
pub mod surface_fit;
pub mod threshold;

use crossbeam_utils::atomic::AtomicCell;

// Re-exports.
pub use cli::{Hyperflag, HyperflagError};
pub use data::{
    ComplexRepresentation, Image2D, Mask2D, Polarisation, TimeFrequencyData,
    TimeFrequencyMetadata,
};
pub use strategy::{default_strategy, Action, ArtifactSet, ProgressListener, Strategy};

/// Should progress bars be drawn? Only the driver turns this on.
pub static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sources of per-baseline data for [`Action::ForEachBaseline`].
//!
//! [`Action::ForEachBaseline`]: super::Action::ForEachBaseline

use std::sync::{Mutex, MutexGuard};

use super::BaselineSourceError;
use crate::data::{TimeFrequencyData, TimeFrequencyMetadata};

/// The data and metadata of one baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineData {
    pub data: TimeFrequencyData,
    pub metadata: TimeFrequencyMetadata,
}

/// Something that baselines can be read from and flags written to. Baselines
/// may be loaded and written from multiple threads at once, but each index is
/// only handled by one thread at a time.
pub trait BaselineSource: Send + Sync {
    fn num_baselines(&self) -> usize;

    fn load(&self, index: usize) -> Result<BaselineData, BaselineSourceError>;

    /// Store the flags of `flags` as the flags of the baseline. The images of
    /// `flags` are ignored.
    fn write_flags(
        &self,
        index: usize,
        flags: &TimeFrequencyData,
    ) -> Result<(), BaselineSourceError>;
}

/// Baselines held in memory.
#[derive(Debug, Default)]
pub struct MemoryBaselineSet {
    baselines: Vec<Mutex<BaselineData>>,
}

impl MemoryBaselineSet {
    pub fn new(baselines: Vec<BaselineData>) -> MemoryBaselineSet {
        MemoryBaselineSet {
            baselines: baselines.into_iter().map(Mutex::new).collect(),
        }
    }

    fn lock(&self, index: usize) -> Result<MutexGuard<BaselineData>, BaselineSourceError> {
        self.baselines
            .get(index)
            .ok_or(BaselineSourceError::Index {
                index,
                count: self.baselines.len(),
            })?
            .lock()
            .map_err(|_| BaselineSourceError::Poisoned(index))
    }
}

impl BaselineSource for MemoryBaselineSet {
    fn num_baselines(&self) -> usize {
        self.baselines.len()
    }

    fn load(&self, index: usize) -> Result<BaselineData, BaselineSourceError> {
        Ok(self.lock(index)?.clone())
    }

    fn write_flags(
        &self,
        index: usize,
        flags: &TimeFrequencyData,
    ) -> Result<(), BaselineSourceError> {
        self.lock(index)?
            .data
            .set_masks_from(flags)
            .map_err(|source| BaselineSourceError::Flags { index, source })
    }
}

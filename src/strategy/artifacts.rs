// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use super::BaselineSource;
use crate::{
    data::{MetadataError, TimeFrequencyData, TimeFrequencyMetadata},
    surface_fit::FftPlanLock,
};

/// The state that actions work on.
///
/// * `original` is the data as it was given, and never changes;
/// * `contaminated` is the working copy. Its images are progressively
///   cleaned of the background, and its flags accumulate;
/// * `revised` is the most recent background estimate.
pub struct ArtifactSet {
    pub(super) original: Arc<TimeFrequencyData>,
    pub contaminated: TimeFrequencyData,
    pub revised: TimeFrequencyData,
    pub(super) metadata: Option<Arc<TimeFrequencyMetadata>>,
    /// Multiplies every threshold. 1 at the root of a strategy.
    pub sensitivity: f64,
    pub(super) fft_lock: FftPlanLock,
    pub(super) baselines: Option<Arc<dyn BaselineSource>>,
}

impl ArtifactSet {
    /// Start from `original`: the contaminated data is a copy of it, and the
    /// background is zero.
    pub fn new(original: TimeFrequencyData) -> ArtifactSet {
        ArtifactSet {
            contaminated: original.clone(),
            revised: original.zeros_like(),
            original: Arc::new(original),
            metadata: None,
            sensitivity: 1.0,
            fft_lock: FftPlanLock::new(),
            baselines: None,
        }
    }

    /// An artifact set whose data comes from `baselines`, for strategies that
    /// start with [`Action::ForEachBaseline`](super::Action::ForEachBaseline).
    /// Its own data is empty.
    pub fn from_baselines(baselines: Arc<dyn BaselineSource>) -> ArtifactSet {
        ArtifactSet::new(TimeFrequencyData::empty()).with_baselines(baselines)
    }

    pub fn with_metadata(mut self, metadata: TimeFrequencyMetadata) -> ArtifactSet {
        self.metadata = Some(Arc::new(metadata));
        self
    }

    pub fn with_baselines(mut self, baselines: Arc<dyn BaselineSource>) -> ArtifactSet {
        self.baselines = Some(baselines);
        self
    }

    pub fn original(&self) -> &TimeFrequencyData {
        &self.original
    }

    pub fn metadata(&self) -> Option<&TimeFrequencyMetadata> {
        self.metadata.as_deref()
    }

    pub fn require_metadata(&self) -> Result<&TimeFrequencyMetadata, MetadataError> {
        self.metadata().ok_or(MetadataError::Missing("observation metadata"))
    }

    pub fn fft_lock(&self) -> &FftPlanLock {
        &self.fft_lock
    }

    pub fn baselines(&self) -> Option<&Arc<dyn BaselineSource>> {
        self.baselines.as_ref()
    }

    /// A new artifact set for one iteration of a block. It shares the
    /// metadata, FFT plan lock, baselines and sensitivity of `self`, but owns
    /// its data.
    pub fn local_copy(
        &self,
        original: TimeFrequencyData,
        contaminated: TimeFrequencyData,
        revised: TimeFrequencyData,
    ) -> ArtifactSet {
        ArtifactSet {
            original: Arc::new(original),
            contaminated,
            revised,
            metadata: self.metadata.clone(),
            sensitivity: self.sensitivity,
            fft_lock: self.fft_lock.clone(),
            baselines: self.baselines.clone(),
        }
    }

    /// A copy of this artifact set that shares the original data.
    pub fn duplicate(&self) -> ArtifactSet {
        ArtifactSet {
            original: Arc::clone(&self.original),
            contaminated: self.contaminated.clone(),
            revised: self.revised.clone(),
            metadata: self.metadata.clone(),
            sensitivity: self.sensitivity,
            fft_lock: self.fft_lock.clone(),
            baselines: self.baselines.clone(),
        }
    }

    pub(super) fn replace_metadata(&mut self, metadata: Option<TimeFrequencyMetadata>) {
        self.metadata = metadata.map(Arc::new);
    }
}

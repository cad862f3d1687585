// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Read-only observation metadata for a single baseline.

use hifitime::{Duration, Epoch};
use marlu::{RADec, XyzGeodetic};

use super::MetadataError;

#[derive(Debug, Clone, PartialEq)]
pub struct Antenna {
    pub name: String,
    pub position: XyzGeodetic,
}

/// Everything known about the observation a grid was taken from. All fields
/// are optional; actions that need a field ask for it through an accessor,
/// which returns [`MetadataError::Missing`] if it wasn't supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeFrequencyMetadata {
    /// The centre frequency of every channel \[Hz\].
    pub channel_freqs: Option<Vec<f64>>,
    pub timestamps: Option<Vec<Epoch>>,
    pub antenna1: Option<Antenna>,
    pub antenna2: Option<Antenna>,
    pub phase_centre: Option<RADec>,
    /// \[radians\]
    pub array_longitude_rad: Option<f64>,
    /// UT1 - UTC. Zero if unknown.
    pub dut1: Duration,
}

impl TimeFrequencyMetadata {
    pub fn channel_freqs(&self) -> Result<&[f64], MetadataError> {
        self.channel_freqs
            .as_deref()
            .ok_or(MetadataError::Missing("channel frequencies"))
    }

    pub fn timestamps(&self) -> Result<&[Epoch], MetadataError> {
        self.timestamps
            .as_deref()
            .ok_or(MetadataError::Missing("timestamps"))
    }

    /// Both antennas of the baseline.
    pub fn antennas(&self) -> Result<(&Antenna, &Antenna), MetadataError> {
        match (&self.antenna1, &self.antenna2) {
            (Some(a1), Some(a2)) => Ok((a1, a2)),
            _ => Err(MetadataError::Missing("antenna pair")),
        }
    }

    pub fn phase_centre(&self) -> Result<RADec, MetadataError> {
        self.phase_centre
            .ok_or(MetadataError::Missing("phase centre"))
    }

    pub fn array_longitude_rad(&self) -> Result<f64, MetadataError> {
        self.array_longitude_rad
            .ok_or(MetadataError::Missing("array longitude"))
    }

    /// Check that the band and timestamps (if present) agree with a grid of
    /// the given size.
    pub fn check_consistent(&self, width: usize, height: usize) -> Result<(), MetadataError> {
        if let Some(freqs) = &self.channel_freqs {
            if freqs.len() != height {
                return Err(MetadataError::Inconsistent {
                    what: "channels",
                    expected: height,
                    found: freqs.len(),
                });
            }
        }
        if let Some(timestamps) = &self.timestamps {
            if timestamps.len() != width {
                return Err(MetadataError::Inconsistent {
                    what: "timesteps",
                    expected: width,
                    found: timestamps.len(),
                });
            }
        }
        Ok(())
    }

    /// A label for the baseline, e.g. "Tile011 x Tile012".
    pub fn baseline_description(&self) -> Option<String> {
        let (a1, a2) = self.antennas().ok()?;
        Some(format!("{} x {}", a1.name, a2.name))
    }

    /// The metadata of data averaged by
    /// [`TimeFrequencyData::downsample`](super::TimeFrequencyData::downsample).
    /// Each block of timestamps and channel frequencies is replaced by its
    /// centre.
    pub fn downsampled(
        &self,
        time_factor: usize,
        frequency_factor: usize,
    ) -> TimeFrequencyMetadata {
        let (time_factor, frequency_factor) = (time_factor.max(1), frequency_factor.max(1));
        TimeFrequencyMetadata {
            channel_freqs: self.channel_freqs.as_ref().map(|freqs| {
                freqs
                    .chunks(frequency_factor)
                    .map(|c| c.iter().sum::<f64>() / c.len() as f64)
                    .collect()
            }),
            timestamps: self.timestamps.as_ref().map(|timestamps| {
                timestamps
                    .chunks(time_factor)
                    .map(|c| c[0] + (c[c.len() - 1] - c[0]) * 0.5)
                    .collect()
            }),
            ..self.clone()
        }
    }
}

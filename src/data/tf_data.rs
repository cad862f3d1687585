// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time-frequency data of one or more polarisations, together with flags.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use super::{GridError, Image2D, Mask2D};

/// How the samples of each polarisation are represented.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComplexRepresentation {
    /// Two images (real and imaginary) per polarisation.
    Complex,
    Amplitude,
    Phase,
    Real,
    Imaginary,
}

impl ComplexRepresentation {
    pub fn images_per_polarisation(self) -> usize {
        match self {
            ComplexRepresentation::Complex => 2,
            _ => 1,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[allow(clippy::upper_case_acronyms)]
pub enum Polarisation {
    XX,
    XY,
    YX,
    YY,
    I,
    Q,
    U,
    V,
}

/// The images belonging to a single polarisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarisedImages {
    pub polarisation: Polarisation,
    images: Vec<Image2D>,
}

/// How flags are attached to time-frequency data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskLayout {
    /// No flags have been attached; nothing is flagged.
    Unset,
    /// One mask applies to every polarisation.
    Shared(Mask2D),
    /// One mask per polarisation.
    PerPolarisation(Vec<Mask2D>),
}

/// One or more polarisations of time-frequency data and their flags.
///
/// The number of images per polarisation is determined by the
/// [`ComplexRepresentation`], and every image and mask has the same
/// dimensions. These invariants are checked whenever the data is constructed
/// or deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedTimeFrequencyData")]
pub struct TimeFrequencyData {
    representation: ComplexRepresentation,
    polarisations: Vec1<PolarisedImages>,
    masks: MaskLayout,
}

#[derive(Deserialize)]
struct UncheckedTimeFrequencyData {
    representation: ComplexRepresentation,
    polarisations: Vec<PolarisedImages>,
    masks: MaskLayout,
}

impl TryFrom<UncheckedTimeFrequencyData> for TimeFrequencyData {
    type Error = GridError;

    fn try_from(unchecked: UncheckedTimeFrequencyData) -> Result<Self, Self::Error> {
        let mut data = TimeFrequencyData::new(
            unchecked.representation,
            unchecked
                .polarisations
                .into_iter()
                .map(|p| (p.polarisation, p.images))
                .collect(),
        )?;
        match unchecked.masks {
            MaskLayout::Unset => (),
            MaskLayout::Shared(mask) => data.set_global_mask(mask)?,
            MaskLayout::PerPolarisation(masks) => {
                if masks.len() != data.polarisation_count() {
                    return Err(GridError::MaskCount {
                        expected: data.polarisation_count(),
                        found: masks.len(),
                    });
                }
                for (i_pol, mask) in masks.into_iter().enumerate() {
                    data.set_polarisation_mask(i_pol, mask)?;
                }
            }
        }
        Ok(data)
    }
}

impl TimeFrequencyData {
    /// Make new time-frequency data without flags. Each polarisation must
    /// have the number of images demanded by `representation`.
    pub fn new(
        representation: ComplexRepresentation,
        polarisations: Vec<(Polarisation, Vec<Image2D>)>,
    ) -> Result<TimeFrequencyData, GridError> {
        let polarisations = Vec1::try_from_vec(
            polarisations
                .into_iter()
                .map(|(polarisation, images)| PolarisedImages {
                    polarisation,
                    images,
                })
                .collect(),
        )
        .map_err(|_| GridError::NoPolarisations)?;

        let expected = representation.images_per_polarisation();
        let first_image = &polarisations.first().images;
        if first_image.len() != expected {
            return Err(GridError::ImageCount {
                representation,
                expected,
                found: first_image.len(),
            });
        }
        let reference = &first_image[0];
        for pol in polarisations.iter() {
            if pol.images.len() != expected {
                return Err(GridError::ImageCount {
                    representation,
                    expected,
                    found: pol.images.len(),
                });
            }
            for image in &pol.images {
                reference.check_same_shape(image)?;
            }
        }

        Ok(TimeFrequencyData {
            representation,
            polarisations,
            masks: MaskLayout::Unset,
        })
    }

    /// Amplitudes of a single polarisation with no samples.
    pub fn empty() -> TimeFrequencyData {
        TimeFrequencyData {
            representation: ComplexRepresentation::Amplitude,
            polarisations: Vec1::new(PolarisedImages {
                polarisation: Polarisation::XX,
                images: vec![Image2D::zeros(0, 0)],
            }),
            masks: MaskLayout::Unset,
        }
    }

    /// Complex data of a single polarisation.
    pub fn from_complex(
        polarisation: Polarisation,
        real: Image2D,
        imaginary: Image2D,
    ) -> Result<TimeFrequencyData, GridError> {
        Self::new(
            ComplexRepresentation::Complex,
            vec![(polarisation, vec![real, imaginary])],
        )
    }

    /// Non-complex data of a single polarisation.
    pub fn from_single(
        representation: ComplexRepresentation,
        polarisation: Polarisation,
        image: Image2D,
    ) -> Result<TimeFrequencyData, GridError> {
        Self::new(representation, vec![(polarisation, vec![image])])
    }

    pub fn representation(&self) -> ComplexRepresentation {
        self.representation
    }

    pub fn is_complex(&self) -> bool {
        self.representation == ComplexRepresentation::Complex
    }

    /// Fail with a usage error if this data isn't complex.
    pub fn require_complex(&self, operation: &'static str) -> Result<(), GridError> {
        if !self.is_complex() {
            return Err(GridError::Representation {
                operation,
                expected: ComplexRepresentation::Complex,
                found: self.representation,
            });
        }
        Ok(())
    }

    pub fn polarisation_count(&self) -> usize {
        self.polarisations.len()
    }

    pub fn polarisations(&self) -> Vec<Polarisation> {
        self.polarisations.iter().map(|p| p.polarisation).collect()
    }

    pub fn width(&self) -> usize {
        self.polarisations.first().images[0].width()
    }

    pub fn height(&self) -> usize {
        self.polarisations.first().images[0].height()
    }

    pub fn image_count(&self) -> usize {
        self.polarisation_count() * self.representation.images_per_polarisation()
    }

    /// Images are counted polarisation by polarisation; for complex data the
    /// real image of a polarisation comes before its imaginary image.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than [`Self::image_count`].
    pub fn image(&self, index: usize) -> &Image2D {
        let ipp = self.representation.images_per_polarisation();
        &self.polarisations[index / ipp].images[index % ipp]
    }

    pub fn image_mut(&mut self, index: usize) -> &mut Image2D {
        let ipp = self.representation.images_per_polarisation();
        &mut self.polarisations[index / ipp].images[index % ipp]
    }

    pub fn images(&self) -> impl Iterator<Item = &Image2D> {
        self.polarisations.iter().flat_map(|p| p.images.iter())
    }

    pub fn images_mut(&mut self) -> impl Iterator<Item = &mut Image2D> {
        self.polarisations
            .iter_mut()
            .flat_map(|p| p.images.iter_mut())
    }

    /// The images of a single polarisation.
    pub fn polarisation_images(&self, i_pol: usize) -> &[Image2D] {
        &self.polarisations[i_pol].images
    }

    /// The polarisation index that an image index belongs to.
    pub fn polarisation_of_image(&self, index: usize) -> usize {
        index / self.representation.images_per_polarisation()
    }

    /// The only image in this data. Only non-complex data of a single
    /// polarisation has a single image.
    pub fn get_single_image(&self) -> Result<&Image2D, GridError> {
        match self.image_count() {
            1 => Ok(self.image(0)),
            n => Err(GridError::NotSingleImage(n)),
        }
    }

    pub fn mask_layout(&self) -> &MaskLayout {
        &self.masks
    }

    pub fn mask_count(&self) -> usize {
        match &self.masks {
            MaskLayout::Unset => 0,
            MaskLayout::Shared(_) => 1,
            MaskLayout::PerPolarisation(m) => m.len(),
        }
    }

    /// The flags that apply to a polarisation. If no flags have been attached,
    /// an unflagged mask is returned.
    pub fn mask_for_polarisation(&self, i_pol: usize) -> Mask2D {
        match &self.masks {
            MaskLayout::Unset => Mask2D::unflagged(self.width(), self.height()),
            MaskLayout::Shared(m) => m.clone(),
            MaskLayout::PerPolarisation(m) => m[i_pol].clone(),
        }
    }

    pub fn mask_for_image(&self, index: usize) -> Mask2D {
        self.mask_for_polarisation(self.polarisation_of_image(index))
    }

    /// All flags combined into a single mask; a sample is flagged if it is
    /// flagged in any polarisation.
    pub fn get_single_mask(&self) -> Mask2D {
        match &self.masks {
            MaskLayout::Unset => Mask2D::unflagged(self.width(), self.height()),
            MaskLayout::Shared(m) => m.clone(),
            MaskLayout::PerPolarisation(masks) => {
                let mut combined = masks[0].clone();
                // All masks have the same shape by construction.
                for m in &masks[1..] {
                    combined
                        .view_mut()
                        .zip_mut_with(&m.view(), |ours, &theirs| *ours |= theirs);
                }
                combined
            }
        }
    }

    /// Use one mask for all polarisations.
    pub fn set_global_mask(&mut self, mask: Mask2D) -> Result<(), GridError> {
        mask.check_same_shape(self.width(), self.height())?;
        self.masks = MaskLayout::Shared(mask);
        Ok(())
    }

    /// Set the mask of one polarisation. If the data currently has a shared
    /// mask, the other polarisations keep a copy of it.
    pub fn set_polarisation_mask(&mut self, i_pol: usize, mask: Mask2D) -> Result<(), GridError> {
        let count = self.polarisation_count();
        if i_pol >= count {
            return Err(GridError::PolarisationIndex {
                index: i_pol,
                count,
            });
        }
        mask.check_same_shape(self.width(), self.height())?;
        if count == 1 {
            self.masks = MaskLayout::Shared(mask);
            return Ok(());
        }
        self.split_masks();
        if let MaskLayout::PerPolarisation(masks) = &mut self.masks {
            masks[i_pol] = mask;
        }
        Ok(())
    }

    /// Remove all flags.
    pub fn set_no_mask(&mut self) {
        self.masks = MaskLayout::Unset;
    }

    /// Convert the mask layout into one mask per polarisation.
    fn split_masks(&mut self) {
        let count = self.polarisation_count();
        let (width, height) = (self.width(), self.height());
        self.masks = match std::mem::replace(&mut self.masks, MaskLayout::Unset) {
            MaskLayout::Unset => {
                MaskLayout::PerPolarisation(vec![Mask2D::unflagged(width, height); count])
            }
            MaskLayout::Shared(m) => MaskLayout::PerPolarisation(vec![m; count]),
            per_pol @ MaskLayout::PerPolarisation(_) => per_pol,
        };
    }

    /// Apply a function to every mask. If no mask is attached, an unflagged
    /// shared mask is attached first.
    pub fn for_each_mask_mut<F: FnMut(&mut Mask2D)>(&mut self, mut f: F) {
        if let MaskLayout::Unset = self.masks {
            self.masks = MaskLayout::Shared(Mask2D::unflagged(self.width(), self.height()));
        }
        match &mut self.masks {
            MaskLayout::Unset => unreachable!(),
            MaskLayout::Shared(m) => f(m),
            MaskLayout::PerPolarisation(masks) => masks.iter_mut().for_each(f),
        }
    }

    /// Flag everything that is flagged in `other`. Nothing is unflagged.
    ///
    /// `other` must have either the same number of polarisations or a single
    /// mask.
    pub fn join_mask(&mut self, other: &TimeFrequencyData) -> Result<(), GridError> {
        if other.width() != self.width() || other.height() != self.height() {
            return Err(GridError::DimensionMismatch {
                expected_width: self.width(),
                expected_height: self.height(),
                found_width: other.width(),
                found_height: other.height(),
            });
        }
        match &other.masks {
            MaskLayout::Unset => Ok(()),
            MaskLayout::Shared(theirs) => {
                let mut result = Ok(());
                self.for_each_mask_mut(|ours| {
                    if result.is_ok() {
                        result = ours.union_with(theirs);
                    }
                });
                result
            }
            MaskLayout::PerPolarisation(theirs) => {
                if theirs.len() != self.polarisation_count() {
                    return Err(GridError::PolarisationCountMismatch(
                        self.polarisation_count(),
                        theirs.len(),
                    ));
                }
                self.split_masks();
                if let MaskLayout::PerPolarisation(ours) = &mut self.masks {
                    for (ours, theirs) in ours.iter_mut().zip(theirs) {
                        ours.union_with(theirs)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Replace the flags with those of `other`, which must have the same
    /// dimensions and either a compatible number of polarisations or a single
    /// mask. Nothing changes if `other` doesn't fit.
    pub fn set_masks_from(&mut self, other: &TimeFrequencyData) -> Result<(), GridError> {
        if other.width() != self.width() || other.height() != self.height() {
            return Err(GridError::DimensionMismatch {
                expected_width: self.width(),
                expected_height: self.height(),
                found_width: other.width(),
                found_height: other.height(),
            });
        }
        if let MaskLayout::PerPolarisation(theirs) = &other.masks {
            if theirs.len() != self.polarisation_count() {
                return Err(GridError::PolarisationCountMismatch(
                    self.polarisation_count(),
                    theirs.len(),
                ));
            }
        }
        self.masks = other.masks.clone();
        Ok(())
    }

    /// Convert this data into another representation. Anything other than a
    /// no-op conversion requires complex data.
    pub fn make(
        &self,
        representation: ComplexRepresentation,
    ) -> Result<TimeFrequencyData, GridError> {
        if representation == self.representation {
            return Ok(self.clone());
        }
        self.require_complex("Converting the complex representation")?;

        let polarisations = self
            .polarisations
            .iter()
            .map(|p| {
                let (re, im) = (p.images[0].view(), p.images[1].view());
                let image = match representation {
                    ComplexRepresentation::Amplitude => {
                        ndarray::Zip::from(&re).and(&im).map_collect(|&r, &i| r.hypot(i))
                    }
                    ComplexRepresentation::Phase => {
                        ndarray::Zip::from(&re).and(&im).map_collect(|&r, &i| i.atan2(r))
                    }
                    ComplexRepresentation::Real => re.to_owned(),
                    ComplexRepresentation::Imaginary => im.to_owned(),
                    ComplexRepresentation::Complex => unreachable!(),
                };
                (p.polarisation, vec![Image2D::from_array(image)])
            })
            .collect();
        let mut converted = TimeFrequencyData::new(representation, polarisations)?;
        converted.masks = self.masks.clone();
        Ok(converted)
    }

    /// The data of a single polarisation, including its flags.
    pub fn polarisation_data(&self, i_pol: usize) -> Result<TimeFrequencyData, GridError> {
        let count = self.polarisation_count();
        let pol = self
            .polarisations
            .get(i_pol)
            .ok_or(GridError::PolarisationIndex {
                index: i_pol,
                count,
            })?;
        let masks = match &self.masks {
            MaskLayout::Unset => MaskLayout::Unset,
            MaskLayout::Shared(m) => MaskLayout::Shared(m.clone()),
            MaskLayout::PerPolarisation(m) => MaskLayout::Shared(m[i_pol].clone()),
        };
        Ok(TimeFrequencyData {
            representation: self.representation,
            polarisations: Vec1::new(pol.clone()),
            masks,
        })
    }

    /// Replace the images and flags of a single polarisation with those of
    /// single-polarisation `data`.
    pub fn set_polarisation_data(
        &mut self,
        i_pol: usize,
        data: TimeFrequencyData,
    ) -> Result<(), GridError> {
        if data.polarisation_count() != 1 {
            return Err(GridError::PolarisationCountMismatch(
                1,
                data.polarisation_count(),
            ));
        }
        if data.representation != self.representation {
            return Err(GridError::RepresentationMismatch(
                self.representation,
                data.representation,
            ));
        }
        let mask = data.get_single_mask();
        let had_flags = data.mask_count() > 0;
        let PolarisedImages { images, .. } = data.polarisations.into_vec().remove(0);
        for image in &images {
            self.image(0).check_same_shape(image)?;
        }
        let count = self.polarisation_count();
        self.polarisations
            .get_mut(i_pol)
            .ok_or(GridError::PolarisationIndex {
                index: i_pol,
                count,
            })?
            .images = images;
        if had_flags || self.mask_count() > 0 {
            self.set_polarisation_mask(i_pol, mask)?;
        }
        Ok(())
    }

    fn check_compatible(&self, other: &TimeFrequencyData) -> Result<(), GridError> {
        if self.representation != other.representation {
            return Err(GridError::RepresentationMismatch(
                self.representation,
                other.representation,
            ));
        }
        if self.polarisation_count() != other.polarisation_count() {
            return Err(GridError::PolarisationCountMismatch(
                self.polarisation_count(),
                other.polarisation_count(),
            ));
        }
        self.image(0).check_same_shape(other.image(0))
    }

    /// `self - other`, image by image. The flags of `self` are kept.
    pub fn subtract(&self, other: &TimeFrequencyData) -> Result<TimeFrequencyData, GridError> {
        self.check_compatible(other)?;
        let mut result = self.clone();
        for (ours, theirs) in result.images_mut().zip(other.images()) {
            *ours = ours.subtract(theirs)?;
        }
        Ok(result)
    }

    /// Overwrite the images with those of `other`, keeping the flags of `self`.
    pub fn set_images_from(&mut self, other: &TimeFrequencyData) -> Result<(), GridError> {
        self.check_compatible(other)?;
        for (ours, theirs) in self.images_mut().zip(other.images()) {
            ours.assign(theirs)?;
        }
        Ok(())
    }

    /// Data of the same shape and representation with all samples zero and no
    /// flags.
    pub fn zeros_like(&self) -> TimeFrequencyData {
        let (width, height) = (self.width(), self.height());
        let polarisations = self.polarisations.mapped_ref(|p| PolarisedImages {
            polarisation: p.polarisation,
            images: vec![Image2D::zeros(width, height); p.images.len()],
        });
        TimeFrequencyData {
            representation: self.representation,
            polarisations,
            masks: MaskLayout::Unset,
        }
    }

    /// Make data with the same representation, polarisations and flags as
    /// `self` but different images, e.g. a fitted background.
    pub fn with_images_replaced(
        &self,
        images: Vec<Image2D>,
    ) -> Result<TimeFrequencyData, GridError> {
        if images.len() != self.image_count() {
            return Err(GridError::ImageCount {
                representation: self.representation,
                expected: self.image_count(),
                found: images.len(),
            });
        }
        let ipp = self.representation.images_per_polarisation();
        let mut images = images.into_iter();
        let polarisations = self
            .polarisations
            .iter()
            .map(|p| (p.polarisation, images.by_ref().take(ipp).collect()))
            .collect();
        let mut data = TimeFrequencyData::new(self.representation, polarisations)?;
        data.masks = self.masks.clone();
        Ok(data)
    }

    pub fn all_finite(&self) -> bool {
        self.images().all(|i| i.all_finite())
    }
}

use crate::{Real, error::ConfigError};
use ucn_common::Microseconds;

/// Calibrated parameters of the single-pulse timing response: a mixture of
/// three exponential decays starting at `location`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseParameters {
    /// Relative weight of each component, need not be normalised.
    pub ratios: [Real; 3],
    /// Decay scale of each component.
    pub scales: [Microseconds; 3],
    pub location: Microseconds,
}

impl Default for ResponseParameters {
    fn default() -> Self {
        Self {
            ratios: [1.09453333e+03, 5.32077446e+03, 9.93074362e+03],
            scales: [3.65357381e-01, 2.77520732e+00, 2.30165740e+01],
            location: -4.84253484e-03,
        }
    }
}

impl ResponseParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(&scale) = self.scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(ConfigError::NotPositive {
                name: "response scale",
                value: scale,
            });
        }
        if self.ratios.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
            return Err(ConfigError::InvalidRatios(self.ratios));
        }
        let total: Real = self.ratios.iter().sum();
        if total <= 0.0 {
            return Err(ConfigError::InvalidRatios(self.ratios));
        }
        if !self.location.is_finite() {
            return Err(ConfigError::NotFinite {
                name: "response location",
                value: self.location,
            });
        }
        Ok(())
    }
}

/// The tri-exponential response with its mixture weights normalised.
#[derive(Clone, Debug)]
pub struct ResponseModel {
    weights: [Real; 3],
    scales: [Microseconds; 3],
    location: Microseconds,
}

impl ResponseModel {
    pub fn new(parameters: &ResponseParameters) -> Self {
        let total: Real = parameters.ratios.iter().sum();
        Self {
            weights: parameters.ratios.map(|ratio| ratio / total),
            scales: parameters.scales,
            location: parameters.location,
        }
    }

    pub fn weights(&self) -> &[Real; 3] {
        &self.weights
    }

    pub fn scales(&self) -> &[Microseconds; 3] {
        &self.scales
    }

    pub fn location(&self) -> Microseconds {
        self.location
    }

    /// Unnormalised density at offset `t`, zero before the location.
    pub fn density(&self, t: Microseconds) -> Real {
        if t < self.location {
            return 0.0;
        }
        let dt = t - self.location;
        self.weights
            .iter()
            .zip(&self.scales)
            .map(|(weight, scale)| weight * (-dt / scale).exp() / scale)
            .sum()
    }

    /// Evaluates the density at each offset and normalises the values to sum
    /// to one over exactly these offsets. The result is the discrete
    /// response over a histogram's finite support, not a sampled continuous
    /// pdf. If every offset precedes the location the zeros are returned
    /// unnormalised.
    pub fn discretise(&self, offsets: &[Microseconds]) -> Vec<Real> {
        let mut values: Vec<Real> = offsets.iter().map(|&t| self.density(t)).collect();
        let sum: Real = values.iter().sum();
        if sum > 0.0 {
            values.iter_mut().for_each(|v| *v /= sum);
        }
        values
    }

    /// The discretised response of a pulse starting `shift` bins later.
    pub fn discretise_shifted(&self, offsets: &[Microseconds], shift: usize) -> Vec<Real> {
        shift_right(&self.discretise(offsets), shift)
    }
}

/// Moves `values` right by `shift` bins, filling the vacated bins with zero
/// and dropping whatever falls off the end.
pub fn shift_right(values: &[Real], shift: usize) -> Vec<Real> {
    let mut shifted = vec![0.0; values.len()];
    if let Some(tail) = shifted.get_mut(shift..) {
        tail.copy_from_slice(&values[..tail.len()]);
    }
    shifted
}

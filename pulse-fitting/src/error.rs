use crate::{Real, histogram::HistogramError};
use thiserror::Error;

/// Reasons a single window yields no pulses. None of these abort a scan.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    #[error("No seed candidates")]
    NoSeeds,
    #[error("Optimiser failed: {0}")]
    Optimiser(String),
    #[error("Optimiser returned no best parameters")]
    NoBestParameters,
    #[error("Parameter and bounds length mismatch: {parameters} != {bounds}")]
    DimensionMismatch { parameters: usize, bounds: usize },
    #[error("All fitted amplitudes below {threshold}")]
    AllPruned { threshold: Real },
}

impl From<argmin::core::Error> for FitError {
    fn from(e: argmin::core::Error) -> Self {
        Self::Optimiser(e.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: Real },
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: Real },
    #[error("Response ratios must be non-negative with a positive sum, got {0:?}")]
    InvalidRatios([Real; 3]),
    #[error("Fine bin width {fine} is not finer than bin width {primary}")]
    FineBinWidth { primary: Real, fine: Real },
    #[error("Amplitude bounds [{lower}, {upper}] are empty")]
    AmplitudeBounds { lower: Real, upper: Real },
}

//! This crate resolves overlapping photomultiplier pulses from a sparse
//! stream of photoelectron (PE) hit times.
//!
//! Hits are carved into bursts separated by quiet gaps, each burst is
//! histogrammed, and the histogram is modelled as a sum of shifted copies of
//! a calibrated single-pulse response. Amplitudes and offsets are found by
//! minimising a Poisson negative log-likelihood. Typical usage may look like:
//! ```rust
//! use ucn_pulse_fitting::{AnalysisWindows, FitterConfig, PulseFitter, RegionBounds};
//!
//! let config = FitterConfig::default();      // calibrated response, 1us bins, 10us gaps
//! let hits = Vec::new();                     // hits of one detector segment
//! let windows = AnalysisWindows {
//!     signal: RegionBounds::new(100e6, 160e6),
//!     background_start: Some(210e6),
//! };
//! let result = PulseFitter::new(&config).analyse(&hits, &windows);
//! assert!(result.signal.pulses.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod fitter;
pub mod histogram;
pub mod hit;
pub mod likelihood;
pub mod lookup;
pub mod optimizer;
pub mod response;
pub mod seeder;
pub mod simplex;
pub mod window;

pub use config::{FitterConfig, FitterSettings};
pub use error::{ConfigError, FitError};
pub use fitter::{
    AnalysisWindows, FitResult, Pulse, PulseFitter, RegionBounds, RegionFit, WindowStatistics,
};
pub use hit::Hit;
pub use response::{ResponseModel, ResponseParameters};

pub type Real = f64;

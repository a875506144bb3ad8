use crate::loader::RunHits;
use rand::Rng;
use rand_distr::{Distribution, Exp, ExpError, Normal, NormalError, Poisson, PoissonError};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::debug;
use ucn_common::{MICROSECONDS_PER_SECOND, Seconds, Segment};
use ucn_pulse_fitting::{Hit, ResponseModel};

#[derive(Debug, Error)]
pub(crate) enum SimulationError {
    #[error("Invalid rate: {0}")]
    Rate(#[from] ExpError),
    #[error("Invalid amplitude distribution: {0}")]
    Amplitude(#[from] NormalError),
    #[error("Invalid dark count rate: {0}")]
    DarkRate(#[from] PoissonError),
}

#[derive(Clone, Debug)]
pub(crate) struct SimulationConfig {
    pub(crate) duration: Seconds,
    /// Mean pulses per second in each segment.
    pub(crate) pulse_rate: f64,
    pub(crate) amplitude_mean: f64,
    pub(crate) amplitude_sd: f64,
    /// Mean uncorrelated hits per second in each segment.
    pub(crate) dark_rate: f64,
}

/// A pulse as generated, before any detector effects.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TruePulse {
    pub(crate) segment: Segment,
    pub(crate) time: Seconds,
    pub(crate) photoelectrons: u32,
}

/// Draws photoelectron delays from the tri-exponential response.
struct ResponseSampler {
    cumulative_weights: [f64; 3],
    decays: [Exp<f64>; 3],
    location: f64,
}

impl ResponseSampler {
    fn new(model: &ResponseModel) -> Result<Self, SimulationError> {
        let mut total = 0.0;
        let cumulative_weights = model.weights().map(|weight| {
            total += weight;
            total
        });
        let [s0, s1, s2] = *model.scales();
        Ok(Self {
            cumulative_weights,
            decays: [Exp::new(1.0 / s0)?, Exp::new(1.0 / s1)?, Exp::new(1.0 / s2)?],
            location: model.location(),
        })
    }

    /// Delay after the pulse time, in microseconds.
    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let component = self
            .cumulative_weights
            .iter()
            .position(|&c| u < c)
            .unwrap_or(self.decays.len() - 1);
        self.location + self.decays[component].sample(rng)
    }
}

/// Generates the hits of one run: pulses arrive as a Poisson process, each
/// with a normally distributed number of photoelectrons spread according to
/// the response model, on top of uniformly distributed dark counts.
pub(crate) fn simulate<R: Rng>(
    rng: &mut R,
    config: &SimulationConfig,
    model: &ResponseModel,
) -> Result<(RunHits, Vec<TruePulse>), SimulationError> {
    let arrivals = Exp::new(config.pulse_rate)?;
    let amplitudes = Normal::new(config.amplitude_mean, config.amplitude_sd)?;
    let response = ResponseSampler::new(model)?;
    let expected_dark = config.dark_rate * config.duration;
    let dark_counts = (expected_dark > 0.0)
        .then(|| Poisson::new(expected_dark))
        .transpose()?;

    let mut hits = Vec::new();
    let mut pulses = Vec::new();
    for segment in Segment::iter() {
        let channels = segment.channels();

        let mut time = arrivals.sample(rng);
        while time < config.duration {
            let photoelectrons = amplitudes.sample(rng).round().max(1.0) as u32;
            for _ in 0..photoelectrons {
                let delay = response.sample(rng) / MICROSECONDS_PER_SECOND;
                let channel = channels[rng.random_range(0..channels.len())];
                hits.push(Hit::new(time + delay, channel));
            }
            pulses.push(TruePulse {
                segment,
                time,
                photoelectrons,
            });
            time += arrivals.sample(rng);
        }

        if let Some(dark_counts) = &dark_counts {
            let count = dark_counts.sample(rng) as usize;
            for _ in 0..count {
                let channel = channels[rng.random_range(0..channels.len())];
                hits.push(Hit::new(rng.random_range(0.0..config.duration), channel));
            }
        }
    }
    debug!("Simulated {} pulses, {} hits", pulses.len(), hits.len());
    Ok((RunHits::from_hits(hits), pulses))
}

use crate::{Real, lookup::ShiftMatrix};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::PI;

/// Added to every expectation so that empty bins never take the log of zero.
pub const EXPECTATION_FLOOR: Real = 1e-10;

/// `ln k!`, tabulated for small `k` with Stirling's approximation beyond.
#[derive(Clone, Debug)]
pub struct LogFactorialTable {
    table: Vec<Real>,
}

impl LogFactorialTable {
    pub const TABULATED: usize = 20;

    pub fn new() -> Self {
        Self {
            table: (0..Self::TABULATED)
                .map(|k| ln_gamma(k as Real + 1.0))
                .collect(),
        }
    }

    pub fn get(&self, k: u32) -> Real {
        match self.table.get(k as usize) {
            Some(&value) => value,
            None => {
                let k = Real::from(k);
                k * k.ln() - k + 0.5 * (2.0 * PI * k).ln()
            }
        }
    }
}

impl Default for LogFactorialTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Poisson log-likelihood of `observed` given `expected` counts per bin.
pub fn poisson_log_likelihood(
    observed: &[u32],
    expected: &[Real],
    log_factorials: &LogFactorialTable,
) -> Real {
    observed
        .iter()
        .zip(expected)
        .map(|(&k, &lambda)| {
            let lambda = lambda + EXPECTATION_FLOOR;
            Real::from(k) * lambda.ln() - lambda - log_factorials.get(k)
        })
        .sum()
}

/// Negative log-likelihood of a fixed histogram under a sum of shifted
/// responses. Parameters are the pulse amplitudes followed by their offsets
/// in bins.
#[derive(Clone, Copy)]
pub struct NegLogLikelihood<'a> {
    observed: &'a [u32],
    lookup: &'a ShiftMatrix,
    num_pulses: usize,
    log_factorials: &'a LogFactorialTable,
}

impl<'a> NegLogLikelihood<'a> {
    pub fn new(
        observed: &'a [u32],
        lookup: &'a ShiftMatrix,
        num_pulses: usize,
        log_factorials: &'a LogFactorialTable,
    ) -> Self {
        Self {
            observed,
            lookup,
            num_pulses,
            log_factorials,
        }
    }

    pub fn num_pulses(&self) -> usize {
        self.num_pulses
    }

    pub fn num_bins(&self) -> usize {
        self.observed.len()
    }

    /// Expected counts per bin. Offsets are truncated toward zero to pick the
    /// response row.
    pub fn expected(&self, params: &[Real]) -> Vec<Real> {
        let (amplitudes, offsets) = params.split_at(self.num_pulses.min(params.len()));
        let mut expected = vec![0.0; self.observed.len()];
        for (&amplitude, &offset) in amplitudes.iter().zip(offsets) {
            let row = self.lookup.row(offset.max(0.0) as usize);
            for (e, &p) in expected.iter_mut().zip(row) {
                *e += amplitude * p;
            }
        }
        expected
    }

    pub fn evaluate(&self, params: &[Real]) -> Real {
        -poisson_log_likelihood(self.observed, &self.expected(params), self.log_factorials)
    }
}

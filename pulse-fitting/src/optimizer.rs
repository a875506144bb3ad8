//! Bounded derivative-free minimisation of the pulse likelihood.
//!
//! The simplex searches an unbounded space, so the objective is evaluated at
//! the parameters clamped into their box and the reported minimum is clamped
//! the same way.

use crate::{
    Real,
    error::FitError,
    likelihood::{LogFactorialTable, NegLogLikelihood},
    lookup::ShiftMatrix,
    seeder::Seed,
    simplex::{BoundedNelderMead, SimplexState, clamp_params},
};
use argmin::core::{CostFunction, Executor, State};
use tracing::{debug, trace};

#[derive(Clone, Debug, PartialEq)]
pub struct OptimiserSettings {
    /// Box bounds on every pulse amplitude.
    pub amplitude_bounds: (Real, Real),
    /// Convergence once every simplex vertex agrees with the best one to
    /// within this fraction of each parameter.
    pub relative_tolerance: Real,
    /// Budget of likelihood evaluations per minimisation.
    pub max_evaluations: usize,
    /// Initial simplex step in amplitude, as a fraction of the bound range.
    pub amplitude_step_fraction: Real,
    /// Initial simplex step in offset, in bins.
    pub offset_step: Real,
    /// Fitted pulses below this amplitude are pruned.
    pub acceptance_threshold: Real,
}

impl Default for OptimiserSettings {
    fn default() -> Self {
        Self {
            amplitude_bounds: (1.0, 300.0),
            relative_tolerance: 1e-4,
            max_evaluations: 200,
            amplitude_step_fraction: 0.1,
            offset_step: 1.0,
            acceptance_threshold: 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FittedPulse {
    pub amplitude: Real,
    /// In bins from the window start.
    pub offset: Real,
}

impl FittedPulse {
    /// The lookup row the pulse is modelled with.
    pub fn shift(&self) -> usize {
        self.offset.max(0.0) as usize
    }
}

/// Outcome of one bounded minimisation.
#[derive(Clone, Debug)]
pub struct Minimum {
    pub parameters: Vec<Real>,
    pub cost: Real,
    pub iterations: u64,
    pub evaluations: usize,
}

impl Minimum {
    pub fn num_pulses(&self) -> usize {
        self.parameters.len() / 2
    }

    pub fn pulses(&self) -> Vec<FittedPulse> {
        let (amplitudes, offsets) = self.parameters.split_at(self.num_pulses());
        amplitudes
            .iter()
            .zip(offsets)
            .map(|(&amplitude, &offset)| FittedPulse { amplitude, offset })
            .collect()
    }
}

/// Accepted pulses and the minimisations that produced them.
#[derive(Clone, Debug)]
pub struct PulseFit {
    pub pulses: Vec<FittedPulse>,
    pub first_pass: Minimum,
    /// Present when pruning after the first pass removed pulses.
    pub refit: Option<Minimum>,
}

/// Combines pulses modelled by the same lookup row. Their expected counts are
/// indistinguishable, so the merged pulse carries the summed amplitude, capped
/// at `max_amplitude`, at the amplitude-weighted mean offset.
pub fn merge_coincident(pulses: &[FittedPulse], max_amplitude: Real) -> Vec<FittedPulse> {
    let mut merged: Vec<FittedPulse> = Vec::with_capacity(pulses.len());
    for pulse in pulses {
        match merged.iter_mut().find(|m| m.shift() == pulse.shift()) {
            Some(existing) => {
                let amplitude = existing.amplitude + pulse.amplitude;
                existing.offset =
                    (existing.amplitude * existing.offset + pulse.amplitude * pulse.offset)
                        / amplitude;
                existing.amplitude = amplitude.min(max_amplitude);
            }
            None => merged.push(*pulse),
        }
    }
    merged
}

struct BoundedObjective<'a> {
    objective: NegLogLikelihood<'a>,
    bounds: &'a [(Real, Real)],
}

impl CostFunction for BoundedObjective<'_> {
    type Param = Vec<Real>;
    type Output = Real;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.objective.evaluate(&clamp_params(params, self.bounds)))
    }
}

/// The starting point and one vertex per dimension, each displaced by its
/// step, downwards when upwards would leave the box.
fn initial_simplex(start: &[Real], bounds: &[(Real, Real)], steps: &[Real]) -> Vec<Vec<Real>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for (dim, (&step, &(lo, hi))) in steps.iter().zip(bounds).enumerate() {
        let mut vertex = start.to_vec();
        if let Some(value) = vertex.get_mut(dim) {
            *value = if *value + step <= hi {
                *value + step
            } else {
                (*value - step).max(lo)
            };
        }
        simplex.push(vertex);
    }
    simplex
}

pub struct PulseOptimiser<'a> {
    observed: &'a [u32],
    lookup: &'a ShiftMatrix,
    log_factorials: &'a LogFactorialTable,
    settings: &'a OptimiserSettings,
}

impl<'a> PulseOptimiser<'a> {
    pub fn new(
        observed: &'a [u32],
        lookup: &'a ShiftMatrix,
        log_factorials: &'a LogFactorialTable,
        settings: &'a OptimiserSettings,
    ) -> Self {
        Self {
            observed,
            lookup,
            log_factorials,
            settings,
        }
    }

    fn bounds(&self, num_pulses: usize) -> Vec<(Real, Real)> {
        let max_offset = self.observed.len().saturating_sub(1) as Real;
        std::iter::repeat_n(self.settings.amplitude_bounds, num_pulses)
            .chain(std::iter::repeat_n((0.0, max_offset), num_pulses))
            .collect()
    }

    fn steps(&self, num_pulses: usize) -> Vec<Real> {
        let (lo, hi) = self.settings.amplitude_bounds;
        std::iter::repeat_n(self.settings.amplitude_step_fraction * (hi - lo), num_pulses)
            .chain(std::iter::repeat_n(self.settings.offset_step, num_pulses))
            .collect()
    }

    /// Minimises the likelihood of `pulses` from the given starting point.
    pub fn minimise(&self, pulses: &[FittedPulse]) -> Result<Minimum, FitError> {
        let num_pulses = pulses.len();
        let start: Vec<Real> = pulses
            .iter()
            .map(|p| p.amplitude)
            .chain(pulses.iter().map(|p| p.offset))
            .collect();
        let bounds = self.bounds(num_pulses);
        if start.len() != bounds.len() {
            return Err(FitError::DimensionMismatch {
                parameters: start.len(),
                bounds: bounds.len(),
            });
        }
        let start = clamp_params(&start, &bounds);

        let problem = BoundedObjective {
            objective: NegLogLikelihood::new(
                self.observed,
                self.lookup,
                num_pulses,
                self.log_factorials,
            ),
            bounds: &bounds,
        };
        let solver = BoundedNelderMead::new(
            initial_simplex(&start, &bounds, &self.steps(num_pulses)),
            bounds.clone(),
        )
        .with_x_tolerance(self.settings.relative_tolerance)
        .with_max_evaluations(self.settings.max_evaluations);

        // Every iteration spends at least one evaluation.
        let max_iterations = self.settings.max_evaluations as u64;
        let result = Executor::new(problem, solver)
            .configure(|state: SimplexState| state.max_iters(max_iterations))
            .run()?;

        let state = result.state();
        let best = state.get_best_param().ok_or(FitError::NoBestParameters)?;
        let minimum = Minimum {
            parameters: clamp_params(best, &bounds),
            cost: state.get_best_cost(),
            iterations: state.get_iter(),
            evaluations: result.solver.evaluations(),
        };
        trace!(
            num_pulses,
            cost = minimum.cost,
            iterations = minimum.iterations,
            evaluations = minimum.evaluations,
            "Minimised"
        );
        Ok(minimum)
    }

    /// Merges coincident pulses, then drops those below the acceptance
    /// threshold.
    fn accepted(&self, minimum: &Minimum) -> (usize, Vec<FittedPulse>) {
        let merged = merge_coincident(&minimum.pulses(), self.settings.amplitude_bounds.1);
        let num_merged = merged.len();
        let accepted = merged
            .into_iter()
            .filter(|p| p.amplitude >= self.settings.acceptance_threshold)
            .collect();
        (num_merged, accepted)
    }

    /// Fits from the seeds, then prunes pulses below the acceptance threshold.
    /// If any were pruned the survivors are refitted once and pruned again.
    pub fn fit(&self, seeds: &[Seed]) -> Result<PulseFit, FitError> {
        if seeds.is_empty() {
            return Err(FitError::NoSeeds);
        }
        let all_pruned = FitError::AllPruned {
            threshold: self.settings.acceptance_threshold,
        };
        let start: Vec<FittedPulse> = seeds
            .iter()
            .map(|seed| FittedPulse {
                amplitude: seed.amplitude,
                offset: seed.offset,
            })
            .collect();

        let first_pass = self.minimise(&start)?;
        let (num_fitted, survivors) = self.accepted(&first_pass);
        if survivors.is_empty() {
            return Err(all_pruned);
        }
        if survivors.len() == num_fitted {
            return Ok(PulseFit {
                pulses: survivors,
                first_pass,
                refit: None,
            });
        }

        debug!(
            "Refitting {} of {num_fitted} pulses after pruning",
            survivors.len()
        );
        let refit = self.minimise(&survivors)?;
        let (_, pulses) = self.accepted(&refit);
        if pulses.is_empty() {
            return Err(all_pruned);
        }
        Ok(PulseFit {
            pulses,
            first_pass,
            refit: Some(refit),
        })
    }
}

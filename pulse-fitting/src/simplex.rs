//! Nelder-Mead over a box, as an argmin solver.
//!
//! Vertices move freely while the objective clamps them into the box, so
//! convergence is judged on the clamped vertices: the search stops once every
//! coordinate of every vertex agrees with the best vertex to within a
//! relative tolerance. A hard budget on objective evaluations stops the
//! search early, keeping the best vertex found so far.

use crate::Real;
use argmin::core::{
    CostFunction, Error, IterState, KV, Problem, Solver, TerminationReason, TerminationStatus,
};

pub type SimplexState = IterState<Vec<Real>, (), (), (), (), Real>;

const REFLECTION: Real = 1.0;
const EXPANSION: Real = 2.0;
const CONTRACTION: Real = 0.5;
const SHRINK: Real = 0.5;

pub fn clamp_params(params: &[Real], bounds: &[(Real, Real)]) -> Vec<Real> {
    params
        .iter()
        .zip(bounds)
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

/// `from + factor * (to - from)`
fn towards(from: &[Real], to: &[Real], factor: Real) -> Vec<Real> {
    from.iter()
        .zip(to)
        .map(|(&f, &t)| f + factor * (t - f))
        .collect()
}

enum Step {
    Replace(Vec<Real>, Real),
    Shrink,
    Keep,
}

#[derive(Clone, Debug)]
pub struct BoundedNelderMead {
    /// Sorted by cost once evaluated, best first.
    vertices: Vec<(Vec<Real>, Real)>,
    bounds: Vec<(Real, Real)>,
    x_tolerance: Real,
    max_evaluations: usize,
    evaluations: usize,
    exhausted: bool,
}

impl BoundedNelderMead {
    pub fn new(simplex: Vec<Vec<Real>>, bounds: Vec<(Real, Real)>) -> Self {
        Self {
            vertices: simplex.into_iter().map(|x| (x, Real::NAN)).collect(),
            bounds,
            x_tolerance: Real::EPSILON,
            max_evaluations: usize::MAX,
            evaluations: 0,
            exhausted: false,
        }
    }

    pub fn with_x_tolerance(mut self, tolerance: Real) -> Self {
        self.x_tolerance = tolerance;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// `None` once the budget is spent.
    fn evaluate<O>(&mut self, problem: &mut Problem<O>, x: &Vec<Real>) -> Result<Option<Real>, Error>
    where
        O: CostFunction<Param = Vec<Real>, Output = Real>,
    {
        if self.evaluations >= self.max_evaluations {
            self.exhausted = true;
            return Ok(None);
        }
        self.evaluations += 1;
        problem.cost(x).map(Some)
    }

    fn sort(&mut self) {
        self.vertices.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    /// Centroid of every vertex but the worst.
    fn centroid(&self) -> Vec<Real> {
        let kept = &self.vertices[..self.vertices.len() - 1];
        let mut centroid = vec![0.0; self.bounds.len()];
        for (x, _) in kept {
            for (c, v) in centroid.iter_mut().zip(x) {
                *c += v;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= kept.len() as Real);
        centroid
    }

    fn best_state(&self, state: SimplexState) -> SimplexState {
        match self.vertices.first() {
            Some((x, cost)) => state.param(x.clone()).cost(*cost),
            None => state,
        }
    }

    fn shrink<O>(&mut self, problem: &mut Problem<O>) -> Result<(), Error>
    where
        O: CostFunction<Param = Vec<Real>, Output = Real>,
    {
        let Some(best) = self.vertices.first().map(|(x, _)| x.clone()) else {
            return Ok(());
        };
        let mut vertices = std::mem::take(&mut self.vertices);
        for (x, cost) in vertices.iter_mut().skip(1) {
            *x = towards(&best, x, SHRINK);
            *cost = self.evaluate(problem, x)?.unwrap_or(Real::INFINITY);
        }
        self.vertices = vertices;
        Ok(())
    }

    fn converged(&self) -> bool {
        let Some((best, _)) = self.vertices.first() else {
            return true;
        };
        let best = clamp_params(best, &self.bounds);
        self.vertices.iter().skip(1).all(|(x, _)| {
            clamp_params(x, &self.bounds)
                .iter()
                .zip(&best)
                .all(|(a, b)| (a - b).abs() <= self.x_tolerance * (a.abs() + b.abs()) / 2.0)
        })
    }
}

impl<O> Solver<O, SimplexState> for BoundedNelderMead
where
    O: CostFunction<Param = Vec<Real>, Output = Real>,
{
    const NAME: &'static str = "Bounded Nelder-Mead";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: SimplexState,
    ) -> Result<(SimplexState, Option<KV>), Error> {
        let mut vertices = std::mem::take(&mut self.vertices);
        for (x, cost) in vertices.iter_mut() {
            *cost = self.evaluate(problem, x)?.unwrap_or(Real::INFINITY);
        }
        self.vertices = vertices;
        self.sort();
        Ok((self.best_state(state), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: SimplexState,
    ) -> Result<(SimplexState, Option<KV>), Error> {
        let n = self.vertices.len();
        if n < 2 {
            return Ok((self.best_state(state), None));
        }
        let centroid = self.centroid();
        let best_cost = self.vertices[0].1;
        let second_worst_cost = self.vertices[n - 2].1;
        let (worst, worst_cost) = self.vertices[n - 1].clone();

        let reflected = towards(&centroid, &worst, -REFLECTION);
        let Some(reflected_cost) = self.evaluate(problem, &reflected)? else {
            return Ok((self.best_state(state), None));
        };

        let step = if reflected_cost < second_worst_cost && reflected_cost >= best_cost {
            Step::Replace(reflected, reflected_cost)
        } else if reflected_cost < best_cost {
            let expanded = towards(&centroid, &reflected, EXPANSION);
            match self.evaluate(problem, &expanded)? {
                Some(cost) if cost < reflected_cost => Step::Replace(expanded, cost),
                _ => Step::Replace(reflected, reflected_cost),
            }
        } else if reflected_cost < worst_cost {
            let contracted = towards(&centroid, &reflected, CONTRACTION);
            match self.evaluate(problem, &contracted)? {
                Some(cost) if cost <= reflected_cost => Step::Replace(contracted, cost),
                Some(_) => Step::Shrink,
                None => Step::Replace(reflected, reflected_cost),
            }
        } else {
            let contracted = towards(&centroid, &worst, CONTRACTION);
            match self.evaluate(problem, &contracted)? {
                Some(cost) if cost < worst_cost => Step::Replace(contracted, cost),
                Some(_) => Step::Shrink,
                None => Step::Keep,
            }
        };

        match step {
            Step::Replace(x, cost) => {
                if let Some(last) = self.vertices.last_mut() {
                    *last = (x, cost);
                }
            }
            Step::Shrink => self.shrink(problem)?,
            Step::Keep => {}
        }
        self.sort();
        Ok((self.best_state(state), None))
    }

    fn terminate(&mut self, _state: &SimplexState) -> TerminationStatus {
        if self.exhausted || self.evaluations >= self.max_evaluations {
            return TerminationStatus::Terminated(TerminationReason::SolverExit(
                "Evaluation budget spent".to_owned(),
            ));
        }
        if self.converged() {
            return TerminationStatus::Terminated(TerminationReason::SolverConverged);
        }
        TerminationStatus::NotTerminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmin::core::{Executor, State};
    use assert_approx_eq::assert_approx_eq;

    struct Bowl {
        centre: Vec<Real>,
        bounds: Vec<(Real, Real)>,
    }

    impl CostFunction for Bowl {
        type Param = Vec<Real>;
        type Output = Real;

        fn cost(&self, x: &Vec<Real>) -> Result<Real, Error> {
            Ok(clamp_params(x, &self.bounds)
                .iter()
                .zip(&self.centre)
                .map(|(v, c)| (v - c).powi(2))
                .sum())
        }
    }

    fn run(
        bowl: Bowl,
        start: Vec<Real>,
        max_evaluations: usize,
    ) -> (Vec<Real>, usize, TerminationStatus) {
        let bounds = bowl.bounds.clone();
        let mut simplex = vec![start.clone()];
        for dim in 0..start.len() {
            let mut vertex = start.clone();
            vertex[dim] += 1.0;
            simplex.push(vertex);
        }
        let solver = BoundedNelderMead::new(simplex, bounds.clone())
            .with_x_tolerance(1e-6)
            .with_max_evaluations(max_evaluations);
        let result = Executor::<_, _, SimplexState>::new(bowl, solver)
            .run()
            .unwrap();
        let best = clamp_params(result.state().get_best_param().unwrap(), &bounds);
        (
            best,
            result.solver.evaluations(),
            result.state().get_termination_status().clone(),
        )
    }

    #[test]
    fn clamping() {
        let bounds = [(1.0, 300.0), (0.0, 9.0)];
        assert_eq!(clamp_params(&[0.5, 12.0], &bounds), vec![1.0, 9.0]);
        assert_eq!(clamp_params(&[150.0, -3.0], &bounds), vec![150.0, 0.0]);
    }

    #[test]
    fn converges_on_parameters() {
        let bowl = Bowl {
            centre: vec![3.0, -2.0],
            bounds: vec![(-10.0, 10.0), (-10.0, 10.0)],
        };
        let (best, evaluations, status) = run(bowl, vec![0.0, 0.0], 1000);
        assert_eq!(
            status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        assert!(evaluations < 1000);
        assert_approx_eq!(best[0], 3.0, 1e-4);
        assert_approx_eq!(best[1], -2.0, 1e-4);
    }

    #[test]
    fn minimum_outside_box_lands_on_bound() {
        let bowl = Bowl {
            centre: vec![5.0, 20.0],
            bounds: vec![(0.0, 10.0), (0.0, 10.0)],
        };
        let (best, _, _) = run(bowl, vec![1.0, 1.0], 1000);
        assert_approx_eq!(best[0], 5.0, 1e-3);
        assert_eq!(best[1], 10.0);
    }

    #[test]
    fn evaluation_budget_is_hard() {
        for budget in [1, 3, 4, 10, 25] {
            let bowl = Bowl {
                centre: vec![30.0, 40.0, 50.0],
                bounds: vec![(-100.0, 100.0); 3],
            };
            let (_, evaluations, status) = run(bowl, vec![0.0; 3], budget);
            assert_eq!(evaluations, budget);
            assert!(matches!(
                status,
                TerminationStatus::Terminated(TerminationReason::SolverExit(_))
            ));
        }
    }
}

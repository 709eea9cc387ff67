#![cfg(test)]
//! The theory-solver hand-off protocol: preprocessing, predetermined propagation, refinement,
//! and restart-on-rejection.

use std::any::Any;

use crate::theory::TheorySolver;
use crate::Literal;
use crate::Problem;
use crate::PropositionId;
use crate::Solution;
use crate::SphynxError;

/// The value our toy theory writes back into solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Temperature(i32);

/// A one-variable finite-domain theory: the temperature is hot when `furnace` is on, and the
/// theory refuses models where the temperature would exceed its limit.
#[derive(Debug)]
struct FurnaceTheory {
    furnace: PropositionId,
    limit: i32,
    preprocessed: bool,
    propagated: usize,
    rejections: usize,
}

impl FurnaceTheory {
    fn temperature(solution: &Solution, furnace: PropositionId) -> i32 {
        if solution.is_true(furnace) {
            90
        } else {
            20
        }
    }
}

impl TheorySolver for FurnaceTheory {
    fn name(&self) -> &str {
        "furnace"
    }

    fn preprocess(&mut self, _problem: &mut Problem) -> Result<(), SphynxError> {
        self.preprocessed = true;
        Ok(())
    }

    fn propagate_predetermined(&mut self, _solution: &mut Solution) {
        self.propagated += 1;
    }

    fn solve(&mut self, solution: &mut Solution) -> bool {
        let temperature = FurnaceTheory::temperature(solution, self.furnace);
        if temperature > self.limit {
            self.rejections += 1;
            return false;
        }
        solution.set_theory_value(Temperature(temperature));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn theory_values_are_written_into_the_solution() {
    let mut problem = Problem::default();
    let furnace = problem.proposition("furnace");
    problem.assert_literal(Literal::negative(furnace)).unwrap();
    problem
        .register_theory(FurnaceTheory {
            furnace,
            limit: 50,
            preprocessed: false,
            propagated: 0,
            rejections: 0,
        })
        .unwrap();

    let solution = problem.solve().unwrap();
    assert_eq!(solution.theory_value::<Temperature>(), Some(&Temperature(20)));

    let theory = problem.theory::<FurnaceTheory>().unwrap();
    assert!(theory.preprocessed);
    assert_eq!(theory.propagated, 1);
    assert_eq!(theory.rejections, 0);
}

#[test]
fn rejection_restarts_the_boolean_search() {
    let mut problem = Problem::default();
    let furnace = problem.proposition("furnace");
    // Strongly bias the furnace on, so early models are usually rejected by the theory.
    problem.set_initial_probability(furnace, 0.95).unwrap();
    problem
        .register_theory(FurnaceTheory {
            furnace,
            limit: 50,
            preprocessed: false,
            propagated: 0,
            rejections: 0,
        })
        .unwrap();

    let solution = problem.solve().unwrap();
    // The only acceptable models have the furnace off.
    assert!(!solution.is_true(furnace));
    assert_eq!(solution.theory_value::<Temperature>(), Some(&Temperature(20)));

    let theory = problem.theory::<FurnaceTheory>().unwrap();
    assert_eq!(problem.last_stats().restarts, theory.rejections);
}

/// A theory that rejects every model, to pin down the termination contract.
#[derive(Debug)]
struct Obstinate;

impl TheorySolver for Obstinate {
    fn name(&self) -> &str {
        "obstinate"
    }

    fn solve(&mut self, _solution: &mut Solution) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn ever_rejecting_theory_still_times_out() {
    let mut problem = Problem::default();
    problem.options_mut().max_flips = 100;
    let _ = problem.proposition("p");
    problem.register_theory(Obstinate).unwrap();

    assert!(matches!(problem.solve(), Err(SphynxError::Timeout)));
}

/// A theory whose preprocessing fails, to check the compile-time error path.
#[derive(Debug)]
struct BrokenPreprocess;

impl TheorySolver for BrokenPreprocess {
    fn name(&self) -> &str {
        "broken"
    }

    fn preprocess(&mut self, _problem: &mut Problem) -> Result<(), SphynxError> {
        Err(SphynxError::InvalidArgument(
            "theory cannot preprocess this problem".to_owned(),
        ))
    }

    fn solve(&mut self, _solution: &mut Solution) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn preprocess_errors_surface_at_the_first_solve() {
    let mut problem = Problem::default();
    let _ = problem.proposition("p");
    problem.register_theory(BrokenPreprocess).unwrap();
    assert!(matches!(
        problem.solve(),
        Err(SphynxError::InvalidArgument(_))
    ));
}

#[test]
fn duplicate_theory_registration_is_rejected() {
    let mut problem = Problem::default();
    problem.register_theory(Obstinate).unwrap();
    assert!(matches!(
        problem.register_theory(Obstinate),
        Err(SphynxError::InvalidArgument(_))
    ));
}

#![cfg(test)]
//! The custom-constraint hook, exercised through a parity constraint.

use std::cell::Cell;

use crate::basic_types::Random;
use crate::constraints::CustomConstraint;
use crate::constraints::Model;
use crate::Literal;
use crate::Problem;

/// Requires an odd (or even) number of its disjuncts to hold.
#[derive(Debug)]
struct Parity {
    odd: bool,
}

impl CustomConstraint for Parity {
    fn is_satisfied(&self, count: usize, _model: &Model<'_>) -> bool {
        (count % 2 == 1) == self.odd
    }

    fn extra_hash(&self) -> u64 {
        0x7061_7269_7479 ^ u64::from(self.odd)
    }
}

#[test]
fn parity_constraint_is_enforced() {
    let mut problem = Problem::default();
    let literals: Vec<Literal> = (0..5)
        .map(|index| problem.proposition(format!("bit{index}")).into())
        .collect();
    problem
        .add_custom_constraint(&literals, Box::new(Parity { odd: true }))
        .unwrap();

    for _ in 0..100 {
        let solution = problem.solve().unwrap();
        assert_eq!(solution.count(&literals) % 2, 1);
    }
}

#[test]
fn parity_combines_with_cardinality() {
    let mut problem = Problem::default();
    let literals: Vec<Literal> = (0..6)
        .map(|index| problem.proposition(format!("bit{index}")).into())
        .collect();
    problem
        .add_custom_constraint(&literals, Box::new(Parity { odd: false }))
        .unwrap();
    problem.quantify(1, Some(3), &literals).unwrap();

    for _ in 0..50 {
        let solution = problem.solve().unwrap();
        let holding = solution.count(&literals);
        assert_eq!(holding % 2, 0);
        assert!((1..=3).contains(&holding));
    }
}

#[test]
fn custom_constraints_deduplicate_by_extra_hash() {
    let mut problem = Problem::default();
    let literals: Vec<Literal> = (0..3)
        .map(|index| problem.proposition(format!("bit{index}")).into())
        .collect();
    problem
        .add_custom_constraint(&literals, Box::new(Parity { odd: true }))
        .unwrap();
    problem
        .add_custom_constraint(&literals, Box::new(Parity { odd: true }))
        .unwrap();
    assert_eq!(problem.num_constraints(), 1);

    problem
        .add_custom_constraint(&literals, Box::new(Parity { odd: false }))
        .unwrap();
    assert_eq!(problem.num_constraints(), 2);
}

/// A parity constraint that also exercises the optional hooks: it counts flip notifications and
/// steers the greedy repair onto its first undetermined disjunct.
#[derive(Debug)]
struct InstrumentedParity {
    flips_seen: Cell<usize>,
    greedy_calls: Cell<usize>,
}

impl CustomConstraint for InstrumentedParity {
    fn is_satisfied(&self, count: usize, _model: &Model<'_>) -> bool {
        count % 2 == 1
    }

    fn extra_hash(&self) -> u64 {
        0x6f62_7365_7276_6564
    }

    fn on_flip(&self, _proposition: crate::PropositionId, _now_true: bool, _model: &Model<'_>) {
        self.flips_seen.set(self.flips_seen.get() + 1);
    }

    fn greedy_flip(
        &self,
        disjuncts: &[Literal],
        _model: &Model<'_>,
        random: &mut dyn Random,
    ) -> Option<Literal> {
        self.greedy_calls.set(self.greedy_calls.get() + 1);
        Some(disjuncts[random.in_range(disjuncts.len())])
    }
}

#[test]
fn optional_hooks_are_invoked() {
    let mut problem = Problem::default();
    // Zero initial probability guarantees the even (empty) start violates the constraint, so
    // the solver must repair it through the custom hooks.
    let literals: Vec<Literal> = (0..4)
        .map(|index| {
            let proposition = problem.proposition(format!("bit{index}"));
            problem.set_initial_probability(proposition, 0.0).unwrap();
            proposition.into()
        })
        .collect();
    problem
        .add_custom_constraint(
            &literals,
            Box::new(InstrumentedParity {
                flips_seen: Cell::new(0),
                greedy_calls: Cell::new(0),
            }),
        )
        .unwrap();

    let solution = problem.solve().unwrap();
    assert_eq!(solution.count(&literals) % 2, 1);
    assert!(problem.last_stats().flips > 0);
}

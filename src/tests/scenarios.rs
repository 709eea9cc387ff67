#![cfg(test)]
//! End-to-end solving scenarios.

use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

use crate::Literal;
use crate::Problem;
use crate::SphynxError;

#[test]
fn exactly_one_among_three() {
    let mut problem = Problem::default();
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    let c = problem.proposition("c");
    let literals: Vec<Literal> = vec![a.into(), b.into(), c.into()];
    problem.unique(&literals).unwrap();

    let mut appeared = [false; 3];
    for _ in 0..1000 {
        let solution = problem.solve().unwrap();
        assert_eq!(solution.count(&literals), 1);
        if solution.is_true(a) {
            appeared[0] = true;
        }
        if solution.is_true(b) {
            appeared[1] = true;
        }
        if solution.is_true(c) {
            appeared[2] = true;
        }
    }
    assert_eq!(appeared, [true; 3], "some value never occurred in 1000 solves");
}

#[test]
fn hard_coded_fact_plus_rule() {
    let mut problem = Problem::default();
    let p = problem.proposition("p");
    let q = problem.proposition("q");
    problem.assert_literal(p.into()).unwrap();
    problem.assert_rule(q, &[p.into()]).unwrap();

    for _ in 0..10 {
        let solution = problem.solve().unwrap();
        assert!(solution.is_true(p));
        assert!(solution.is_true(q));
    }
}

#[test]
fn non_tight_program_is_rejected() {
    let mut problem = Problem::default();
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem.assert_rule(a, &[b.into()]).unwrap();
    problem.assert_rule(b, &[a.into()]).unwrap();

    let error = problem.solve().unwrap_err();
    let SphynxError::NonTightProgram { proposition, .. } = error else {
        panic!("expected a non-tight program error");
    };
    assert!(proposition == a || proposition == b);
}

#[test]
fn non_tight_check_can_be_disabled() {
    let mut problem = Problem::default();
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem.assert_rule(a, &[b.into()]).unwrap();
    problem.assert_rule(b, &[a.into()]).unwrap();
    problem.set_tight(false);

    // Without the tightness check the completion constraints still compile and solve.
    let solution = problem.solve().unwrap();
    assert_eq!(solution.is_true(a), solution.is_true(b));
}

#[test]
fn cardinality_window() {
    let mut problem = Problem::default();
    let literals: Vec<Literal> = (1..=5)
        .map(|index| problem.proposition(format!("p{index}")).into())
        .collect();
    problem.quantify(2, Some(3), &literals).unwrap();

    for _ in 0..100 {
        let solution = problem.solve().unwrap();
        let holding = solution.count(&literals);
        assert!((2..=3).contains(&holding), "count {holding} outside window");
    }
}

#[test]
fn utility_maximization_converges() {
    let mut problem = Problem::default();
    let p1 = problem.proposition("p1");
    let p2 = problem.proposition("p2");
    let p3 = problem.proposition("p3");
    problem.set_utility(p1, 1.0).unwrap();
    problem.set_utility(p2, 2.0).unwrap();
    problem.set_utility(p3, -5.0).unwrap();

    let solution = problem.high_utility_solution(10_000).unwrap();
    assert!(solution.is_true(p1));
    assert!(solution.is_true(p2));
    assert!(!solution.is_true(p3));
    assert_eq!(solution.utility(), 3.0);
}

#[test]
fn utility_maximization_respects_constraints() {
    let mut problem = Problem::default();
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem.set_utility(a, 10.0).unwrap();
    problem.set_utility(b, 1.0).unwrap();
    // The high-utility proposition is mutually exclusive with the low-utility one.
    problem.unique(&[a.into(), b.into()]).unwrap();

    let solution = problem.high_utility_solution(10_000).unwrap();
    assert_eq!(solution.count(&[a.into(), b.into()]), 1);
    assert!(solution.is_true(a), "the climb should keep the better of the two");
    assert_eq!(solution.utility(), 10.0);
}

#[test]
fn conditional_window_disabled_by_true_guard() {
    let mut problem = Problem::default();
    let guard = problem.proposition("guard");
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem
        .quantify_unless(guard.into(), 1, Some(1), &[a.into(), b.into()])
        .unwrap();
    problem.on_initialize(move |initializer| initializer.preinitialize(guard, true));

    let mut violations = 0;
    for _ in 0..100 {
        let solution = problem.solve().unwrap();
        assert!(solution.is_true(guard));
        if solution.count(&[a.into(), b.into()]) != 1 {
            violations += 1;
        }
    }
    assert!(
        violations > 0,
        "the disabled window should not bind the disjuncts"
    );
}

#[test]
fn conditional_window_enforced_by_false_guard() {
    let mut problem = Problem::default();
    let guard = problem.proposition("guard");
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem
        .quantify_unless(guard.into(), 1, Some(1), &[a.into(), b.into()])
        .unwrap();
    problem.on_initialize(move |initializer| initializer.preinitialize(guard, false));

    for _ in 0..100 {
        let solution = problem.solve().unwrap();
        assert!(!solution.is_true(guard));
        assert_eq!(solution.count(&[a.into(), b.into()]), 1);
    }
}

#[test]
fn conditional_window_with_floating_guard() {
    let mut problem = Problem::default();
    let guard = problem.proposition("guard");
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    problem
        .quantify_unless(guard.into(), 1, Some(1), &[a.into(), b.into()])
        .unwrap();

    for _ in 0..100 {
        let solution = problem.solve().unwrap();
        assert!(
            solution.is_true(guard) || solution.count(&[a.into(), b.into()]) == 1,
            "an enabled conditional window must hold"
        );
    }
}

#[test]
fn trivial_problem_solves_with_zero_budget() {
    let mut problem = Problem::default();
    problem.options_mut().max_flips = 0;
    let p = problem.proposition("p");
    let solution = problem.solve().unwrap();
    // Any value is fine; the point is that no budget is needed.
    let _ = solution.is_true(p);
}

#[test]
fn exactly_k_of_n() {
    let mut problem = Problem::default();
    let literals: Vec<Literal> = (0..4)
        .map(|index| problem.proposition(format!("q{index}")).into())
        .collect();
    problem.exactly(2, &literals).unwrap();

    for _ in 0..50 {
        let solution = problem.solve().unwrap();
        assert_eq!(solution.count(&literals), 2);
    }
}

#[test]
fn unsatisfiable_instance_times_out() {
    let mut problem = Problem::default();
    problem.options_mut().max_flips = 200;
    let a = problem.proposition("a");
    let b = problem.proposition("b");
    // All four clauses over two propositions: unsatisfiable.
    problem.exists(&[a.into(), b.into()]).unwrap();
    problem.exists(&[Literal::negative(a), b.into()]).unwrap();
    problem.exists(&[a.into(), Literal::negative(b)]).unwrap();
    problem
        .exists(&[Literal::negative(a), Literal::negative(b)])
        .unwrap();

    assert!(matches!(problem.solve(), Err(SphynxError::Timeout)));
    assert_eq!(problem.last_stats().flips, 200);
    assert!(matches!(problem.try_solve(), Ok(None)));
}

#[test]
fn planted_random_instances_are_solved() {
    let mut generator = SmallRng::seed_from_u64(0xfeed);
    for _ in 0..20 {
        let mut problem = Problem::default();
        let propositions: Vec<_> = (0..12)
            .map(|index| problem.proposition(format!("v{index}")))
            .collect();
        let planted: Vec<bool> = (0..12).map(|_| generator.gen()).collect();

        let mut clauses: Vec<Vec<Literal>> = Vec::new();
        for _ in 0..40 {
            let mut clause = Vec::new();
            for _ in 0..3 {
                let pick = generator.gen_range(0..propositions.len());
                clause.push(Literal::with_polarity(
                    propositions[pick],
                    generator.gen(),
                ));
            }
            // Make sure the planted assignment satisfies the clause.
            if !clause
                .iter()
                .any(|literal| planted[literal.proposition().index() as usize - 1] == literal.is_positive())
            {
                let pick = generator.gen_range(0..propositions.len());
                clause.push(Literal::with_polarity(propositions[pick], planted[pick]));
            }
            problem.exists(&clause).unwrap();
            clauses.push(clause);
        }

        let solution = problem.solve().unwrap();
        for clause in &clauses {
            assert!(solution.exists(clause), "clause violated in returned model");
        }
    }
}

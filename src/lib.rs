//! # Sphynx
//! Sphynx is a stochastic satisfiability engine for *generalized cardinality constraints*,
//! built for procedural content generation and configuration: small-to-medium problems that
//! must be solved many times per second, frequently under user- or application-supplied
//! partial assignments.
//!
//! The engine is deliberately incomplete: it searches by WalkSAT-style stochastic local search
//! with adaptive noise, bounded by a flip budget. It will find models of satisfiable problems
//! fast, but it cannot prove unsatisfiability; running out of budget reports a
//! [Timeout](SphynxError::Timeout), nothing more.
//!
//! # Using Sphynx
//! The first step to solving a problem is **interning propositions**:
//! ```rust
//! # use sphynx::Problem;
//! // We create a problem with default options
//! let mut problem = Problem::default();
//!
//! // We intern three named propositions
//! let sword = problem.proposition("sword");
//! let shield = problem.proposition("shield");
//! let potion = problem.proposition("potion");
//! ```
//!
//! Then we can **add constraints**; here, that exactly one of the three items appears:
//! ```rust
//! # use sphynx::Problem;
//! # let mut problem = Problem::default();
//! # let sword = problem.proposition("sword");
//! # let shield = problem.proposition("shield");
//! # let potion = problem.proposition("potion");
//! problem
//!     .unique(&[sword.into(), shield.into(), potion.into()])
//!     .unwrap();
//! ```
//!
//! **Finding a model** is one call; every solve samples independently:
//! ```rust
//! # use sphynx::Problem;
//! # let mut problem = Problem::default();
//! # let sword = problem.proposition("sword");
//! # let shield = problem.proposition("shield");
//! # let potion = problem.proposition("potion");
//! # problem.unique(&[sword.into(), shield.into(), potion.into()]).unwrap();
//! let solution = problem.solve().unwrap();
//! assert_eq!(solution.count(&[sword.into(), shield.into(), potion.into()]), 1);
//! ```
//!
//! # Cardinality windows
//! The general constraint form is a window on how many of a literal list may hold, with `None`
//! meaning "no upper bound":
//! ```rust
//! # use sphynx::Problem;
//! # use sphynx::Literal;
//! let mut problem = Problem::default();
//! let guests: Vec<Literal> = (0..5)
//!     .map(|index| problem.proposition(format!("guest{index}")).into())
//!     .collect();
//!
//! // Invite at least two and at most three of the five
//! problem.quantify(2, Some(3), &guests).unwrap();
//!
//! let solution = problem.solve().unwrap();
//! let invited = solution.count(&guests);
//! assert!((2..=3).contains(&invited));
//! ```
//!
//! # Facts and rules
//! Asserted literals are fixed forever; rules compile under completion semantics on the first
//! solve (and a rule program with a positive cycle is rejected as
//! [non-tight](SphynxError::NonTightProgram)):
//! ```rust
//! # use sphynx::Problem;
//! # use sphynx::Literal;
//! let mut problem = Problem::default();
//! let rains = problem.proposition("rains");
//! let wet = problem.proposition("wet");
//!
//! problem.assert_literal(rains.into()).unwrap();
//! problem.assert_rule(wet, &[rains.into()]).unwrap();
//!
//! let solution = problem.solve().unwrap();
//! assert!(solution.is_true(rains));
//! assert!(solution.is_true(wet));
//! ```
//!
//! # Utilities
//! Propositions can carry utilities; [Problem::high_utility_solution] climbs toward the best
//! satisfying model it can reach within a flip budget:
//! ```rust
//! # use sphynx::Problem;
//! let mut problem = Problem::default();
//! let gold = problem.proposition("gold");
//! let gems = problem.proposition("gems");
//! let curse = problem.proposition("curse");
//! problem.set_utility(gold, 1.0).unwrap();
//! problem.set_utility(gems, 2.0).unwrap();
//! problem.set_utility(curse, -5.0).unwrap();
//!
//! let solution = problem.high_utility_solution(1_000).unwrap();
//! assert!(solution.is_true(gold));
//! assert!(solution.is_true(gems));
//! assert!(!solution.is_true(curse));
//! assert_eq!(solution.utility(), 3.0);
//! ```
//!
//! # Reproducibility
//! Every problem owns its random generator, seeded with 0 by default; identical problems with
//! identical seeds solve identically. Use [Problem::set_seed] to pick a seed and
//! [Problem::set_seed_from_clock] for varied runs (the chosen seed stays observable through
//! [Problem::seed]).

pub(crate) mod asserts;
pub(crate) mod basic_types;
pub(crate) mod engine;

// We declare a private module with public use, so that all exports from the API are exports
// directly from the crate.
mod api;

pub use api::*;

pub use crate::api::problem::Preinitializer;
pub use crate::api::problem::Problem;
pub use crate::basic_types::ContradictionSubject;
pub use crate::basic_types::Random;
pub use crate::basic_types::Solution;
pub use crate::basic_types::SphynxError;
pub use crate::basic_types::XorShiftRandom;
pub use crate::engine::variables::DeterminationState;
pub use crate::engine::variables::Literal;
pub use crate::engine::variables::Name;
pub use crate::engine::variables::PropositionId;

pub(crate) mod tests;

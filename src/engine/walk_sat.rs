//! The stochastic search: WalkSAT over generalized cardinality constraints, with adaptive noise,
//! a one-deep tabu per constraint, and an optional utility-improvement pass.
//!
//! One [WalkSat] instance performs one solve call. It borrows the problem's immutable structure
//! (propositions, variables, constraints), owns the per-search state (truth counts, the
//! unsatisfied set, the improvable set, the noise level), and writes its result into the
//! [Solution] it was handed.

use log::trace;
use rand::seq::SliceRandom;

use crate::asserts::sphynx_assert_advanced;
use crate::asserts::sphynx_assert_moderate;
use crate::basic_types::KeyedVec;
use crate::basic_types::Random;
use crate::basic_types::Solution;
use crate::basic_types::SparseSet;
use crate::basic_types::XorShiftRandom;
use crate::engine::constraints::Constraint;
use crate::engine::constraints::ConstraintId;
use crate::engine::constraints::ConstraintKind;
use crate::engine::constraints::Model;
use crate::engine::theory::TheoryRegistry;
use crate::engine::variables::Literal;
use crate::engine::variables::Proposition;
use crate::engine::variables::PropositionId;
use crate::engine::variables::SatVariable;
use crate::engine::SolveStats;
use crate::engine::SolverOptions;

/// What the search is asked to deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SearchGoal {
    /// Any satisfying assignment.
    Satisfy,
    /// The best-utility satisfying assignment discoverable within the flip budget.
    MaximizeUtility,
}

/// The flip budget ran out before a model was accepted.
#[derive(Debug)]
pub(crate) struct Exhausted;

enum SatisfyOutcome {
    ModelFound,
    TheoryRejected,
}

/// Incremental per-constraint progress of the initial assignment, driving the forcing
/// propagation.
struct InitProgress {
    initialized_true: KeyedVec<ConstraintId, usize>,
    uninitialized: KeyedVec<ConstraintId, usize>,
}

impl InitProgress {
    fn new(constraints: &KeyedVec<ConstraintId, Constraint>) -> InitProgress {
        let mut uninitialized = KeyedVec::default();
        for constraint in constraints.iter() {
            let _ = uninitialized.push(constraint.disjuncts.len());
        }
        InitProgress {
            initialized_true: KeyedVec::filled_with(constraints.len(), 0),
            uninitialized,
        }
    }
}

pub(crate) struct WalkSat<'a> {
    propositions: &'a KeyedVec<PropositionId, Proposition>,
    variables: &'a KeyedVec<PropositionId, SatVariable>,
    constraints: &'a KeyedVec<ConstraintId, Constraint>,
    /// The propositions whose value the search may flip, precomputed by the problem.
    floating: &'a [PropositionId],
    options: &'a SolverOptions,
    random: &'a mut XorShiftRandom,
    theories: &'a mut TheoryRegistry,
    solution: &'a mut Solution,
    /// Final assignment of the previous solve, for continue-previous-search starts.
    previous: Option<&'a KeyedVec<PropositionId, bool>>,

    /// How many disjuncts of each constraint are currently true.
    true_counts: KeyedVec<ConstraintId, usize>,
    /// The proposition last flipped while repairing each constraint; a tabu of length one.
    last_flip: KeyedVec<ConstraintId, Option<PropositionId>>,
    /// Constraints that are enabled and not satisfied.
    unsat: SparseSet<ConstraintId>,
    /// Propositions whose flip would strictly increase the total utility.
    improvable: SparseSet<PropositionId>,
    noise: f64,
    flips_since_improvement: usize,
    remaining_flips: usize,
    stats: SolveStats,
}

impl<'a> WalkSat<'a> {
    #[allow(clippy::too_many_arguments, reason = "one-shot construction from problem fields")]
    pub(crate) fn new(
        propositions: &'a KeyedVec<PropositionId, Proposition>,
        variables: &'a KeyedVec<PropositionId, SatVariable>,
        constraints: &'a KeyedVec<ConstraintId, Constraint>,
        floating: &'a [PropositionId],
        options: &'a SolverOptions,
        random: &'a mut XorShiftRandom,
        theories: &'a mut TheoryRegistry,
        solution: &'a mut Solution,
        previous: Option<&'a KeyedVec<PropositionId, bool>>,
        flip_budget: usize,
    ) -> WalkSat<'a> {
        WalkSat {
            true_counts: KeyedVec::filled_with(constraints.len(), 0),
            last_flip: KeyedVec::filled_with(constraints.len(), None),
            unsat: SparseSet::with_capacity(constraints.len()),
            improvable: SparseSet::with_capacity(variables.len()),
            noise: options.initial_noise,
            flips_since_improvement: 0,
            remaining_flips: flip_budget,
            stats: SolveStats::default(),
            propositions,
            variables,
            constraints,
            floating,
            options,
            random,
            theories,
            solution,
            previous,
        }
    }

    /// Statistics of the finished (or abandoned) search.
    pub(crate) fn stats(&self) -> SolveStats {
        SolveStats {
            final_noise: self.noise,
            ..self.stats
        }
    }

    /// Run the search to completion or budget exhaustion.
    pub(crate) fn run(&mut self, goal: SearchGoal) -> Result<(), Exhausted> {
        let mut first = true;
        loop {
            let adopt_previous =
                first && self.options.continue_previous_search && self.previous.is_some();
            first = false;
            self.initialize(adopt_previous);
            self.recount();
            #[cfg(test)]
            assert!(self.debug_check_state());

            match self.satisfy()? {
                SatisfyOutcome::ModelFound => {
                    #[cfg(test)]
                    assert!(self.debug_check_state());
                }
                SatisfyOutcome::TheoryRejected => {
                    self.stats.restarts += 1;
                    // A restart consumes one unit of budget so that a theory solver rejecting
                    // every model still terminates at the flip bound.
                    if self.remaining_flips == 0 {
                        return Err(Exhausted);
                    }
                    self.remaining_flips -= 1;
                    trace!(
                        "theory solver rejected the model; restarting ({} flips left)",
                        self.remaining_flips
                    );
                    continue;
                }
            }

            if goal == SearchGoal::MaximizeUtility {
                self.improve_utility();
            }
            return Ok(());
        }
    }

    /// Flip until no enabled constraint is unsatisfied and every theory solver accepts, or the
    /// budget runs out.
    fn satisfy(&mut self) -> Result<SatisfyOutcome, Exhausted> {
        loop {
            if self.unsat.is_empty() {
                return if self.theories_accept() {
                    Ok(SatisfyOutcome::ModelFound)
                } else {
                    Ok(SatisfyOutcome::TheoryRejected)
                };
            }
            if self.remaining_flips == 0 {
                return Err(Exhausted);
            }
            self.step();
        }
    }

    /// One iteration of the main loop: pick an unsatisfied constraint, pick a disjunct by noise
    /// or greed, flip it, adapt the noise.
    fn step(&mut self) {
        let repaired = self.unsat.random_element(&mut *self.random);
        let unsat_before = self.unsat.len();

        let chosen = if self.random.boolean(self.noise) {
            self.random_disjunct(repaired)
        } else {
            self.greedy_flip(repaired)
        };

        if let Some(proposition) = chosen {
            self.last_flip[repaired] = Some(proposition);
            self.flip(proposition);
            self.adapt_noise(repaired, unsat_before);
        }
        self.remaining_flips -= 1;
        self.stats.flips += 1;
    }

    /// Hoos-style adaptive noise. Only consulted for repairs of normal disjunctions unless the
    /// options say otherwise.
    fn adapt_noise(&mut self, repaired: ConstraintId, unsat_before: usize) {
        let plain_disjunction = matches!(
            self.constraints[repaired].kind,
            ConstraintKind::Disjunction
        );
        if !plain_disjunction && !self.options.adapt_noise_on_cardinality {
            return;
        }
        if self.unsat.len() < unsat_before {
            self.noise *= 1.0 - self.options.noise_delta / 2.0;
            self.flips_since_improvement = 0;
        } else {
            self.flips_since_improvement += 1;
            let patience = self.constraints.len() / self.options.stagnation_divisor.max(1);
            if self.flips_since_improvement > patience {
                self.noise += (1.0 - self.noise) * self.options.noise_delta;
                self.flips_since_improvement = 0;
            }
        }
    }

    /// A uniformly random undetermined disjunct of `constraint_id`, or `None` when every
    /// disjunct is predetermined.
    fn random_disjunct(&mut self, constraint_id: ConstraintId) -> Option<PropositionId> {
        let variables = self.variables;
        let constraint = &self.constraints[constraint_id];
        let candidates = constraint
            .disjuncts
            .iter()
            .filter(|literal| !variables[literal.proposition()].is_predetermined())
            .count();
        if candidates == 0 {
            return None;
        }
        let pick = self.random.in_range(candidates);
        constraint
            .disjuncts
            .iter()
            .filter(|literal| !variables[literal.proposition()].is_predetermined())
            .nth(pick)
            .map(|literal| literal.proposition())
    }

    /// The greedy repair choice for `constraint_id`: among the undetermined disjuncts whose flip
    /// moves the true count toward the satisfied window, the one whose flip least increases the
    /// number of unsatisfied constraints. The walk over candidates starts at a random offset and
    /// advances by a random prime stride, so ties are broken differently on every call.
    fn greedy_flip(&mut self, constraint_id: ConstraintId) -> Option<PropositionId> {
        let variables = self.variables;
        let constraints = self.constraints;
        let constraint = &constraints[constraint_id];

        if let ConstraintKind::Custom(custom) = &constraint.kind {
            let model = Model {
                values: &self.solution.values,
            };
            if let Some(literal) = custom.greedy_flip(&constraint.disjuncts, &model, self.random) {
                let proposition = literal.proposition();
                if !variables[proposition].is_predetermined() {
                    return Some(proposition);
                }
            }
            return self.random_disjunct(constraint_id);
        }

        let Some((min, _)) = constraint.window() else {
            return self.random_disjunct(constraint_id);
        };
        // The constraint is unsatisfied on exactly one side of its window; repairs either raise
        // the count (candidates are the currently false disjuncts) or lower it (the true ones).
        let needs_more = self.true_counts[constraint_id] < min;
        let candidate_truth = !needs_more;

        let length = constraint.disjuncts.len();
        if length == 0 {
            return None;
        }
        let start = self.random.in_range(length);
        let stride = self.random.stride_prime(length);

        let mut best: Option<(PropositionId, i32)> = None;
        for step in 0..length {
            let literal = constraint.disjuncts[(start + step * stride) % length];
            let proposition = literal.proposition();
            if variables[proposition].is_predetermined() {
                continue;
            }
            if self.last_flip[constraint_id] == Some(proposition) {
                continue;
            }
            if self.literal_is_true(literal) != candidate_truth {
                continue;
            }
            let delta = self.flip_delta(proposition);
            if delta <= 0 {
                return Some(proposition);
            }
            if best.map_or(true, |(_, best_delta)| delta < best_delta) {
                best = Some((proposition, delta));
            }
        }
        match best {
            Some((proposition, _)) => Some(proposition),
            None => self.random_disjunct(constraint_id),
        }
    }

    /// Net change in the number of unsatisfied constraints if `proposition` were flipped.
    fn flip_delta(&self, proposition: PropositionId) -> i32 {
        let variable = &self.variables[proposition];
        let would_be_true = !self.solution.values[proposition];
        let gaining = variable.occurrences(would_be_true);
        let losing = variable.occurrences(!would_be_true);
        let model = Model {
            values: &self.solution.values,
        };

        let mut delta = 0;
        for &constraint_id in gaining {
            let constraint = &self.constraints[constraint_id];
            if !constraint.is_enabled(&model) {
                continue;
            }
            delta += constraint.threat_delta_increasing(self.true_counts[constraint_id], &model);
        }
        for &constraint_id in losing {
            let constraint = &self.constraints[constraint_id];
            if !constraint.is_enabled(&model) {
                continue;
            }
            delta += constraint.threat_delta_decreasing(self.true_counts[constraint_id], &model);
        }
        delta
    }

    /// Toggle `proposition` and update utility, the improvable set, the per-constraint truth
    /// counts, and the unsatisfied set.
    fn flip(&mut self, proposition: PropositionId) {
        let variables = self.variables;
        let constraints = self.constraints;
        sphynx_assert_moderate!(
            !variables[proposition].is_predetermined(),
            "flipped a predetermined proposition"
        );

        let now_true = !self.solution.values[proposition];
        self.solution.values[proposition] = now_true;

        let utility = self.propositions[proposition].utility;
        self.solution.utility += if now_true { utility } else { -utility };
        self.refresh_improvable(proposition);

        let variable = &variables[proposition];
        let gaining = variable.occurrences(now_true);
        let losing = variable.occurrences(!now_true);

        for &constraint_id in gaining {
            let count = self.true_counts[constraint_id];
            self.true_counts[constraint_id] = count + 1;
            let constraint = &constraints[constraint_id];
            sphynx_assert_advanced!(count < constraint.disjuncts.len());
            let model = Model {
                values: &self.solution.values,
            };
            if let ConstraintKind::Custom(custom) = &constraint.kind {
                custom.on_flip(proposition, now_true, &model);
            }
            if !constraint.is_enabled(&model) {
                continue;
            }
            match constraint.threat_delta_increasing(count, &model) {
                -1 => {
                    let _ = self.unsat.remove(constraint_id);
                }
                1 => {
                    let _ = self.unsat.insert(constraint_id);
                }
                _ => {}
            }
        }
        for &constraint_id in losing {
            let count = self.true_counts[constraint_id];
            self.true_counts[constraint_id] = count - 1;
            let constraint = &constraints[constraint_id];
            let model = Model {
                values: &self.solution.values,
            };
            if let ConstraintKind::Custom(custom) = &constraint.kind {
                custom.on_flip(proposition, now_true, &model);
            }
            if !constraint.is_enabled(&model) {
                continue;
            }
            match constraint.threat_delta_decreasing(count, &model) {
                -1 => {
                    let _ = self.unsat.remove(constraint_id);
                }
                1 => {
                    let _ = self.unsat.insert(constraint_id);
                }
                _ => {}
            }
        }

        // Constraints guarded by this proposition switch on or off with it.
        for &constraint_id in &variable.guarding {
            let constraint = &constraints[constraint_id];
            let model = Model {
                values: &self.solution.values,
            };
            if constraint.is_enabled(&model)
                && !constraint.is_satisfied(self.true_counts[constraint_id], &model)
            {
                let _ = self.unsat.insert(constraint_id);
            } else {
                let _ = self.unsat.remove(constraint_id);
            }
        }
    }

    /// Re-derive whether flipping `proposition` would strictly raise the utility.
    fn refresh_improvable(&mut self, proposition: PropositionId) {
        let utility = self.propositions[proposition].utility;
        let improves = if self.variables[proposition].is_predetermined() {
            false
        } else if self.solution.values[proposition] {
            utility < 0.0
        } else {
            utility > 0.0
        };
        if improves {
            let _ = self.improvable.insert(proposition);
        } else {
            let _ = self.improvable.remove(proposition);
        }
    }

    fn literal_is_true(&self, literal: Literal) -> bool {
        self.solution.values[literal.proposition()] == literal.is_positive()
    }

    /// Construct the initial assignment: predetermined values are adopted, everything else is
    /// sampled by its initial probability (or taken from the previous model), in a shuffled
    /// order. Committing a value may force other values through the constraints unless the
    /// options disable that propagation.
    fn initialize(&mut self, adopt_previous: bool) {
        self.true_counts = KeyedVec::filled_with(self.constraints.len(), 0);
        self.last_flip = KeyedVec::filled_with(self.constraints.len(), None);
        self.unsat.clear();
        self.improvable.clear();

        let previous = if adopt_previous { self.previous } else { None };
        let mut initialized: KeyedVec<PropositionId, bool> =
            KeyedVec::filled_with(self.variables.len(), false);

        let mut order: Vec<PropositionId> = self.variables.keys().collect();
        order.shuffle(&mut *self.random);

        let propagate = !self.options.skip_propagation && previous.is_none();
        let mut progress = propagate.then(|| InitProgress::new(self.constraints));

        for proposition in order {
            if initialized[proposition] {
                continue;
            }
            let variable = &self.variables[proposition];
            let value = if variable.is_predetermined() {
                variable.predetermined_value
            } else if let Some(previous) = previous {
                previous[proposition]
            } else {
                let probability = self.propositions[proposition].initial_probability;
                self.random.boolean(probability)
            };
            self.commit(proposition, value, &mut initialized, progress.as_mut());
        }
    }

    /// Commit an initial value, then force the last open disjunct of any constraint this pushes
    /// to a boundary (a saturated window must see the straggler false; a window one short of its
    /// floor with one open disjunct must see it true). Forcing recurses through the committed
    /// values; predetermined propositions are never forced.
    fn commit(
        &mut self,
        proposition: PropositionId,
        value: bool,
        initialized: &mut KeyedVec<PropositionId, bool>,
        mut progress: Option<&mut InitProgress>,
    ) {
        let variables = self.variables;
        let constraints = self.constraints;
        let mut pending = vec![(proposition, value)];
        while let Some((proposition, value)) = pending.pop() {
            if initialized[proposition] {
                continue;
            }
            initialized[proposition] = true;
            self.solution.values[proposition] = value;

            let Some(progress) = progress.as_deref_mut() else {
                continue;
            };
            let variable = &variables[proposition];
            for positive in [true, false] {
                for &constraint_id in variable.occurrences(positive) {
                    progress.uninitialized[constraint_id] -= 1;
                    if positive == value {
                        progress.initialized_true[constraint_id] += 1;
                    }
                    let constraint = &constraints[constraint_id];
                    let Some((min, max)) = forcing_window(constraint) else {
                        continue;
                    };
                    if progress.uninitialized[constraint_id] != 1 {
                        continue;
                    }
                    let trues = progress.initialized_true[constraint_id];
                    let forced_polarity = if trues == max {
                        Some(false)
                    } else if trues + 1 == min {
                        Some(true)
                    } else {
                        None
                    };
                    let Some(polarity) = forced_polarity else {
                        continue;
                    };
                    let Some(open) = constraint
                        .disjuncts
                        .iter()
                        .find(|literal| !initialized[literal.proposition()])
                    else {
                        continue;
                    };
                    let target = open.proposition();
                    if !variables[target].is_predetermined() {
                        pending.push((target, open.is_positive() == polarity));
                    }
                }
            }
        }
    }

    /// Recompute truth counts, the unsatisfied set, the utility, and the improvable set from the
    /// assignment. This pass is authoritative; whatever the initialization propagation did or did
    /// not do, the search state afterwards is exact.
    fn recount(&mut self) {
        let constraints = self.constraints;

        for (constraint_id, constraint) in constraints.entries() {
            let count = constraint
                .disjuncts
                .iter()
                .filter(|literal| self.literal_is_true(**literal))
                .count();
            self.true_counts[constraint_id] = count;
        }

        self.unsat.clear();
        for (constraint_id, constraint) in constraints.entries() {
            let model = Model {
                values: &self.solution.values,
            };
            if constraint.is_enabled(&model)
                && !constraint.is_satisfied(self.true_counts[constraint_id], &model)
            {
                let _ = self.unsat.insert(constraint_id);
            }
        }

        let mut utility = 0.0;
        for (proposition, record) in self.propositions.entries() {
            if self.solution.values[proposition] {
                utility += record.utility;
            }
        }
        self.solution.utility = utility;

        self.improvable.clear();
        for &proposition in self.floating {
            self.refresh_improvable(proposition);
        }
    }

    /// Hand the completed Boolean model to every registered theory solver, in registration
    /// order.
    fn theories_accept(&mut self) -> bool {
        for solver in self.theories.solvers_mut() {
            if !solver.solve(self.solution) {
                trace!("theory solver {} rejected the model", solver.name());
                return false;
            }
        }
        true
    }

    /// Greedily climb toward higher utility: flip a random improvable proposition (breaking
    /// constraints is allowed), repair, and keep the best satisfying model seen. Stops at a
    /// local optimum (nothing improvable) or when the budget runs out.
    fn improve_utility(&mut self) {
        let mut best = self.solution.clone();
        while !self.improvable.is_empty() && self.remaining_flips > 0 {
            let proposition = self.improvable.random_element(&mut *self.random);
            self.flip(proposition);
            self.remaining_flips -= 1;
            self.stats.flips += 1;

            while !self.unsat.is_empty() && self.remaining_flips > 0 {
                self.step();
            }
            if self.unsat.is_empty()
                && self.solution.utility > best.utility
                && self.theories_accept()
            {
                best = self.solution.clone();
            }
        }
        *self.solution = best;
    }

    /// Validates the redundant search state against the assignment; the invariants the flip loop
    /// is supposed to preserve.
    #[cfg(test)]
    pub(crate) fn debug_check_state(&self) -> bool {
        let model = Model {
            values: &self.solution.values,
        };
        for (constraint_id, constraint) in self.constraints.entries() {
            let count = constraint
                .disjuncts
                .iter()
                .filter(|literal| self.literal_is_true(**literal))
                .count();
            assert_eq!(count, self.true_counts[constraint_id], "stale truth count");
            let threatened =
                constraint.is_enabled(&model) && !constraint.is_satisfied(count, &model);
            assert_eq!(
                threatened,
                self.unsat.contains(constraint_id),
                "unsat set out of sync for {constraint}"
            );
        }

        let mut utility = 0.0;
        for (proposition, record) in self.propositions.entries() {
            if self.solution.values[proposition] {
                utility += record.utility;
            }
        }
        assert!(
            (utility - self.solution.utility).abs() < 1e-9,
            "utility drifted"
        );

        for proposition in self.variables.keys() {
            let record = &self.propositions[proposition];
            let improves = !self.variables[proposition].is_predetermined()
                && if self.solution.values[proposition] {
                    record.utility < 0.0
                } else {
                    record.utility > 0.0
                };
            assert_eq!(
                improves,
                self.improvable.contains(proposition),
                "improvable set out of sync"
            );
        }
        true
    }
}

/// The window used by the initialization forcing: plain disjunctions and unconditional
/// cardinalities. Conditional constraints may be switched off by their guard, and custom
/// constraints have no window, so neither can force values this early.
fn forcing_window(constraint: &Constraint) -> Option<(usize, usize)> {
    match constraint.kind {
        ConstraintKind::Disjunction | ConstraintKind::Cardinality { .. } => constraint.window(),
        ConstraintKind::Conditional { .. } | ConstraintKind::Custom(_) => None,
    }
}

use std::fmt::Debug;
use std::fmt::Formatter;

use log::debug;
use log::trace;
use log::warn;

use crate::asserts::sphynx_assert_moderate;
use crate::basic_types::ContradictionSubject;
use crate::basic_types::HashMap;
use crate::basic_types::HashSet;
use crate::basic_types::KeyedVec;
use crate::basic_types::Solution;
use crate::basic_types::SphynxError;
use crate::basic_types::XorShiftRandom;
use crate::engine::constraints::Constraint;
use crate::engine::constraints::ConstraintId;
use crate::engine::constraints::CustomConstraint;
use crate::engine::rules;
use crate::engine::rules::Rule;
use crate::engine::theory::TheoryRegistry;
use crate::engine::theory::TheorySolver;
use crate::engine::unit_resolution;
use crate::engine::variables::DeterminationState;
use crate::engine::variables::Literal;
use crate::engine::variables::Name;
use crate::engine::variables::Proposition;
use crate::engine::variables::PropositionId;
use crate::engine::variables::SatVariable;
use crate::engine::variables::FALSE_NAME;
use crate::engine::variables::TRUE_NAME;
use crate::engine::walk_sat::SearchGoal;
use crate::engine::walk_sat::WalkSat;
use crate::engine::SolveStats;
use crate::engine::SolverOptions;

type InitHook = Box<dyn FnMut(&mut Preinitializer<'_>)>;

/// A satisfiability problem over named propositions and generalized cardinality constraints.
///
/// The workflow is: intern propositions with [proposition](Problem::proposition), constrain them
/// with the assertion and quantification methods, then call [solve](Problem::solve) as many
/// times as fresh models are needed. Solving is stochastic and incomplete: a
/// [Timeout](SphynxError::Timeout) means the flip budget ran out, not that no model exists.
///
/// ```rust
/// use sphynx::Problem;
///
/// let mut problem = Problem::default();
/// let a = problem.proposition("a");
/// let b = problem.proposition("b");
/// let c = problem.proposition("c");
/// problem.unique(&[a.into(), b.into(), c.into()]).unwrap();
///
/// let solution = problem.solve().unwrap();
/// assert_eq!(solution.count(&[a.into(), b.into(), c.into()]), 1);
/// ```
///
/// Problems are single-threaded; different problems may be solved concurrently from different
/// threads. Each problem owns its random generator, seeded with 0 by default for
/// reproducibility; see [set_seed_from_clock](Problem::set_seed_from_clock).
pub struct Problem {
    propositions: KeyedVec<PropositionId, Proposition>,
    variables: KeyedVec<PropositionId, SatVariable>,
    constraints: KeyedVec<ConstraintId, Constraint>,
    /// Name interning: the same name always maps to the same proposition.
    names: HashMap<Name, PropositionId>,
    /// Hash buckets for constraint de-duplication.
    constraints_by_hash: HashMap<u64, Vec<ConstraintId>>,
    /// Interned conjunction propositions, keyed by their canonicalized body.
    conjunctions: HashMap<Box<[Literal]>, PropositionId>,
    /// Rules collected so far; compiled to constraints on the first solve.
    rules: Vec<Rule>,
    /// Whether compilation must verify the rule program is tight.
    tight: bool,
    compiled: bool,
    /// Memoized list of propositions the search may flip; `None` when stale.
    floating: Option<Vec<PropositionId>>,
    options: SolverOptions,
    random: XorShiftRandom,
    theories: TheoryRegistry,
    init_hook: Option<InitHook>,
    /// Final truth values of the last successful solve, for continue-previous-search starts.
    previous_values: Option<KeyedVec<PropositionId, bool>>,
    stats: SolveStats,
}

impl Default for Problem {
    fn default() -> Self {
        Problem::new()
    }
}

impl Debug for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("propositions", &self.propositions.len())
            .field("constraints", &self.constraints.len())
            .field("rules", &self.rules.len())
            .field("compiled", &self.compiled)
            .finish_non_exhaustive()
    }
}

/// Construction.
impl Problem {
    pub fn new() -> Self {
        Problem::with_options(SolverOptions::default())
    }

    pub fn with_options(options: SolverOptions) -> Self {
        Problem {
            propositions: KeyedVec::default(),
            variables: KeyedVec::default(),
            constraints: KeyedVec::default(),
            names: HashMap::default(),
            constraints_by_hash: HashMap::default(),
            conjunctions: HashMap::default(),
            rules: Vec::new(),
            tight: true,
            compiled: false,
            floating: None,
            options,
            random: XorShiftRandom::with_seed(0),
            theories: TheoryRegistry::default(),
            init_hook: None,
            previous_values: None,
            stats: SolveStats::default(),
        }
    }

    /// Intern a proposition by name, creating it on first use. The names `true` and `false` are
    /// reserved for the truth constants (see [constant](Problem::constant)).
    pub fn proposition(&mut self, name: impl Into<Name>) -> PropositionId {
        let name = name.into();
        if let Some(&existing) = self.names.get(&name) {
            return existing;
        }
        self.add_proposition(name, false)
    }

    /// The proposition interned under `name`, if any.
    pub fn find_proposition(&self, name: &Name) -> Option<PropositionId> {
        self.names.get(name).copied()
    }

    /// The name `proposition` was interned under.
    pub fn name(&self, proposition: PropositionId) -> &Name {
        &self.propositions[proposition].name
    }

    /// A literal that always has the given truth value, backed by an interned internal
    /// proposition fixed to it. Useful as a neutral element when literal lists are built
    /// programmatically.
    pub fn constant(&mut self, value: bool) -> Literal {
        let name = if value {
            TRUE_NAME.clone()
        } else {
            FALSE_NAME.clone()
        };
        let id = match self.names.get(&name) {
            Some(&id) => id,
            None => {
                let id = self.add_proposition(name, true);
                self.variables[id].state = DeterminationState::Fixed;
                self.variables[id].predetermined_value = value;
                id
            }
        };
        Literal::positive(id)
    }

    /// The probability that `proposition` starts out true in a random initial assignment.
    /// Defaults to one half.
    pub fn set_initial_probability(
        &mut self,
        proposition: PropositionId,
        probability: f64,
    ) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(SphynxError::InvalidArgument(format!(
                "initial probability must lie in [0, 1], got {probability}"
            )));
        }
        self.propositions[proposition].initial_probability = probability;
        Ok(())
    }

    /// The utility `proposition` contributes to a solution when true. Defaults to zero.
    pub fn set_utility(
        &mut self,
        proposition: PropositionId,
        utility: f64,
    ) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        if !utility.is_finite() {
            return Err(SphynxError::InvalidArgument(format!(
                "utility must be finite, got {utility}"
            )));
        }
        self.propositions[proposition].utility = utility;
        Ok(())
    }

    /// Internal propositions are omitted from [Solution::model]. Rule-compilation auxiliaries
    /// are marked internal automatically.
    pub fn set_internal(
        &mut self,
        proposition: PropositionId,
        internal: bool,
    ) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        self.propositions[proposition].internal = internal;
        Ok(())
    }

    /// Whether compilation verifies that no proposition depends positively on itself through
    /// rule bodies. On by default; switching it off skips the check and with it the completion
    /// guarantee for cyclic programs.
    pub fn set_tight(&mut self, tight: bool) {
        self.tight = tight;
    }

    pub fn num_propositions(&self) -> usize {
        self.propositions.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// All propositions, internal ones included, in ascending index order.
    pub fn propositions(&self) -> impl Iterator<Item = PropositionId> {
        self.propositions.keys()
    }

    fn add_proposition(&mut self, name: Name, internal: bool) -> PropositionId {
        let mut record = Proposition::named(name.clone());
        record.internal = internal;
        let id = self.propositions.push(record);
        let mirror = self.variables.push(SatVariable::default());
        sphynx_assert_moderate!(id == mirror);
        let _ = self.names.insert(name, id);
        self.floating = None;
        id
    }

    fn validate_proposition(&self, proposition: PropositionId) -> Result<(), SphynxError> {
        if self.variables.contains_key(&proposition) {
            Ok(())
        } else {
            Err(SphynxError::InvalidArgument(format!(
                "proposition {proposition} does not belong to this problem"
            )))
        }
    }

    fn validate_literal(&self, literal: Literal) -> Result<(), SphynxError> {
        self.validate_proposition(literal.proposition())
    }
}

/// Predetermined values.
impl Problem {
    /// Permanently fix the literal's proposition so the literal holds. Asserting both a literal
    /// and its negation is a contradiction; asserting the same literal twice is a no-op.
    pub fn assert_literal(&mut self, literal: Literal) -> Result<(), SphynxError> {
        self.validate_literal(literal)?;
        let value = literal.is_positive();
        let proposition = literal.proposition();
        let variable = &mut self.variables[proposition];
        if variable.state == DeterminationState::Fixed {
            if variable.predetermined_value != value {
                return Err(SphynxError::Contradiction {
                    subject: ContradictionSubject::Proposition(proposition),
                    reason: format!(
                        "{} is already fixed to {}, cannot assert {literal}",
                        self.propositions[proposition].name, variable.predetermined_value
                    ),
                });
            }
            return Ok(());
        }
        variable.state = DeterminationState::Fixed;
        variable.predetermined_value = value;
        self.floating = None;
        Ok(())
    }

    /// Override the proposition's value for every solve until
    /// [reset_proposition](Problem::reset_proposition) (or
    /// [reset_propositions](Problem::reset_propositions)) is called. Fails on a
    /// [Fixed](DeterminationState::Fixed) proposition with the opposite value.
    pub fn set_predetermined(
        &mut self,
        proposition: PropositionId,
        value: bool,
    ) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        let variable = &mut self.variables[proposition];
        if variable.state == DeterminationState::Fixed {
            if variable.predetermined_value != value {
                return Err(SphynxError::Contradiction {
                    subject: ContradictionSubject::Proposition(proposition),
                    reason: format!(
                        "{} is already fixed to the opposite value",
                        self.propositions[proposition].name
                    ),
                });
            }
            return Ok(());
        }
        variable.state = DeterminationState::Set;
        variable.predetermined_value = value;
        self.floating = None;
        Ok(())
    }

    /// Pin the proposition's value for the next solve only. Longer-lived determinations
    /// (fixed, set, inferred) take precedence and are left untouched.
    pub fn preinitialize(
        &mut self,
        proposition: PropositionId,
        value: bool,
    ) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        preinitialize_row(&mut self.variables[proposition], value);
        self.floating = None;
        Ok(())
    }

    /// Return the proposition to the solver's control. Fixed propositions stay fixed.
    pub fn reset_proposition(&mut self, proposition: PropositionId) -> Result<(), SphynxError> {
        self.validate_proposition(proposition)?;
        let variable = &mut self.variables[proposition];
        if variable.state != DeterminationState::Fixed {
            variable.state = DeterminationState::Floating;
            self.floating = None;
        }
        Ok(())
    }

    /// Return every non-fixed proposition to the solver's control.
    pub fn reset_propositions(&mut self) {
        for variable in self.variables.iter_mut() {
            if variable.state != DeterminationState::Fixed {
                variable.state = DeterminationState::Floating;
            }
        }
        self.floating = None;
    }

    pub fn determination(&self, proposition: PropositionId) -> DeterminationState {
        self.variables[proposition].state
    }

    pub fn is_predetermined(&self, proposition: PropositionId) -> bool {
        self.variables[proposition].is_predetermined()
    }

    /// The value the proposition is predetermined to, if it is predetermined at all.
    pub fn predetermined_value(&self, proposition: PropositionId) -> Option<bool> {
        let variable = &self.variables[proposition];
        variable
            .is_predetermined()
            .then_some(variable.predetermined_value)
    }

    /// Install a callback invoked at the start of every solve. The callback may pin values for
    /// the upcoming solve through the [Preinitializer] it receives; pinned values last exactly
    /// that one solve.
    pub fn on_initialize(&mut self, hook: impl FnMut(&mut Preinitializer<'_>) + 'static) {
        self.init_hook = Some(Box::new(hook));
    }
}

/// Constraints.
impl Problem {
    /// Require between `min` and `max` of `literals` to hold; `None` places no upper bound.
    ///
    /// Duplicate literals are dropped, literals over fixed propositions are folded into the
    /// window, and degenerate windows short-circuit: a window that admits no more true literals
    /// fixes the remainder false, one that needs every remaining literal fixes them true.
    pub fn quantify(
        &mut self,
        min: usize,
        max: Option<usize>,
        literals: &[Literal],
    ) -> Result<(), SphynxError> {
        if let Some(max) = max {
            if min > max {
                return Err(SphynxError::InvalidArgument(format!(
                    "quantification window is empty: min {min} exceeds max {max}"
                )));
            }
        }
        if literals.is_empty() {
            return if min == 0 {
                Ok(())
            } else {
                Err(SphynxError::InvalidArgument(format!(
                    "cannot require {min} of zero literals"
                )))
            };
        }
        let (disjuncts, constant_true) = self.prepare_disjuncts(literals)?;

        let min_effective = min.saturating_sub(constant_true);
        let max_effective = match max {
            Some(max) if max < constant_true => {
                return Err(SphynxError::Contradiction {
                    subject: ContradictionSubject::Proposition(
                        literals[0].proposition(),
                    ),
                    reason: format!(
                        "at most {max} of the literals may hold, but {constant_true} are \
                         already fixed true"
                    ),
                });
            }
            Some(max) => Some(max - constant_true),
            None => None,
        };
        if min_effective > disjuncts.len() {
            return Err(SphynxError::Contradiction {
                subject: ContradictionSubject::Proposition(literals[0].proposition()),
                reason: format!(
                    "at least {min} of the literals must hold, but only {} remain undetermined",
                    disjuncts.len()
                ),
            });
        }

        // Saturated window: every remaining literal must be false.
        if max_effective == Some(0) {
            for literal in disjuncts {
                self.assert_literal(!literal)?;
            }
            return Ok(());
        }
        // Window needing everything that is left: every remaining literal must be true.
        if min_effective == disjuncts.len() && min_effective > 0 {
            for literal in disjuncts {
                self.assert_literal(literal)?;
            }
            return Ok(());
        }

        let max_bound = max_effective
            .unwrap_or(disjuncts.len())
            .min(disjuncts.len());
        if min_effective == 0 && max_bound == disjuncts.len() {
            trace!("dropping trivially satisfied quantification");
            return Ok(());
        }

        let constraint = if min_effective == 1 && max_bound == disjuncts.len() {
            Constraint::disjunction(disjuncts.into_boxed_slice())
        } else {
            Constraint::cardinality(disjuncts.into_boxed_slice(), min_effective, max_bound)
        };
        let _ = self.add_constraint(constraint);
        Ok(())
    }

    /// [quantify](Problem::quantify) with the legacy upper-bound convention: `max == 0` means
    /// "no upper bound". Kept for callers porting code that used the zero sentinel; new code
    /// should pass the bound explicitly.
    pub fn quantify_sentinel(
        &mut self,
        min: usize,
        max: usize,
        literals: &[Literal],
    ) -> Result<(), SphynxError> {
        let max = if max == 0 { None } else { Some(max) };
        self.quantify(min, max, literals)
    }

    /// A cardinality window that is only imposed while `guard` is false; a true guard switches
    /// the constraint off. The guard's proposition must not occur among the literals.
    pub fn quantify_unless(
        &mut self,
        guard: Literal,
        min: usize,
        max: Option<usize>,
        literals: &[Literal],
    ) -> Result<(), SphynxError> {
        self.validate_literal(guard)?;
        if let Some(max) = max {
            if min > max {
                return Err(SphynxError::InvalidArgument(format!(
                    "quantification window is empty: min {min} exceeds max {max}"
                )));
            }
        }
        if literals
            .iter()
            .any(|literal| literal.proposition() == guard.proposition())
        {
            return Err(SphynxError::InvalidArgument(format!(
                "guard {guard} cannot also occur as a disjunct"
            )));
        }
        let (disjuncts, constant_true) = self.prepare_disjuncts(literals)?;

        let min_effective = min.saturating_sub(constant_true);
        let window_impossible = match max {
            Some(max) => max < constant_true || min_effective > disjuncts.len(),
            None => min_effective > disjuncts.len(),
        };
        if window_impossible {
            // The window can never hold, so any model has to satisfy the guard instead.
            let _ = self.add_constraint(Constraint::disjunction(vec![guard].into_boxed_slice()));
            return Ok(());
        }
        let max_bound = max
            .map(|max| max - constant_true)
            .unwrap_or(disjuncts.len())
            .min(disjuncts.len());
        if min_effective == 0 && max_bound == disjuncts.len() {
            trace!("dropping trivially satisfied conditional quantification");
            return Ok(());
        }
        let constraint = Constraint::conditional(
            guard,
            disjuncts.into_boxed_slice(),
            min_effective,
            max_bound,
        );
        let _ = self.add_constraint(constraint);
        Ok(())
    }

    /// Forbid `literals` from all holding at once.
    pub fn inconsistent(&mut self, literals: &[Literal]) -> Result<(), SphynxError> {
        let negations: Vec<Literal> = literals.iter().map(|literal| !*literal).collect();
        self.quantify(1, None, &negations)
    }

    /// Require every one of `literals` to hold.
    pub fn all(&mut self, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(literals.len(), Some(literals.len()), literals)
    }

    /// Require at least one of `literals` to hold.
    pub fn exists(&mut self, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(1, None, literals)
    }

    /// Require exactly one of `literals` to hold.
    pub fn unique(&mut self, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(1, Some(1), literals)
    }

    /// Require exactly `n` of `literals` to hold.
    pub fn exactly(&mut self, n: usize, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(n, Some(n), literals)
    }

    /// Require at most `n` of `literals` to hold.
    pub fn at_most(&mut self, n: usize, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(0, Some(n), literals)
    }

    /// Require at least `n` of `literals` to hold.
    pub fn at_least(&mut self, n: usize, literals: &[Literal]) -> Result<(), SphynxError> {
        self.quantify(n, None, literals)
    }

    /// Assert that the conjunction of `body` implies `head`.
    pub fn assert_implication(
        &mut self,
        body: &[Literal],
        head: Literal,
    ) -> Result<(), SphynxError> {
        self.validate_literal(head)?;
        let mut disjuncts = vec![head];
        for &literal in body {
            self.validate_literal(literal)?;
            disjuncts.push(!literal);
        }
        self.quantify(1, None, &disjuncts)
    }

    /// Assert that `head` holds exactly when the whole of `body` holds.
    pub fn assert_biconditional(
        &mut self,
        head: Literal,
        body: &[Literal],
    ) -> Result<(), SphynxError> {
        self.validate_literal(head)?;
        // head implies each body literal...
        for &literal in body {
            self.validate_literal(literal)?;
            self.quantify(1, None, &[!head, literal])?;
        }
        // ...and the body together implies the head.
        self.assert_implication(body, head)
    }

    /// Record the rule `head ⇐ body`: the conjunction of `body` is one justification for
    /// `head`. Rules compile on the first solve under completion semantics (each justification
    /// implies the head; a true head requires some justification), which demands a tight
    /// program unless [set_tight](Problem::set_tight) disabled the check.
    pub fn assert_rule(
        &mut self,
        head: PropositionId,
        body: &[Literal],
    ) -> Result<(), SphynxError> {
        self.validate_proposition(head)?;
        for &literal in body {
            self.validate_literal(literal)?;
        }
        if self.compiled {
            return Err(SphynxError::InvalidArgument(
                "rules cannot be added after the problem has been compiled".to_owned(),
            ));
        }
        if body.is_empty() {
            return Err(SphynxError::InvalidArgument(
                "a rule needs at least one body literal".to_owned(),
            ));
        }
        let body_literal = if body.len() == 1 {
            body[0]
        } else {
            self.conjunction(body)?
        };
        let positive_dependencies: Vec<PropositionId> = body
            .iter()
            .filter(|literal| literal.is_positive())
            .map(|literal| literal.proposition())
            .collect();
        self.propositions[head]
            .dependencies
            .extend(positive_dependencies);
        self.rules.push(Rule {
            head,
            body: body_literal,
        });
        Ok(())
    }

    /// Register a [CustomConstraint] over `literals`.
    pub fn add_custom_constraint(
        &mut self,
        literals: &[Literal],
        custom: Box<dyn CustomConstraint>,
    ) -> Result<(), SphynxError> {
        let mut seen: HashSet<Literal> = HashSet::default();
        let mut disjuncts = Vec::with_capacity(literals.len());
        for &literal in literals {
            self.validate_literal(literal)?;
            if seen.insert(literal) {
                disjuncts.push(literal);
            }
        }
        if disjuncts.is_empty() {
            return Err(SphynxError::InvalidArgument(
                "a custom constraint needs at least one disjunct".to_owned(),
            ));
        }
        let _ = self.add_constraint(Constraint::custom(disjuncts.into_boxed_slice(), custom));
        Ok(())
    }

    /// Validate and de-duplicate a literal list, folding out literals over fixed propositions.
    /// Returns the remaining disjuncts and how many folded literals were fixed true.
    fn prepare_disjuncts(
        &mut self,
        literals: &[Literal],
    ) -> Result<(Vec<Literal>, usize), SphynxError> {
        let mut seen: HashSet<Literal> = HashSet::default();
        let mut disjuncts = Vec::with_capacity(literals.len());
        let mut constant_true = 0usize;
        for &literal in literals {
            self.validate_literal(literal)?;
            if !seen.insert(literal) {
                continue;
            }
            let variable = &self.variables[literal.proposition()];
            if variable.state == DeterminationState::Fixed {
                if variable.predetermined_value == literal.is_positive() {
                    constant_true += 1;
                }
                continue;
            }
            disjuncts.push(literal);
        }
        Ok((disjuncts, constant_true))
    }

    /// Intern an internal proposition equivalent to the conjunction of `body`.
    fn conjunction(&mut self, body: &[Literal]) -> Result<Literal, SphynxError> {
        let mut canonical: Vec<Literal> = body.to_vec();
        canonical.sort_by_key(|literal| literal.signed_index());
        canonical.dedup();
        if let Some(&existing) = self.conjunctions.get(canonical.as_slice()) {
            return Ok(Literal::positive(existing));
        }

        let arguments: Vec<Name> = canonical
            .iter()
            .map(|literal| {
                let name = self.propositions[literal.proposition()].name.clone();
                if literal.is_positive() {
                    name
                } else {
                    Name::call("not", [name])
                }
            })
            .collect();
        let id = self.add_proposition(Name::call("and", arguments), true);

        // The proposition implies each conjunct, and the conjuncts together imply it.
        for &literal in &canonical {
            self.quantify(1, None, &[Literal::negative(id), literal])?;
        }
        let mut reverse = vec![Literal::positive(id)];
        reverse.extend(canonical.iter().map(|literal| !*literal));
        self.quantify(1, None, &reverse)?;

        let _ = self
            .conjunctions
            .insert(canonical.into_boxed_slice(), id);
        Ok(Literal::positive(id))
    }

    /// Register a constraint, de-duplicating against structurally equal ones. Returns the new
    /// id, or `None` when an equivalent constraint already exists.
    fn add_constraint(&mut self, constraint: Constraint) -> Option<ConstraintId> {
        if constraint.disjuncts.is_empty() {
            warn!("registering an empty constraint, unusual!");
        }
        if let Some(bucket) = self.constraints_by_hash.get(&constraint.hash) {
            for &existing in bucket {
                if self.constraints[existing].structurally_equal(&constraint) {
                    trace!("dropping duplicate constraint {constraint}");
                    return None;
                }
            }
        }

        let hash = constraint.hash;
        let guard = constraint.guard();
        let id = self.constraints.push(constraint);
        self.constraints_by_hash.entry(hash).or_default().push(id);

        for position in 0..self.constraints[id].disjuncts.len() {
            let literal = self.constraints[id].disjuncts[position];
            let variable = &mut self.variables[literal.proposition()];
            if literal.is_positive() {
                variable.positive_occurrences.push(id);
            } else {
                variable.negative_occurrences.push(id);
            }
        }
        if let Some(guard) = guard {
            self.variables[guard.proposition()].guarding.push(id);
        }
        Some(id)
    }
}

/// Theory solvers.
impl Problem {
    /// Register a theory solver. At most one solver per concrete type.
    pub fn register_theory<T: TheorySolver>(&mut self, solver: T) -> Result<(), SphynxError> {
        if self.theories.register(solver) {
            Ok(())
        } else {
            Err(SphynxError::InvalidArgument(format!(
                "a theory solver of type {} is already registered",
                std::any::type_name::<T>()
            )))
        }
    }

    /// The registered theory solver of type `T`, if any.
    pub fn theory<T: TheorySolver>(&self) -> Option<&T> {
        self.theories.get::<T>()
    }

    pub fn theory_mut<T: TheorySolver>(&mut self) -> Option<&mut T> {
        self.theories.get_mut::<T>()
    }
}

/// Solving.
impl Problem {
    /// Run unit resolution: disjunctions left with a single undetermined literal under the
    /// current `Fixed`/`Set` determinations force that literal, transitively. Forced
    /// propositions are marked [Inferred](DeterminationState::Inferred); earlier inferences are
    /// recomputed from scratch. Fails with a contradiction when a disjunction has no literal
    /// left that could hold.
    pub fn optimize(&mut self) -> Result<(), SphynxError> {
        self.ensure_compiled()?;
        let _ = unit_resolution::infer_predetermined(&self.constraints, &mut self.variables)?;
        self.floating = None;
        Ok(())
    }

    /// Find a satisfying assignment within the configured flip budget.
    pub fn solve(&mut self) -> Result<Solution, SphynxError> {
        let budget = self.options.max_flips;
        self.solve_internal(SearchGoal::Satisfy, budget)
    }

    /// Like [solve](Problem::solve), but budget exhaustion yields `None` instead of the
    /// [Timeout](SphynxError::Timeout) error.
    pub fn try_solve(&mut self) -> Result<Option<Solution>, SphynxError> {
        match self.solve() {
            Ok(solution) => Ok(Some(solution)),
            Err(SphynxError::Timeout) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Find a satisfying assignment and then climb toward higher utility within `flip_budget`,
    /// returning the best satisfying model observed. The climb flips utility-improving
    /// propositions even when that breaks constraints, repairing afterwards; it ends at a local
    /// optimum or when the budget is exhausted.
    pub fn high_utility_solution(&mut self, flip_budget: usize) -> Result<Solution, SphynxError> {
        self.solve_internal(SearchGoal::MaximizeUtility, flip_budget)
    }

    /// Statistics of the most recent solve.
    pub fn last_stats(&self) -> SolveStats {
        self.stats
    }

    fn solve_internal(
        &mut self,
        goal: SearchGoal,
        flip_budget: usize,
    ) -> Result<Solution, SphynxError> {
        self.ensure_compiled()?;
        self.run_init_hook();
        if self.floating.is_none() {
            self.rebuild_floating();
        }

        let mut solution = self.blank_solution();
        let mut theories = std::mem::take(&mut self.theories);
        for solver in theories.solvers_mut() {
            solver.propagate_predetermined(&mut solution);
        }

        let (outcome, stats) = {
            let Problem {
                propositions,
                variables,
                constraints,
                floating,
                options,
                random,
                previous_values,
                ..
            } = self;
            let floating: &[PropositionId] = floating.as_deref().unwrap_or(&[]);
            let previous = previous_values
                .as_ref()
                .filter(|previous| previous.len() == variables.len());
            let mut search = WalkSat::new(
                propositions,
                variables,
                constraints,
                floating,
                options,
                random,
                &mut theories,
                &mut solution,
                previous,
                flip_budget,
            );
            let outcome = search.run(goal);
            (outcome, search.stats())
        };
        self.theories = theories;
        self.stats = stats;
        debug!(
            "search finished: {} flips, {} restarts, final noise {:.3}",
            stats.flips, stats.restarts, stats.final_noise
        );

        // Preinitialized determinations last exactly one solve, successful or not.
        let mut any_reverted = false;
        for variable in self.variables.iter_mut() {
            if variable.state == DeterminationState::Preinitialized {
                variable.state = DeterminationState::Floating;
                any_reverted = true;
            }
        }
        if any_reverted {
            self.floating = None;
        }

        match outcome {
            Ok(()) => {
                self.previous_values = Some(solution.values.clone());
                Ok(solution)
            }
            Err(_) => Err(SphynxError::Timeout),
        }
    }

    /// Compile the problem if it has not been compiled yet: check tightness, expand rules into
    /// their completion, and let registered theory solvers preprocess. Idempotent.
    fn ensure_compiled(&mut self) -> Result<(), SphynxError> {
        if self.compiled {
            return Ok(());
        }
        if self.tight {
            rules::check_tightness(&self.propositions)?;
        }
        self.compile_rules()?;

        let mut theories = std::mem::take(&mut self.theories);
        let mut preprocess_result = Ok(());
        for solver in theories.solvers_mut() {
            if let Err(error) = solver.preprocess(self) {
                preprocess_result = Err(error);
                break;
            }
        }
        self.theories = theories;
        preprocess_result?;

        self.compiled = true;
        debug!(
            "compiled problem: {} propositions, {} constraints",
            self.propositions.len(),
            self.constraints.len()
        );
        Ok(())
    }

    /// Expand the collected rules under completion semantics.
    fn compile_rules(&mut self) -> Result<(), SphynxError> {
        let rules = std::mem::take(&mut self.rules);
        if rules.is_empty() {
            return Ok(());
        }
        // Forward direction: each justification implies its head.
        for rule in &rules {
            self.quantify(1, None, &[Literal::positive(rule.head), !rule.body])?;
        }
        // Completion: a true head requires at least one of its justifications.
        let mut heads: Vec<PropositionId> = Vec::new();
        let mut bodies: HashMap<PropositionId, Vec<Literal>> = HashMap::default();
        for rule in &rules {
            let entry = bodies.entry(rule.head).or_default();
            if entry.is_empty() {
                heads.push(rule.head);
            }
            entry.push(rule.body);
        }
        for head in heads {
            let mut support = vec![Literal::negative(head)];
            support.extend(&bodies[&head]);
            self.quantify(1, None, &support)?;
        }
        debug!("expanded {} rule(s)", rules.len());
        Ok(())
    }

    fn run_init_hook(&mut self) {
        if let Some(mut hook) = self.init_hook.take() {
            {
                let mut preinitializer = Preinitializer {
                    variables: &mut self.variables,
                };
                hook(&mut preinitializer);
            }
            self.init_hook = Some(hook);
            self.floating = None;
        }
    }

    fn rebuild_floating(&mut self) {
        let floating: Vec<PropositionId> = self
            .variables
            .entries()
            .filter(|(_, variable)| !variable.is_predetermined())
            .map(|(proposition, _)| proposition)
            .collect();
        self.floating = Some(floating);
    }

    /// A solution shell carrying the predetermined truth values.
    fn blank_solution(&self) -> Solution {
        let mut values = KeyedVec::filled_with(self.variables.len(), false);
        let mut internal = KeyedVec::filled_with(self.propositions.len(), false);
        for (proposition, variable) in self.variables.entries() {
            if variable.is_predetermined() {
                values[proposition] = variable.predetermined_value;
            }
        }
        for (proposition, record) in self.propositions.entries() {
            internal[proposition] = record.internal;
        }
        Solution::new(values, internal)
    }
}

/// Random seeding.
impl Problem {
    /// Reseed the problem's random generator, making subsequent solves reproducible.
    pub fn set_seed(&mut self, seed: u32) {
        self.random.set_seed(seed);
    }

    /// Reseed from the wall clock. The chosen seed is observable through
    /// [seed](Problem::seed).
    pub fn set_seed_from_clock(&mut self) {
        self.random.set_seed_from_clock();
    }

    /// The seed the generator was last seeded with.
    pub fn seed(&self) -> u32 {
        self.random.seed()
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SolverOptions {
        &mut self.options
    }
}

/// Scoped access handed to the [Problem::on_initialize] callback; values pinned here hold for
/// the one solve that is about to start.
#[derive(Debug)]
pub struct Preinitializer<'a> {
    variables: &'a mut KeyedVec<PropositionId, SatVariable>,
}

impl Preinitializer<'_> {
    /// Pin `proposition` to `value` for the upcoming solve. Longer-lived determinations win and
    /// are left untouched.
    pub fn preinitialize(&mut self, proposition: PropositionId, value: bool) {
        preinitialize_row(&mut self.variables[proposition], value);
    }
}

fn preinitialize_row(variable: &mut SatVariable, value: bool) {
    match variable.state {
        DeterminationState::Floating | DeterminationState::Preinitialized => {
            variable.state = DeterminationState::Preinitialized;
            variable.predetermined_value = value;
        }
        DeterminationState::Fixed | DeterminationState::Set | DeterminationState::Inferred => {}
    }
}

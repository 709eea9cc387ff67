use std::any::Any;
use std::any::TypeId;
use std::fmt::Debug;

use super::HashMap;
use super::KeyedVec;
use crate::engine::variables::Literal;
use crate::engine::variables::PropositionId;

/// A satisfying truth assignment produced by [Problem::solve](crate::Problem::solve).
///
/// A solution owns its truth array, its utility, and any values written by theory solvers; it
/// stays valid however the problem is used afterwards, and solutions from different solves are
/// independent of one another.
///
/// All query methods are pure functions of the stored truth array.
#[derive(Debug)]
pub struct Solution {
    pub(crate) values: KeyedVec<PropositionId, bool>,
    pub(crate) internal: KeyedVec<PropositionId, bool>,
    pub(crate) utility: f64,
    pub(crate) theory_values: TheoryValueStore,
}

impl Solution {
    pub(crate) fn new(
        values: KeyedVec<PropositionId, bool>,
        internal: KeyedVec<PropositionId, bool>,
    ) -> Self {
        Solution {
            values,
            internal,
            utility: 0.0,
            theory_values: TheoryValueStore::default(),
        }
    }

    /// The truth value assigned to `proposition`.
    pub fn value(&self, proposition: PropositionId) -> bool {
        self.values[proposition]
    }

    /// Whether `literal` holds in this solution. Accepts a [PropositionId] as the positive
    /// literal.
    pub fn is_true(&self, literal: impl Into<Literal>) -> bool {
        let literal = literal.into();
        self.values[literal.proposition()] == literal.is_positive()
    }

    /// How many of `literals` hold.
    pub fn count(&self, literals: &[Literal]) -> usize {
        literals
            .iter()
            .filter(|literal| self.is_true(**literal))
            .count()
    }

    /// Whether between `min` and `max` of `literals` hold. `None` means no upper bound.
    pub fn quantify(&self, min: usize, max: Option<usize>, literals: &[Literal]) -> bool {
        let holding = self.count(literals);
        holding >= min && max.map_or(true, |max| holding <= max)
    }

    /// Whether every one of `literals` holds.
    pub fn all(&self, literals: &[Literal]) -> bool {
        self.count(literals) == literals.len()
    }

    /// Whether at least one of `literals` holds.
    pub fn exists(&self, literals: &[Literal]) -> bool {
        self.count(literals) >= 1
    }

    /// Whether exactly one of `literals` holds.
    pub fn unique(&self, literals: &[Literal]) -> bool {
        self.count(literals) == 1
    }

    /// Whether exactly `n` of `literals` hold.
    pub fn exactly(&self, n: usize, literals: &[Literal]) -> bool {
        self.count(literals) == n
    }

    /// Whether at most `n` of `literals` hold.
    pub fn at_most(&self, n: usize, literals: &[Literal]) -> bool {
        self.count(literals) <= n
    }

    /// Whether at least `n` of `literals` hold.
    pub fn at_least(&self, n: usize, literals: &[Literal]) -> bool {
        self.count(literals) >= n
    }

    /// Sum of the utilities of the true propositions.
    pub fn utility(&self) -> f64 {
        self.utility
    }

    /// The true, non-internal propositions, in ascending index order.
    pub fn model(&self) -> impl Iterator<Item = PropositionId> + '_ {
        self.values
            .entries()
            .filter(|(proposition, value)| **value && !self.internal[*proposition])
            .map(|(proposition, _)| proposition)
    }

    /// Store a value computed by a theory solver, keyed by its type.
    pub fn set_theory_value<T: TheoryValue>(&mut self, value: T) {
        self.theory_values.insert(value);
    }

    /// Retrieve a value previously stored by a theory solver.
    pub fn theory_value<T: TheoryValue>(&self) -> Option<&T> {
        self.theory_values.get::<T>()
    }
}

impl Clone for Solution {
    fn clone(&self) -> Self {
        Solution {
            values: self.values.clone(),
            internal: self.internal.clone(),
            utility: self.utility,
            theory_values: self.theory_values.clone(),
        }
    }
}

/// A value a theory solver can attach to a [Solution]. Blanket-implemented for any cloneable
/// `'static` type.
pub trait TheoryValue: Any + Debug {
    fn clone_boxed(&self) -> Box<dyn TheoryValue + 'static>;

    fn as_any(&self) -> &(dyn Any + 'static);
}

impl<T: Any + Debug + Clone> TheoryValue for T {
    fn clone_boxed(&self) -> Box<dyn TheoryValue + 'static> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &(dyn Any + 'static) {
        self
    }
}

/// Per-solution storage for theory solver results, keyed by value type.
#[derive(Debug, Default)]
pub(crate) struct TheoryValueStore {
    values: HashMap<TypeId, Box<dyn TheoryValue>>,
}

impl TheoryValueStore {
    fn insert<T: TheoryValue>(&mut self, value: T) {
        let _ = self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    fn get<T: TheoryValue>(&self) -> Option<&T> {
        let value: &Box<dyn TheoryValue> = self.values.get(&TypeId::of::<T>())?;
        value.as_ref().as_any().downcast_ref::<T>()
    }
}

impl Clone for TheoryValueStore {
    fn clone(&self) -> Self {
        TheoryValueStore {
            values: self
                .values
                .iter()
                .map(|(type_id, value)| (*type_id, value.as_ref().clone_boxed()))
                .collect(),
        }
    }
}

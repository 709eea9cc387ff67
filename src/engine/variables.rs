use std::fmt::Display;
use std::fmt::Formatter;
use std::num::NonZero;
use std::ops::Not;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::basic_types::StorageKey;
use crate::engine::constraints::ConstraintId;

/// Identifies a proposition within a [Problem](crate::Problem).
///
/// Indices are stable, start at 1, and are assigned in interning order. The zero index does not
/// exist, which the representation guarantees rather than checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropositionId(pub(crate) NonZero<u32>);

impl PropositionId {
    /// The stable index of this proposition, at least 1.
    pub fn index(self) -> u32 {
        self.0.get()
    }
}

impl StorageKey for PropositionId {
    fn index(&self) -> usize {
        self.0.get() as usize - 1
    }

    fn create_from_index(index: usize) -> Self {
        PropositionId(NonZero::new(index as u32 + 1).unwrap())
    }
}

impl Display for PropositionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0.get())
    }
}

/// A signed reference to a proposition: the positive literal holds when the proposition is true,
/// the negative literal when it is false.
///
/// Encoded as a nonzero signed index, so a literal can never refer to the nonexistent
/// proposition 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Literal(NonZero<i32>);

impl Literal {
    /// The literal that holds when `proposition` is true.
    pub fn positive(proposition: PropositionId) -> Literal {
        Literal(NonZero::new(proposition.0.get() as i32).unwrap())
    }

    /// The literal that holds when `proposition` is false.
    pub fn negative(proposition: PropositionId) -> Literal {
        Literal(NonZero::new(-(proposition.0.get() as i32)).unwrap())
    }

    /// The literal over `proposition` that holds exactly when the proposition has truth value
    /// `polarity`.
    pub fn with_polarity(proposition: PropositionId, polarity: bool) -> Literal {
        if polarity {
            Literal::positive(proposition)
        } else {
            Literal::negative(proposition)
        }
    }

    /// Reconstruct a literal from its signed index. Returns `None` for zero, the one signed index
    /// that denotes no proposition.
    pub fn from_signed_index(index: i32) -> Option<Literal> {
        NonZero::new(index).map(Literal)
    }

    pub fn proposition(self) -> PropositionId {
        PropositionId(NonZero::new(self.0.get().unsigned_abs()).unwrap())
    }

    pub fn is_positive(self) -> bool {
        self.0.get() > 0
    }

    pub fn is_negative(self) -> bool {
        self.0.get() < 0
    }

    /// The signed index encoding: positive for the positive literal, negative for the negated
    /// one.
    pub fn signed_index(self) -> i32 {
        self.0.get()
    }
}

impl Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal(NonZero::new(-self.0.get()).unwrap())
    }
}

impl From<PropositionId> for Literal {
    fn from(proposition: PropositionId) -> Literal {
        Literal::positive(proposition)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_negative() {
            write!(f, "!#{}", self.proposition().index())
        } else {
            write!(f, "#{}", self.proposition().index())
        }
    }
}

/// The name under which a proposition is interned: either a plain symbol or a predicate-style
/// call. Interning the same name twice yields the same [PropositionId].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Name {
    Symbol(Arc<str>),
    Call {
        functor: Arc<str>,
        arguments: Arc<[Name]>,
    },
}

impl Name {
    /// A predicate-style name, e.g. `adjacent(cave, dragon)`.
    pub fn call(functor: impl Into<Arc<str>>, arguments: impl IntoIterator<Item = Name>) -> Name {
        Name::Call {
            functor: functor.into(),
            arguments: arguments.into_iter().collect(),
        }
    }
}

impl From<&str> for Name {
    fn from(symbol: &str) -> Name {
        Name::Symbol(Arc::from(symbol))
    }
}

impl From<String> for Name {
    fn from(symbol: String) -> Name {
        Name::Symbol(Arc::from(symbol))
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Name::Symbol(symbol) => write!(f, "{symbol}"),
            Name::Call { functor, arguments } => {
                write!(f, "{functor}(")?;
                for (position, argument) in arguments.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Name of the proposition standing in for the constant true.
pub(crate) static TRUE_NAME: Lazy<Name> = Lazy::new(|| Name::from("true"));

/// Name of the proposition standing in for the constant false.
pub(crate) static FALSE_NAME: Lazy<Name> = Lazy::new(|| Name::from("false"));

/// How a proposition's truth value is determined, if at all, before search starts.
///
/// The states form a longevity order: `Fixed` is permanent, `Set` persists until explicitly
/// reset, `Inferred` is recomputed by every run of
/// [Problem::optimize](crate::Problem::optimize), and `Preinitialized` lasts for exactly one
/// solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeterminationState {
    /// The solver chooses the value freely.
    #[default]
    Floating,
    /// Derived by unit resolution; cleared on the next optimize run.
    Inferred,
    /// A user override, mutable until explicitly reset.
    Set,
    /// The immutable consequence of an asserted literal.
    Fixed,
    /// An initial value for the next solve only; reverts to floating afterwards.
    Preinitialized,
}

/// Per-proposition bookkeeping for the user-facing atom.
#[derive(Debug, Clone)]
pub(crate) struct Proposition {
    pub(crate) name: Name,
    /// Probability of starting out true in a random initial assignment.
    pub(crate) initial_probability: f64,
    /// Contribution to a solution's utility when true.
    pub(crate) utility: f64,
    /// Internal propositions are hidden from [Solution::model](crate::Solution::model).
    pub(crate) internal: bool,
    /// Propositions this one depends on positively through rule bodies. Only populated while
    /// rules are being collected; consumed by the tightness check.
    pub(crate) dependencies: Vec<PropositionId>,
}

impl Proposition {
    pub(crate) fn named(name: Name) -> Proposition {
        Proposition {
            name,
            initial_probability: 0.5,
            utility: 0.0,
            internal: false,
            dependencies: Vec::new(),
        }
    }
}

/// Per-proposition solver row: where the proposition occurs and whether its value is already
/// decided.
#[derive(Debug, Clone, Default)]
pub(crate) struct SatVariable {
    /// Constraints in which the proposition occurs as a positive disjunct, in registration
    /// order.
    pub(crate) positive_occurrences: Vec<ConstraintId>,
    /// Constraints in which the proposition occurs as a negated disjunct, in registration order.
    pub(crate) negative_occurrences: Vec<ConstraintId>,
    /// Conditional constraints whose guard mentions the proposition.
    pub(crate) guarding: Vec<ConstraintId>,
    pub(crate) state: DeterminationState,
    /// Meaningful whenever `state` is not [DeterminationState::Floating].
    pub(crate) predetermined_value: bool,
}

impl SatVariable {
    pub(crate) fn is_predetermined(&self) -> bool {
        self.state != DeterminationState::Floating
    }

    /// The occurrence list for the given polarity.
    pub(crate) fn occurrences(&self, positive: bool) -> &[ConstraintId] {
        if positive {
            &self.positive_occurrences
        } else {
            &self.negative_occurrences
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_polarity_round_trip() {
        let p = PropositionId::create_from_index(4);
        let positive = Literal::positive(p);
        let negative = Literal::negative(p);
        assert!(positive.is_positive());
        assert!(negative.is_negative());
        assert_eq!(positive.proposition(), p);
        assert_eq!(negative.proposition(), p);
        assert_eq!(!positive, negative);
        assert_eq!(!negative, positive);
        assert_eq!(positive.signed_index(), 5);
        assert_eq!(negative.signed_index(), -5);
    }

    #[test]
    fn zero_is_not_a_literal() {
        assert!(Literal::from_signed_index(0).is_none());
        assert!(Literal::from_signed_index(1).is_some());
        assert!(Literal::from_signed_index(-1).is_some());
    }

    #[test]
    fn names_intern_structurally() {
        let a = Name::call("edge", [Name::from("x"), Name::from("y")]);
        let b = Name::call("edge", [Name::from("x"), Name::from("y")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "edge(x, y)");
        assert_ne!(a, Name::call("edge", [Name::from("y"), Name::from("x")]));
    }

    #[test]
    fn determination_defaults_to_floating() {
        let variable = SatVariable::default();
        assert!(!variable.is_predetermined());
        assert_eq!(variable.state, DeterminationState::Floating);
    }
}

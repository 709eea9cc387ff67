use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::basic_types::KeyedVec;
use crate::basic_types::Random;
use crate::basic_types::StorageKey;
use crate::engine::variables::Literal;
use crate::engine::variables::PropositionId;

/// Identifies a constraint within a problem. Indices reflect registration order after
/// de-duplication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub(crate) u32);

impl StorageKey for ConstraintId {
    fn index(&self) -> usize {
        self.0 as usize
    }

    fn create_from_index(index: usize) -> Self {
        ConstraintId(index as u32)
    }
}

impl Display for ConstraintId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A read-only view of the truth assignment under construction, handed to custom constraints.
#[derive(Debug, Clone, Copy)]
pub struct Model<'a> {
    pub(crate) values: &'a KeyedVec<PropositionId, bool>,
}

impl Model<'_> {
    pub fn value(&self, proposition: PropositionId) -> bool {
        self.values[proposition]
    }

    pub fn is_true(&self, literal: impl Into<Literal>) -> bool {
        let literal = literal.into();
        self.values[literal.proposition()] == literal.is_positive()
    }
}

/// Extension point for constraint semantics beyond cardinality windows.
///
/// A custom constraint shares the machinery of the built-in kinds: it owns an array of disjuncts,
/// the solver tracks how many of them are currently true, and satisfaction is judged through the
/// observers below. Implementations that need mutable per-search scratch state (the intended home
/// of graph-connectivity constraints and the like) should use interior mutability, updated from
/// [on_flip](CustomConstraint::on_flip); the solver only ever holds shared references to
/// constraints during search.
pub trait CustomConstraint: Debug {
    /// Whether the constraint holds when `count` of its disjuncts are true under `model`.
    fn is_satisfied(&self, count: usize, model: &Model<'_>) -> bool;

    /// Mixed into the structural hash used for constraint de-duplication. Two custom constraints
    /// over the same disjuncts with the same extra hash are considered duplicates.
    fn extra_hash(&self) -> u64;

    /// Change in "this constraint is unsatisfied" if the true-disjunct count rose from `count` to
    /// `count + 1`. The default derives it from [is_satisfied](CustomConstraint::is_satisfied).
    fn flip_risk_increasing(&self, count: usize, model: &Model<'_>) -> i32 {
        i32::from(!self.is_satisfied(count + 1, model)) - i32::from(!self.is_satisfied(count, model))
    }

    /// Change in "this constraint is unsatisfied" if the count fell from `count` to `count - 1`.
    fn flip_risk_decreasing(&self, count: usize, model: &Model<'_>) -> i32 {
        i32::from(!self.is_satisfied(count - 1, model)) - i32::from(!self.is_satisfied(count, model))
    }

    /// Notification that `proposition` (a member of this constraint's disjuncts) was flipped and
    /// now has truth value `now_true`.
    fn on_flip(&self, proposition: PropositionId, now_true: bool, model: &Model<'_>) {
        let _ = (proposition, now_true, model);
    }

    /// Pick the disjunct to flip when the solver repairs this constraint greedily. Returning
    /// `None` falls back to the built-in randomized walk over `disjuncts`.
    fn greedy_flip(
        &self,
        disjuncts: &[Literal],
        model: &Model<'_>,
        random: &mut dyn Random,
    ) -> Option<Literal> {
        let _ = (disjuncts, model, random);
        None
    }
}

/// What a constraint demands of its disjuncts.
///
/// Cardinality windows are stored as `min - 1` and `max + 1` so that every boundary crossing in
/// the flip loop is a single equality comparison.
#[derive(Debug)]
pub(crate) enum ConstraintKind {
    /// At least one disjunct true.
    Disjunction,
    /// Between `min` and `max` disjuncts true.
    Cardinality { min_minus_one: i64, max_plus_one: i64 },
    /// A cardinality window that is only imposed while the guard literal is false.
    Conditional {
        guard: Literal,
        min_minus_one: i64,
        max_plus_one: i64,
    },
    /// Constraint-defined semantics; see [CustomConstraint].
    Custom(Box<dyn CustomConstraint>),
}

/// A registered constraint: its de-duplicated disjunct array, its semantics, and its structural
/// hash.
#[derive(Debug)]
pub(crate) struct Constraint {
    pub(crate) disjuncts: Box<[Literal]>,
    pub(crate) kind: ConstraintKind,
    pub(crate) hash: u64,
}

impl Constraint {
    pub(crate) fn disjunction(disjuncts: Box<[Literal]>) -> Constraint {
        let hash = structural_hash(&disjuncts, 0);
        Constraint {
            disjuncts,
            kind: ConstraintKind::Disjunction,
            hash,
        }
    }

    /// A cardinality window; `max` must already be effective (bounded by the disjunct count).
    pub(crate) fn cardinality(disjuncts: Box<[Literal]>, min: usize, max: usize) -> Constraint {
        let extra = subtype_hash(1, min as u64, max as u64);
        let hash = structural_hash(&disjuncts, extra);
        Constraint {
            kind: ConstraintKind::Cardinality {
                min_minus_one: min as i64 - 1,
                max_plus_one: max as i64 + 1,
            },
            disjuncts,
            hash,
        }
    }

    pub(crate) fn conditional(
        guard: Literal,
        disjuncts: Box<[Literal]>,
        min: usize,
        max: usize,
    ) -> Constraint {
        let extra = subtype_hash(2, guard.signed_index() as u64, ((min as u64) << 32) | max as u64);
        let hash = structural_hash(&disjuncts, extra);
        Constraint {
            kind: ConstraintKind::Conditional {
                guard,
                min_minus_one: min as i64 - 1,
                max_plus_one: max as i64 + 1,
            },
            disjuncts,
            hash,
        }
    }

    pub(crate) fn custom(disjuncts: Box<[Literal]>, custom: Box<dyn CustomConstraint>) -> Constraint {
        let extra = subtype_hash(3, custom.extra_hash(), 0);
        let hash = structural_hash(&disjuncts, extra);
        Constraint {
            disjuncts,
            kind: ConstraintKind::Custom(custom),
            hash,
        }
    }

    /// Whether the constraint holds with `count` true disjuncts, disregarding any guard.
    pub(crate) fn is_satisfied(&self, count: usize, model: &Model<'_>) -> bool {
        match &self.kind {
            ConstraintKind::Disjunction => count >= 1,
            ConstraintKind::Cardinality {
                min_minus_one,
                max_plus_one,
            }
            | ConstraintKind::Conditional {
                min_minus_one,
                max_plus_one,
                ..
            } => count as i64 > *min_minus_one && (count as i64) < *max_plus_one,
            ConstraintKind::Custom(custom) => custom.is_satisfied(count, model),
        }
    }

    /// Change in "this constraint is unsatisfied" when the true-disjunct count rises from `count`
    /// by one: -1 when the constraint becomes satisfied, +1 when it becomes violated.
    pub(crate) fn threat_delta_increasing(&self, count: usize, model: &Model<'_>) -> i32 {
        match &self.kind {
            ConstraintKind::Disjunction => {
                if count == 0 {
                    -1
                } else {
                    0
                }
            }
            ConstraintKind::Cardinality {
                min_minus_one,
                max_plus_one,
            }
            | ConstraintKind::Conditional {
                min_minus_one,
                max_plus_one,
                ..
            } => {
                if count as i64 == *min_minus_one {
                    -1
                } else if count as i64 + 1 == *max_plus_one {
                    1
                } else {
                    0
                }
            }
            ConstraintKind::Custom(custom) => custom.flip_risk_increasing(count, model),
        }
    }

    /// Counterpart of [threat_delta_increasing](Constraint::threat_delta_increasing) for a count
    /// falling by one.
    pub(crate) fn threat_delta_decreasing(&self, count: usize, model: &Model<'_>) -> i32 {
        match &self.kind {
            ConstraintKind::Disjunction => {
                if count == 1 {
                    1
                } else {
                    0
                }
            }
            ConstraintKind::Cardinality {
                min_minus_one,
                max_plus_one,
            }
            | ConstraintKind::Conditional {
                min_minus_one,
                max_plus_one,
                ..
            } => {
                if count as i64 == *max_plus_one {
                    -1
                } else if count as i64 - 1 == *min_minus_one {
                    1
                } else {
                    0
                }
            }
            ConstraintKind::Custom(custom) => custom.flip_risk_decreasing(count, model),
        }
    }

    /// The guard literal of a conditional constraint.
    pub(crate) fn guard(&self) -> Option<Literal> {
        match self.kind {
            ConstraintKind::Conditional { guard, .. } => Some(guard),
            _ => None,
        }
    }

    /// Whether the constraint currently imposes anything: conditionals are switched off while
    /// their guard literal is true.
    pub(crate) fn is_enabled(&self, model: &Model<'_>) -> bool {
        match self.kind {
            ConstraintKind::Conditional { guard, .. } => !model.is_true(guard),
            _ => true,
        }
    }

    /// The satisfiable window as `(min, max)`, if the constraint is window-shaped.
    pub(crate) fn window(&self) -> Option<(usize, usize)> {
        match self.kind {
            ConstraintKind::Disjunction => Some((1, self.disjuncts.len())),
            ConstraintKind::Cardinality {
                min_minus_one,
                max_plus_one,
            }
            | ConstraintKind::Conditional {
                min_minus_one,
                max_plus_one,
                ..
            } => Some(((min_minus_one + 1) as usize, (max_plus_one - 1) as usize)),
            ConstraintKind::Custom(_) => None,
        }
    }

    /// Structural equality for de-duplication: same disjuncts in the same order and the same
    /// subtype parameters. Custom constraints compare by extra hash.
    pub(crate) fn structurally_equal(&self, other: &Constraint) -> bool {
        if self.disjuncts != other.disjuncts {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ConstraintKind::Disjunction, ConstraintKind::Disjunction) => true,
            (
                ConstraintKind::Cardinality {
                    min_minus_one: a_min,
                    max_plus_one: a_max,
                },
                ConstraintKind::Cardinality {
                    min_minus_one: b_min,
                    max_plus_one: b_max,
                },
            ) => a_min == b_min && a_max == b_max,
            (
                ConstraintKind::Conditional {
                    guard: a_guard,
                    min_minus_one: a_min,
                    max_plus_one: a_max,
                },
                ConstraintKind::Conditional {
                    guard: b_guard,
                    min_minus_one: b_min,
                    max_plus_one: b_max,
                },
            ) => a_guard == b_guard && a_min == b_min && a_max == b_max,
            (ConstraintKind::Custom(a), ConstraintKind::Custom(b)) => {
                a.extra_hash() == b.extra_hash()
            }
            _ => false,
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let disjuncts = |f: &mut Formatter<'_>| -> std::fmt::Result {
            for (position, literal) in self.disjuncts.iter().enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{literal}")?;
            }
            Ok(())
        };
        match &self.kind {
            ConstraintKind::Disjunction => {
                write!(f, "or(")?;
                disjuncts(f)?;
                write!(f, ")")
            }
            ConstraintKind::Cardinality { .. } => {
                let (min, max) = self.window().unwrap();
                write!(f, "between({min}, {max}; ")?;
                disjuncts(f)?;
                write!(f, ")")
            }
            ConstraintKind::Conditional { guard, .. } => {
                let (min, max) = self.window().unwrap();
                write!(f, "unless({guard}; {min}, {max}; ")?;
                disjuncts(f)?;
                write!(f, ")")
            }
            ConstraintKind::Custom(custom) => {
                write!(f, "custom[{custom:?}](")?;
                disjuncts(f)?;
                write!(f, ")")
            }
        }
    }
}

/// Order-dependent rotating-XOR hash over the signed disjunct indices, mixed with a
/// subtype-specific extra hash.
fn structural_hash(disjuncts: &[Literal], extra: u64) -> u64 {
    let mut hash = extra;
    for literal in disjuncts {
        hash = hash.rotate_left(1) ^ literal.signed_index() as u64;
    }
    hash
}

fn subtype_hash(tag: u64, first: u64, second: u64) -> u64 {
    let mut hash = tag.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    hash ^= first.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= second.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::StorageKey;

    fn literal(index: i32) -> Literal {
        Literal::from_signed_index(index).unwrap()
    }

    fn empty_model() -> KeyedVec<PropositionId, bool> {
        KeyedVec::filled_with(8, false)
    }

    #[test]
    fn disjunction_satisfied_by_any_true_disjunct() {
        let c = Constraint::disjunction(vec![literal(1), literal(-2)].into_boxed_slice());
        let values = empty_model();
        let model = Model { values: &values };
        assert!(!c.is_satisfied(0, &model));
        assert!(c.is_satisfied(1, &model));
        assert!(c.is_satisfied(2, &model));
    }

    #[test]
    fn disjunction_threat_deltas_only_cross_the_low_boundary() {
        let c = Constraint::disjunction(vec![literal(1), literal(2), literal(3)].into_boxed_slice());
        let values = empty_model();
        let model = Model { values: &values };
        assert_eq!(c.threat_delta_increasing(0, &model), -1);
        assert_eq!(c.threat_delta_increasing(1, &model), 0);
        assert_eq!(c.threat_delta_increasing(2, &model), 0);
        assert_eq!(c.threat_delta_decreasing(1, &model), 1);
        assert_eq!(c.threat_delta_decreasing(2, &model), 0);
        assert_eq!(c.threat_delta_decreasing(3, &model), 0);
    }

    #[test]
    fn cardinality_window_boundaries() {
        let disjuncts: Vec<Literal> = (1..=5).map(literal).collect();
        let c = Constraint::cardinality(disjuncts.into_boxed_slice(), 2, 3);
        let values = empty_model();
        let model = Model { values: &values };

        for count in 0..=5 {
            assert_eq!(c.is_satisfied(count, &model), (2..=3).contains(&count));
        }
        // Rising into the window from min - 1, and out of it from max.
        assert_eq!(c.threat_delta_increasing(1, &model), -1);
        assert_eq!(c.threat_delta_increasing(2, &model), 0);
        assert_eq!(c.threat_delta_increasing(3, &model), 1);
        // Falling into the window from max + 1, and out of it from min.
        assert_eq!(c.threat_delta_decreasing(4, &model), -1);
        assert_eq!(c.threat_delta_decreasing(3, &model), 0);
        assert_eq!(c.threat_delta_decreasing(2, &model), 1);
    }

    #[test]
    fn conditional_disabled_while_guard_true() {
        let guard_prop = PropositionId::create_from_index(0);
        let disjuncts = vec![literal(2), literal(3)];
        let c = Constraint::conditional(Literal::positive(guard_prop), disjuncts.into_boxed_slice(), 1, 1);

        let mut values = empty_model();
        let model = Model { values: &values };
        assert!(c.is_enabled(&model));

        values[guard_prop] = true;
        let model = Model { values: &values };
        assert!(!c.is_enabled(&model));
    }

    #[test]
    fn hash_is_order_dependent() {
        let a = Constraint::disjunction(vec![literal(1), literal(2)].into_boxed_slice());
        let b = Constraint::disjunction(vec![literal(2), literal(1)].into_boxed_slice());
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn equal_structure_means_equal_hash() {
        let a = Constraint::cardinality(vec![literal(1), literal(-3)].into_boxed_slice(), 1, 2);
        let b = Constraint::cardinality(vec![literal(1), literal(-3)].into_boxed_slice(), 1, 2);
        assert_eq!(a.hash, b.hash);
        assert!(a.structurally_equal(&b));
    }

    #[test]
    fn same_disjuncts_different_window_are_distinct() {
        let a = Constraint::cardinality(vec![literal(1), literal(2)].into_boxed_slice(), 1, 1);
        let b = Constraint::cardinality(vec![literal(1), literal(2)].into_boxed_slice(), 1, 2);
        assert!(!a.structurally_equal(&b));
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn disjunction_and_window_do_not_collide() {
        let a = Constraint::disjunction(vec![literal(1), literal(2)].into_boxed_slice());
        let b = Constraint::cardinality(vec![literal(1), literal(2)].into_boxed_slice(), 1, 2);
        assert!(!a.structurally_equal(&b));
    }
}

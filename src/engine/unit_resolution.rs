//! Unit resolution over the normal disjunctions of a compiled problem.
//!
//! Runs before search: any disjunction whose determined literals are all false and which has
//! exactly one undetermined literal left forces that literal, and forced literals propagate
//! transitively through a work queue. Forced propositions are marked
//! [Inferred](crate::DeterminationState::Inferred), which shrinks the search space without
//! touching user-controlled determinations.

use std::collections::VecDeque;

use log::debug;

use crate::basic_types::ContradictionSubject;
use crate::basic_types::KeyedVec;
use crate::basic_types::SphynxError;
use crate::engine::constraints::Constraint;
use crate::engine::constraints::ConstraintId;
use crate::engine::constraints::ConstraintKind;
use crate::engine::variables::DeterminationState;
use crate::engine::variables::PropositionId;
use crate::engine::variables::SatVariable;

/// Marks constraints unit resolution does not apply to (everything but normal disjunctions).
const NOT_A_DISJUNCTION: i64 = -1;

/// Propagate predetermined values through the problem's disjunctions, marking forced
/// propositions [DeterminationState::Inferred]. Returns how many propositions were inferred.
///
/// Inferences from a previous run are cleared first, so the result always reflects the current
/// `Fixed`/`Set` determinations alone.
pub(crate) fn infer_predetermined(
    constraints: &KeyedVec<ConstraintId, Constraint>,
    variables: &mut KeyedVec<PropositionId, SatVariable>,
) -> Result<usize, SphynxError> {
    for variable in variables.iter_mut() {
        if variable.state == DeterminationState::Inferred {
            variable.state = DeterminationState::Floating;
        }
    }

    // Per constraint: how many literals are still undetermined, and whether some determined
    // literal already satisfies it.
    let mut undetermined: KeyedVec<ConstraintId, i64> = KeyedVec::default();
    let mut satisfied: KeyedVec<ConstraintId, bool> = KeyedVec::default();
    let mut queue: VecDeque<ConstraintId> = VecDeque::new();

    for (constraint_id, constraint) in constraints.entries() {
        if !matches!(constraint.kind, ConstraintKind::Disjunction) {
            let _ = undetermined.push(NOT_A_DISJUNCTION);
            let _ = satisfied.push(false);
            continue;
        }
        let mut open = 0i64;
        let mut already_satisfied = false;
        for literal in constraint.disjuncts.iter() {
            let variable = &variables[literal.proposition()];
            if variable.is_predetermined() {
                if variable.predetermined_value == literal.is_positive() {
                    already_satisfied = true;
                }
            } else {
                open += 1;
            }
        }
        let _ = undetermined.push(open);
        let _ = satisfied.push(already_satisfied);
        if !already_satisfied && open <= 1 {
            queue.push_back(constraint_id);
        }
    }

    let mut inferred = 0usize;
    while let Some(constraint_id) = queue.pop_front() {
        if satisfied[constraint_id] {
            continue;
        }
        match undetermined[constraint_id] {
            0 => {
                return Err(SphynxError::Contradiction {
                    subject: ContradictionSubject::Constraint(constraint_id),
                    reason: format!(
                        "every literal of {} is predetermined false",
                        constraints[constraint_id]
                    ),
                });
            }
            1 => {
                let forced = constraints[constraint_id]
                    .disjuncts
                    .iter()
                    .copied()
                    .find(|literal| !variables[literal.proposition()].is_predetermined())
                    .expect("a disjunction with undetermined count 1 has an open literal");
                let proposition = forced.proposition();
                let value = forced.is_positive();
                variables[proposition].state = DeterminationState::Inferred;
                variables[proposition].predetermined_value = value;
                inferred += 1;

                // The fresh determination narrows every disjunction the proposition occurs in,
                // including the one just processed (which it satisfies).
                for positive in [true, false] {
                    for &other in variables[proposition].occurrences(positive) {
                        if undetermined[other] == NOT_A_DISJUNCTION {
                            continue;
                        }
                        if positive == value {
                            satisfied[other] = true;
                        } else {
                            undetermined[other] -= 1;
                            if !satisfied[other] && undetermined[other] <= 1 {
                                queue.push_back(other);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    debug!("unit resolution inferred {inferred} proposition(s)");
    Ok(inferred)
}

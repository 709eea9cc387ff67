//! Rule records and the tightness check over their positive dependency graph.
//!
//! A rule `head ⇐ body` makes the body one justification for the head. Completion compiles each
//! rule into a forward implication and, per head, one disjunction demanding that some
//! justification holds; that translation is only sound when no proposition positively depends on
//! itself through rule bodies.

use crate::basic_types::KeyedVec;
use crate::basic_types::SphynxError;
use crate::engine::variables::Literal;
use crate::engine::variables::Proposition;
use crate::engine::variables::PropositionId;

/// One collected rule, pending compilation. Conjunctive bodies have already been interned as a
/// single internal proposition by the time a rule is recorded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Rule {
    pub(crate) head: PropositionId,
    pub(crate) body: Literal,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search for a positive cycle through the recorded rule dependencies. Returns the
/// first proposition found to reach itself.
pub(crate) fn check_tightness(
    propositions: &KeyedVec<PropositionId, Proposition>,
) -> Result<(), SphynxError> {
    let mut states: KeyedVec<PropositionId, WalkState> =
        KeyedVec::filled_with(propositions.len(), WalkState::Unvisited);

    for root in propositions.keys() {
        if states[root] != WalkState::Unvisited {
            continue;
        }
        states[root] = WalkState::InProgress;
        let mut stack: Vec<(PropositionId, usize)> = vec![(root, 0)];
        while let Some(&(current, child)) = stack.last() {
            let dependencies = &propositions[current].dependencies;
            if child == dependencies.len() {
                states[current] = WalkState::Done;
                let _ = stack.pop();
                continue;
            }
            stack.last_mut().expect("stack is nonempty").1 += 1;
            let next = dependencies[child];
            match states[next] {
                WalkState::Unvisited => {
                    states[next] = WalkState::InProgress;
                    stack.push((next, 0));
                }
                WalkState::InProgress => {
                    return Err(SphynxError::NonTightProgram {
                        proposition: next,
                        name: propositions[next].name.clone(),
                    });
                }
                WalkState::Done => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::StorageKey;
    use crate::engine::variables::Name;

    fn proposition_table(edges: &[(usize, usize)], count: usize) -> KeyedVec<PropositionId, Proposition> {
        let mut propositions = KeyedVec::default();
        for index in 0..count {
            let _ = propositions.push(Proposition::named(Name::from(format!("p{index}").as_str())));
        }
        for &(from, to) in edges {
            propositions[PropositionId::create_from_index(from)]
                .dependencies
                .push(PropositionId::create_from_index(to));
        }
        propositions
    }

    #[test]
    fn acyclic_dependencies_are_tight() {
        // A chain plus a diamond.
        let propositions = proposition_table(&[(0, 1), (1, 2), (0, 3), (3, 2)], 4);
        assert!(check_tightness(&propositions).is_ok());
    }

    #[test]
    fn self_dependency_is_detected() {
        let propositions = proposition_table(&[(0, 0)], 1);
        let error = check_tightness(&propositions).unwrap_err();
        assert!(matches!(error, SphynxError::NonTightProgram { .. }));
    }

    #[test]
    fn two_step_cycle_is_detected() {
        let propositions = proposition_table(&[(0, 1), (1, 0)], 2);
        let error = check_tightness(&propositions).unwrap_err();
        let SphynxError::NonTightProgram { proposition, .. } = error else {
            panic!("expected a non-tight program error");
        };
        assert!(proposition.index() == 1 || proposition.index() == 2);
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let edges: Vec<(usize, usize)> = (0..10_000).map(|index| (index, index + 1)).collect();
        let propositions = proposition_table(&edges, 10_001);
        assert!(check_tightness(&propositions).is_ok());
    }

    #[test]
    fn shared_substructure_is_not_a_cycle() {
        // Two heads depending on the same proposition must not be mistaken for a cycle.
        let propositions = proposition_table(&[(0, 2), (1, 2)], 3);
        assert!(check_tightness(&propositions).is_ok());
    }
}

use std::fmt::Display;
use std::fmt::Formatter;

use thiserror::Error;

use crate::engine::constraints::ConstraintId;
use crate::engine::variables::Name;
use crate::engine::variables::PropositionId;

/// Errors surfaced by problem construction, optimization, and solving.
///
/// The solver itself never raises an error to recover from a theory solver rejecting a model;
/// that path restarts the search internally.
#[derive(Debug, Error)]
pub enum SphynxError {
    /// The asserted or inferred constraints cannot all hold. Raised at construction or
    /// optimization time, never during search.
    #[error("contradiction involving {subject}: {reason}")]
    Contradiction {
        subject: ContradictionSubject,
        reason: String,
    },

    /// The rule set contains a positive dependency cycle, so its completion semantics are not
    /// well defined.
    #[error("program is not tight: {name} ({proposition}) depends positively on itself")]
    NonTightProgram {
        proposition: PropositionId,
        name: Name,
    },

    /// The stochastic search exhausted its flip budget without finding a model. This does not
    /// mean the problem is unsatisfiable.
    #[error("could not solve: the flip budget was exhausted")]
    Timeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// What a [contradiction](SphynxError::Contradiction) was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContradictionSubject {
    Proposition(PropositionId),
    Constraint(ConstraintId),
}

impl Display for ContradictionSubject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContradictionSubject::Proposition(proposition) => {
                write!(f, "proposition {proposition}")
            }
            ContradictionSubject::Constraint(constraint) => write!(f, "constraint {constraint}"),
        }
    }
}

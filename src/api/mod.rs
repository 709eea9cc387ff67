pub(crate) mod problem;

pub mod results {
    //! The outputs of solving: the [Solution] itself and the statistics of the search that
    //! produced it.
    pub use crate::basic_types::Solution;
    pub use crate::basic_types::TheoryValue;
    pub use crate::engine::SolveStats;
}

pub mod variables {
    //! The vocabulary a [Problem] is stated in.
    //!
    //! A [PropositionId] identifies a named Boolean atom; a [Literal] is a signed reference to
    //! one. [DeterminationState] records whether (and for how long) a proposition's value is
    //! decided before search.
    pub use crate::engine::variables::DeterminationState;
    pub use crate::engine::variables::Literal;
    pub use crate::engine::variables::Name;
    pub use crate::engine::variables::PropositionId;
    #[cfg(doc)]
    use crate::Problem;
}

pub mod options {
    //! Tuning knobs passed to [Problem::with_options].
    pub use crate::engine::SolverOptions;
    #[cfg(doc)]
    use crate::Problem;
}

pub mod constraints {
    //! The extension surface for constraints beyond cardinality windows.
    pub use crate::engine::constraints::ConstraintId;
    pub use crate::engine::constraints::CustomConstraint;
    pub use crate::engine::constraints::Model;
}

pub mod theory {
    //! The contract for coupling non-Boolean theory solvers to the Boolean core.
    pub use crate::engine::theory::TheorySolver;
}

pub mod errors {
    //! The error taxonomy crossing the crate boundary.
    pub use crate::basic_types::ContradictionSubject;
    pub use crate::basic_types::SphynxError;
}

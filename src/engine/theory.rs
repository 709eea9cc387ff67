//! The contract between the Boolean core and theory solvers.
//!
//! A theory solver refines a Boolean model with values from its own domain (finite domains,
//! numeric intervals, ...). The core consults registered theory solvers at three points: once at
//! compile time, once per solve to seed theory state from predetermined atoms, and once per
//! candidate Boolean model. Rejecting a candidate model restarts the Boolean search; it is not an
//! error.

use std::any::Any;
use std::any::TypeId;
use std::fmt::Debug;

use crate::basic_types::HashMap;
use crate::basic_types::Solution;
use crate::basic_types::SphynxError;
use crate::Problem;

/// A solver for a non-Boolean theory coupled to the problem's propositions.
///
/// Implementations also provide `as_any`/`as_any_mut` so a registered solver can be retrieved
/// by its concrete type through [Problem::theory](crate::Problem::theory).
pub trait TheorySolver: Debug + Any {
    /// A short name used in log output.
    fn name(&self) -> &str;

    /// Inspect the problem once, when it is compiled. Constraint and proposition registration is
    /// still permitted here.
    fn preprocess(&mut self, problem: &mut Problem) -> Result<(), SphynxError> {
        let _ = problem;
        Ok(())
    }

    /// Seed theory state from the predetermined atoms of the upcoming solve. Called once per
    /// solve, before the Boolean search starts; `solution` holds the predetermined truth values
    /// at this point.
    fn propagate_predetermined(&mut self, solution: &mut Solution) {
        let _ = solution;
    }

    /// Refine a complete Boolean model. Returning false rejects the model and restarts the
    /// Boolean search; returning true accepts it, typically after writing theory values through
    /// [Solution::set_theory_value].
    fn solve(&mut self, solution: &mut Solution) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The theory solvers registered with a problem, addressable by their concrete type.
#[derive(Debug, Default)]
pub(crate) struct TheoryRegistry {
    solvers: Vec<Box<dyn TheorySolver>>,
    by_type: HashMap<TypeId, usize>,
}

impl TheoryRegistry {
    /// Register a solver. At most one solver of each concrete type may be registered; returns
    /// false if the type is already present.
    pub(crate) fn register<T: TheorySolver>(&mut self, solver: T) -> bool {
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return false;
        }
        let _ = self.by_type.insert(type_id, self.solvers.len());
        self.solvers.push(Box::new(solver));
        true
    }

    pub(crate) fn get<T: TheorySolver>(&self) -> Option<&T> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|&position| self.solvers[position].as_any().downcast_ref::<T>())
    }

    pub(crate) fn get_mut<T: TheorySolver>(&mut self) -> Option<&mut T> {
        let position = *self.by_type.get(&TypeId::of::<T>())?;
        self.solvers[position].as_any_mut().downcast_mut::<T>()
    }

    /// The solvers in registration order, which is also the hand-off order after a Boolean model
    /// is found.
    pub(crate) fn solvers_mut(&mut self) -> &mut [Box<dyn TheorySolver>] {
        &mut self.solvers
    }
}

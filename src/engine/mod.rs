pub(crate) mod constraints;
pub(crate) mod rules;
pub(crate) mod theory;
pub(crate) mod unit_resolution;
pub(crate) mod variables;
pub(crate) mod walk_sat;

/// Tuning knobs for the stochastic search.
///
/// The defaults are the tested configuration; the noise constants in particular interact with
/// each other and with the restart discipline.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// The flip budget of one solve call. Restarts draw from the same budget, so this is the
    /// hard bound on work done before a [Timeout](crate::SphynxError::Timeout) is reported.
    pub max_flips: usize,

    /// The noise probability `wp` at the start of a solve: the chance that an unsatisfied
    /// constraint is repaired by flipping a random disjunct instead of the greedy choice.
    pub initial_noise: f64,

    /// Step size of the adaptive noise update (the `φ` of Hoos-style adaptive WalkSAT). An
    /// improvement scales noise down by `1 - φ/2`; prolonged stagnation moves it up by
    /// `(1 - wp)·φ`.
    pub noise_delta: f64,

    /// Stagnation patience is `|constraints| / stagnation_divisor` flips without the unsatisfied
    /// count dropping; exceeding it raises the noise.
    pub stagnation_divisor: usize,

    /// By default the noise only adapts when the repaired constraint is a normal disjunction,
    /// mirroring the original tuning of the algorithm. Set this to also adapt on cardinality and
    /// conditional repairs.
    pub adapt_noise_on_cardinality: bool,

    /// Skip the forcing propagation performed while the initial assignment is constructed. The
    /// search is correct either way; propagation usually starts it closer to a model.
    pub skip_propagation: bool,

    /// Start the next solve from the previous solve's final assignment instead of a fresh random
    /// one.
    pub continue_previous_search: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_flips: 50_000,
            initial_noise: 0.1,
            noise_delta: 0.2,
            stagnation_divisor: 3,
            adapt_noise_on_cardinality: false,
            skip_propagation: false,
            continue_previous_search: false,
        }
    }
}

/// What the last solve did, retrievable through
/// [Problem::last_stats](crate::Problem::last_stats).
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveStats {
    /// Flips consumed, across all restarts.
    pub flips: usize,
    /// Restarts taken (theory rejections included).
    pub restarts: usize,
    /// The adaptive noise level when the search ended.
    pub final_noise: f64,
}

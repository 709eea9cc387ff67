mod error;
pub(crate) mod keyed_vec;
mod random;
mod solution;
mod sparse_set;

pub use error::ContradictionSubject;
pub use error::SphynxError;
pub(crate) use keyed_vec::KeyedVec;
pub(crate) use keyed_vec::StorageKey;
pub use random::Random;
pub use random::XorShiftRandom;
pub use solution::Solution;
pub use solution::TheoryValue;
pub(crate) use sparse_set::SparseSet;

/// Hash containers used throughout the crate; FNV beats the default hasher on the short integer
/// and name keys we store.
pub(crate) type HashMap<K, V> = fnv::FnvHashMap<K, V>;
pub(crate) type HashSet<T> = fnv::FnvHashSet<T>;

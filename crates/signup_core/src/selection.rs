//! Random selection of recently signed-up users to mention in a greeting.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::user::User;

/// Default number of recent users mentioned in one greeting.
pub const DEFAULT_GREET_COUNT: usize = 3;

/// Pick at most `limit` users to mention, never repeating a name and never
/// including anyone named `exclude_name` (name-based on purpose: a different
/// user with the same name would read as a self-mention in the message).
///
/// The pool is shuffled up front, so both the surviving representative of a
/// duplicated name and the returned subset are uniformly random per call.
/// Callers own the RNG; tests seed it for determinism.
pub fn select_for_greeting(
    exclude_name: &str,
    pool: &[User],
    limit: usize,
    rng: &mut impl Rng,
) -> Vec<User> {
    let mut candidates: Vec<User> = pool.to_vec();
    candidates.shuffle(rng);

    let mut seen_names = HashSet::new();
    candidates
        .into_iter()
        .filter(|user| user.name != exclude_name)
        .filter(|user| seen_names.insert(user.name.clone()))
        .take(limit)
        .collect()
}

//! Bounded, recency-ordered maintenance of the recent-signup pool.

use crate::user::User;

/// Default maximum number of users retained in the pool.
pub const DEFAULT_POOL_CAPACITY: usize = 20;

/// Outcome of admitting one user into the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolUpdate {
    /// The pool after admission, most recent first, at most `capacity` long.
    pub updated: Vec<User>,
    /// Users present in `current ∪ {admitted}` but absent from `updated`.
    /// Contains the admitted user itself when it is older than every
    /// retained member.
    pub evicted: Vec<User>,
}

/// Most recent first. Equal timestamps fall back to ID ascending so that
/// eviction stays deterministic.
pub fn sort_by_recency(users: &mut [User]) {
    users.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn contains_id(pool: &[User], id: &str) -> bool {
    pool.iter().any(|user| user.id == id)
}

/// Admit `new_user` into `current_pool`, keeping the `capacity` most recent
/// members. Pure over its inputs; persisting the diff is the caller's job.
///
/// `new_user` must not already be a pool member; the duplicate gate runs
/// upstream of this call.
pub fn compute_updated_pool(new_user: &User, current_pool: &[User], capacity: usize) -> PoolUpdate {
    let mut combined: Vec<User> = current_pool.to_vec();
    combined.push(new_user.clone());
    sort_by_recency(&mut combined);

    let evicted = combined.split_off(capacity.min(combined.len()));

    PoolUpdate {
        updated: combined,
        evicted,
    }
}

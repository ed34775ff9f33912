use signup_core::user::User;

/// Persistence boundary for the recent-signup pool.
///
/// Calls carry no transactional guarantee and no conditional-write support:
/// two concurrent invocations can read the same pool snapshot and race on
/// save/delete. That limitation is accepted and documented rather than
/// papered over here; see DESIGN.md.
pub trait UserStore {
    fn scan_all(&self) -> Result<Vec<User>, String>;
    fn save(&self, user: &User) -> Result<(), String>;
    fn batch_delete(&self, users: &[User]) -> Result<(), String>;
}

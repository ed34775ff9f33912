//! Composition of the welcome message sent for a new signup.

use serde::{Deserialize, Serialize};

use crate::user::User;

/// Outbound greeting payload, serialized snake_case for the notification
/// endpoint. Transient: composed once, transmitted, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Greeting {
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub recent_user_ids: Vec<String>,
}

impl Greeting {
    /// Wire form of the payload, also returned as the invocation result.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("greeting payload should serialize")
    }
}

/// Build the greeting for `user`, mentioning `recent_users`.
///
/// `recent_user_ids` mirrors the input order even though the rendered
/// sentence moves the first name to the end.
pub fn compose_greeting(user: &User, recent_users: &[User], sender: &str) -> Greeting {
    let names: Vec<&str> = recent_users.iter().map(|user| user.name.as_str()).collect();

    Greeting {
        sender: sender.to_string(),
        receiver: user.id.clone(),
        message: format!(
            "Hi {}, welcome to komoot.{}",
            user.name,
            recent_users_clause(&names)
        ),
        recent_user_ids: recent_users.iter().map(|user| user.id.clone()).collect(),
    }
}

// For two or more names the FIRST one is rendered last ("B, C and A").
// Visually odd, but the notification endpoint expects exactly this phrasing,
// so it is preserved verbatim.
fn recent_users_clause(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => format!(" {only} also joined recently."),
        [first, rest @ ..] => {
            format!(" {} and {} also joined recently.", rest.join(", "), first)
        }
    }
}

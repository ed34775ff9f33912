use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed-up user as received from the signup event and kept in the pool.
///
/// Records are immutable once created; pool updates are membership changes,
/// never in-place edits. The ID is an opaque string (the deployment history
/// includes both numeric and string identities, and string subsumes both).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Whether signup validation rejects records with an empty ID.
///
/// Early deployments only validated the name and let the store key the record
/// however it arrived; later ones require a non-empty ID on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrictness {
    Lenient,
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Reject signup records that cannot enter the pool. A missing `created_at`
/// never reaches this point; deserialization already requires it.
pub fn validate_signup(user: &User, strictness: IdStrictness) -> Result<(), ValidationError> {
    if user.name.trim().is_empty() {
        return Err(ValidationError::new("User name can not be empty"));
    }

    if strictness == IdStrictness::Required && user.id.trim().is_empty() {
        return Err(ValidationError::new("User id can not be empty"));
    }

    Ok(())
}

/// Timestamps cross the wire as ISO-8601 with millisecond precision. Any
/// RFC 3339 offset is accepted on input and normalized to UTC.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

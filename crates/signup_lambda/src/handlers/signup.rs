use rand::Rng;
use serde_json::{json, Value};
use signup_core::greeting::{compose_greeting, Greeting};
use signup_core::pool::{
    compute_updated_pool, contains_id, sort_by_recency, DEFAULT_POOL_CAPACITY,
};
use signup_core::selection::{select_for_greeting, DEFAULT_GREET_COUNT};
use signup_core::user::{validate_signup, IdStrictness, User, ValidationError};

use crate::adapters::transport::NotificationTransport;
use crate::adapters::user_store::UserStore;
use crate::notify::{deliver, DeliveryError, RetryPolicy};

pub const DEFAULT_SENDER: &str = "pausub@gmail.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupHandlerConfig {
    pub sender: String,
    pub pool_capacity: usize,
    pub greet_count: usize,
    pub id_strictness: IdStrictness,
    pub retry: RetryPolicy,
}

impl Default for SignupHandlerConfig {
    fn default() -> Self {
        Self {
            sender: DEFAULT_SENDER.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            greet_count: DEFAULT_GREET_COUNT,
            id_strictness: IdStrictness::Lenient,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupError {
    Validation(ValidationError),
    DuplicateUser { id: String },
    Store(String),
    Delivery(DeliveryError),
}

impl std::fmt::Display for SignupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignupError::Validation(error) => write!(f, "{error}"),
            SignupError::DuplicateUser { id } => {
                write!(f, "User with id {id} already exists")
            }
            SignupError::Store(message) => f.write_str(message),
            SignupError::Delivery(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for SignupError {}

/// Process one signup: validate, admit into the pool, persist the diff, and
/// deliver the greeting. Returns the greeting that was sent.
///
/// Selection runs against the pool as it existed BEFORE the update, so the
/// new user never greets themself and freshly evicted users can still be
/// mentioned one last time.
pub fn handle_signup(
    user: &User,
    config: &SignupHandlerConfig,
    store: &impl UserStore,
    transport: &impl NotificationTransport,
    rng: &mut impl Rng,
) -> Result<Greeting, SignupError> {
    match run_signup(user, config, store, transport, rng) {
        Ok(greeting) => {
            log_signup_info(
                "signup_completed",
                json!({
                    "user_id": user.id,
                    "receiver": greeting.receiver,
                    "mentioned": greeting.recent_user_ids,
                }),
            );
            Ok(greeting)
        }
        Err(error) => {
            log_signup_error(
                "signup_failed",
                json!({
                    "user_id": user.id,
                    "error": error.to_string(),
                }),
            );
            Err(error)
        }
    }
}

fn run_signup(
    user: &User,
    config: &SignupHandlerConfig,
    store: &impl UserStore,
    transport: &impl NotificationTransport,
    rng: &mut impl Rng,
) -> Result<Greeting, SignupError> {
    validate_signup(user, config.id_strictness).map_err(SignupError::Validation)?;

    let mut pool = store.scan_all().map_err(SignupError::Store)?;
    sort_by_recency(&mut pool);
    log_signup_info(
        "pool_loaded",
        json!({
            "pool_size": pool.len(),
            "pool": pool,
        }),
    );

    if contains_id(&pool, &user.id) {
        return Err(SignupError::DuplicateUser {
            id: user.id.clone(),
        });
    }

    let update = compute_updated_pool(user, &pool, config.pool_capacity);
    if !update.evicted.is_empty() {
        store
            .batch_delete(&update.evicted)
            .map_err(SignupError::Store)?;
    }
    if contains_id(&update.updated, &user.id) {
        store.save(user).map_err(SignupError::Store)?;
    }

    let mentioned = select_for_greeting(&user.name, &pool, config.greet_count, rng);
    let greeting = compose_greeting(user, &mentioned, &config.sender);
    let payload = greeting.to_pretty_json();
    log_signup_info(
        "greeting_sending",
        json!({
            "receiver": greeting.receiver,
            "payload": payload,
        }),
    );

    // The pool diff is already persisted at this point. If delivery exhausts
    // its retries the invocation fails anyway, with no compensating rollback.
    deliver(&payload, transport, &config.retry).map_err(SignupError::Delivery)?;

    Ok(greeting)
}

/// Pull the signup record out of the invocation payload.
///
/// An SNS event contributes the first record's message, which carries the
/// record as a JSON string (one record per event is assumed, matching the
/// topic's delivery contract). A bare JSON object is accepted as the record
/// itself so the function can also be invoked directly.
pub fn extract_signup_record(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Invocation payload must be a JSON object".to_string());
    };

    let Some(records) = object.get("Records") else {
        return Ok(event);
    };

    let message = records
        .get(0)
        .and_then(|record| record.get("Sns"))
        .and_then(|sns| sns.get("Message"))
        .and_then(Value::as_str)
        .ok_or_else(|| "SNS event carries no message".to_string())?;

    serde_json::from_str(message).map_err(|error| format!("Malformed signup record: {error}"))
}

fn log_signup_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "signup_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_signup_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "signup_handler",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::adapters::transport::TransportResponse;

    use super::*;

    struct RecordingStore {
        users: Mutex<Vec<User>>,
        saves: Mutex<Vec<User>>,
        deletes: Mutex<Vec<User>>,
        fail_scan: bool,
    }

    impl RecordingStore {
        fn seeded(users: Vec<User>) -> Self {
            Self {
                users: Mutex::new(users),
                saves: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
                fail_scan: false,
            }
        }

        fn failing_scan() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
                saves: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
                fail_scan: true,
            }
        }

        fn saved(&self) -> Vec<User> {
            self.saves.lock().expect("poisoned mutex").clone()
        }

        fn deleted(&self) -> Vec<User> {
            self.deletes.lock().expect("poisoned mutex").clone()
        }
    }

    impl UserStore for RecordingStore {
        fn scan_all(&self) -> Result<Vec<User>, String> {
            if self.fail_scan {
                return Err("simulated scan failure".to_string());
            }
            Ok(self.users.lock().expect("poisoned mutex").clone())
        }

        fn save(&self, user: &User) -> Result<(), String> {
            self.saves.lock().expect("poisoned mutex").push(user.clone());
            Ok(())
        }

        fn batch_delete(&self, users: &[User]) -> Result<(), String> {
            self.deletes
                .lock()
                .expect("poisoned mutex")
                .extend_from_slice(users);
            Ok(())
        }
    }

    struct RecordingTransport {
        payloads: Mutex<Vec<String>>,
        failures_before_success: usize,
    }

    impl RecordingTransport {
        fn reliable() -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                failures_before_success: 0,
            }
        }

        fn failing(failures_before_success: usize) -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                failures_before_success,
            }
        }

        fn sent(&self) -> Vec<String> {
            self.payloads.lock().expect("poisoned mutex").clone()
        }
    }

    impl NotificationTransport for RecordingTransport {
        fn post_json(&self, body: &str) -> Result<TransportResponse, String> {
            let mut payloads = self.payloads.lock().expect("poisoned mutex");
            payloads.push(body.to_string());
            if payloads.len() <= self.failures_before_success {
                return Err("simulated transport failure".to_string());
            }
            Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            })
        }
    }

    fn user_at(id: &str, name: &str, minute: u32) -> User {
        User {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 2, 14, 10, minute, 0).unwrap(),
        }
    }

    fn sample_config(pool_capacity: usize) -> SignupHandlerConfig {
        SignupHandlerConfig {
            pool_capacity,
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::ZERO,
            },
            ..SignupHandlerConfig::default()
        }
    }

    fn sample_pool() -> Vec<User> {
        vec![
            user_at("1", "Lise", 40),
            user_at("2", "Anna", 30),
            user_at("3", "Stephen", 20),
        ]
    }

    #[test]
    fn admits_new_user_evicts_oldest_and_greets_from_old_pool() {
        let store = RecordingStore::seeded(sample_pool());
        let transport = RecordingTransport::reliable();
        let mark = user_at("4", "Mark", 50);

        let greeting = handle_signup(
            &mark,
            &sample_config(3),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect("signup should succeed");

        assert_eq!(store.saved(), vec![mark.clone()]);
        assert_eq!(store.deleted().len(), 1);
        assert_eq!(store.deleted()[0].id, "3");

        assert_eq!(greeting.receiver, "4");
        let old_pool_ids: HashSet<&str> = ["1", "2", "3"].into_iter().collect();
        assert_eq!(greeting.recent_user_ids.len(), 3);
        assert!(greeting
            .recent_user_ids
            .iter()
            .all(|id| old_pool_ids.contains(id.as_str())));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0], greeting.to_pretty_json());
    }

    #[test]
    fn duplicate_id_fails_without_store_mutation_or_notification() {
        let store = RecordingStore::seeded(sample_pool());
        let transport = RecordingTransport::reliable();
        let duplicate = user_at("2", "Anna", 55);

        let error = handle_signup(
            &duplicate,
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect_err("duplicate should fail");

        assert_eq!(
            error,
            SignupError::DuplicateUser {
                id: "2".to_string()
            }
        );
        assert_eq!(error.to_string(), "User with id 2 already exists");
        assert!(store.saved().is_empty());
        assert!(store.deleted().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn empty_name_fails_before_any_store_access() {
        let store = RecordingStore::failing_scan();
        let transport = RecordingTransport::reliable();
        let nameless = user_at("9", "", 55);

        let error = handle_signup(
            &nameless,
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect_err("validation should fail");

        assert!(matches!(error, SignupError::Validation(_)));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn empty_id_passes_lenient_but_fails_strict_validation() {
        let anonymous = user_at("", "Mark", 55);

        let lenient_store = RecordingStore::seeded(Vec::new());
        let lenient = handle_signup(
            &anonymous,
            &sample_config(20),
            &lenient_store,
            &RecordingTransport::reliable(),
            &mut StdRng::seed_from_u64(42),
        );
        assert!(lenient.is_ok());

        let mut strict_config = sample_config(20);
        strict_config.id_strictness = IdStrictness::Required;
        let strict = handle_signup(
            &anonymous,
            &strict_config,
            &RecordingStore::seeded(Vec::new()),
            &RecordingTransport::reliable(),
            &mut StdRng::seed_from_u64(42),
        );
        assert!(matches!(strict, Err(SignupError::Validation(_))));
    }

    #[test]
    fn store_scan_failure_propagates_without_notification() {
        let store = RecordingStore::failing_scan();
        let transport = RecordingTransport::reliable();

        let error = handle_signup(
            &user_at("4", "Mark", 50),
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect_err("scan failure should propagate");

        assert_eq!(error, SignupError::Store("simulated scan failure".to_string()));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn delivery_exhaustion_fails_after_pool_was_persisted() {
        let store = RecordingStore::seeded(sample_pool());
        let transport = RecordingTransport::failing(usize::MAX);
        let mark = user_at("4", "Mark", 50);

        let error = handle_signup(
            &mark,
            &sample_config(3),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect_err("delivery should exhaust");

        assert_eq!(
            error,
            SignupError::Delivery(DeliveryError::Exhausted { attempts: 3 })
        );
        assert_eq!(transport.sent().len(), 3);
        // Accepted inconsistency: the pool update already happened.
        assert_eq!(store.saved(), vec![mark]);
        assert_eq!(store.deleted().len(), 1);
    }

    #[test]
    fn delivery_succeeds_on_second_attempt() {
        let store = RecordingStore::seeded(sample_pool());
        let transport = RecordingTransport::failing(1);

        let greeting = handle_signup(
            &user_at("4", "Mark", 50),
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect("second attempt should deliver");

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent()[1], greeting.to_pretty_json());
    }

    #[test]
    fn new_user_older_than_full_pool_is_not_saved() {
        let store = RecordingStore::seeded(sample_pool());
        let transport = RecordingTransport::reliable();
        let latecomer = user_at("4", "Mark", 5);

        let greeting = handle_signup(
            &latecomer,
            &sample_config(3),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect("signup should still greet");

        assert!(store.saved().is_empty());
        assert_eq!(store.deleted().len(), 1);
        assert_eq!(store.deleted()[0].id, "4");
        assert_eq!(greeting.receiver, "4");
    }

    #[test]
    fn excludes_same_named_pool_members_from_mentions() {
        let pool = vec![user_at("1", "Mark", 40), user_at("2", "Anna", 30)];
        let store = RecordingStore::seeded(pool);
        let transport = RecordingTransport::reliable();

        let greeting = handle_signup(
            &user_at("4", "Mark", 50),
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect("signup should succeed");

        assert_eq!(greeting.recent_user_ids, vec!["2"]);
    }

    #[test]
    fn empty_pool_greets_without_mentions() {
        let store = RecordingStore::seeded(Vec::new());
        let transport = RecordingTransport::reliable();

        let greeting = handle_signup(
            &user_at("4", "Mark", 50),
            &sample_config(20),
            &store,
            &transport,
            &mut StdRng::seed_from_u64(42),
        )
        .expect("signup should succeed");

        assert_eq!(greeting.message, "Hi Mark, welcome to komoot.");
        assert!(greeting.recent_user_ids.is_empty());
        assert_eq!(store.saved().len(), 1);
        assert!(store.deleted().is_empty());
    }

    #[test]
    fn extracts_record_from_sns_envelope() {
        let event = json!({
            "Records": [{
                "Sns": {
                    "Message": "{\"id\":\"10\",\"name\":\"Mark\",\"created_at\":\"2026-02-14T10:50:00.000Z\"}"
                }
            }]
        });

        let record = extract_signup_record(event).expect("envelope should unwrap");
        let user: User = serde_json::from_value(record).expect("record should deserialize");
        assert_eq!(user.id, "10");
        assert_eq!(user.name, "Mark");
    }

    #[test]
    fn accepts_bare_record_without_envelope() {
        let event = json!({
            "id": "10",
            "name": "Mark",
            "created_at": "2026-02-14T10:50:00.000Z"
        });

        let record = extract_signup_record(event.clone()).expect("bare record should pass");
        assert_eq!(record, event);
    }

    #[test]
    fn rejects_envelope_without_message() {
        let event = json!({ "Records": [{ "Sns": {} }] });
        let error = extract_signup_record(event).expect_err("missing message should fail");
        assert_eq!(error, "SNS event carries no message");
    }

    #[test]
    fn rejects_non_object_payloads() {
        let error = extract_signup_record(json!(["not", "a", "record"]))
            .expect_err("arrays should fail");
        assert_eq!(error, "Invocation payload must be a JSON object");
    }
}

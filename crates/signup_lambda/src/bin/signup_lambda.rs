use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use chrono::{DateTime, SecondsFormat, Utc};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use rand::rngs::StdRng;
use rand::SeedableRng;
use signup_core::user::{IdStrictness, User};
use signup_lambda::adapters::transport::{NotificationTransport, TransportResponse};
use signup_lambda::adapters::user_store::UserStore;
use signup_lambda::handlers::signup::{
    extract_signup_record, handle_signup, SignupHandlerConfig, DEFAULT_SENDER,
};
use signup_lambda::notify::RetryPolicy;

const DEFAULT_NOTIFICATION_ENDPOINT: &str =
    "https://notification-backend-challenge.main.komoot.net";
const DEFAULT_USER_TABLE: &str = "User";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// DynamoDB caps one BatchWriteItem call at 25 requests.
const BATCH_DELETE_CHUNK: usize = 25;

struct DynamoDbUserStore {
    table: String,
    dynamodb_client: aws_sdk_dynamodb::Client,
}

impl UserStore for DynamoDbUserStore {
    fn scan_all(&self) -> Result<Vec<User>, String> {
        let table = self.table.clone();
        let client = self.dynamodb_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut users = Vec::new();
                let mut start_key: Option<HashMap<String, AttributeValue>> = None;

                loop {
                    let output = client
                        .scan()
                        .table_name(&table)
                        .set_exclusive_start_key(start_key.take())
                        .send()
                        .await
                        .map_err(|error| format!("failed to scan user table: {error}"))?;

                    for item in output.items() {
                        users.push(user_from_item(item)?);
                    }

                    start_key = output.last_evaluated_key().cloned();
                    if start_key.is_none() {
                        break;
                    }
                }

                Ok(users)
            })
        })
    }

    fn save(&self, user: &User) -> Result<(), String> {
        let table = self.table.clone();
        let client = self.dynamodb_client.clone();
        let user = user.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_item()
                    .table_name(table)
                    .item("id", AttributeValue::S(user.id.clone()))
                    .item("name", AttributeValue::S(user.name.clone()))
                    .item(
                        "created_at",
                        AttributeValue::S(format_created_at(&user.created_at)),
                    )
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to save user {}: {error}", user.id))
            })
        })
    }

    fn batch_delete(&self, users: &[User]) -> Result<(), String> {
        let table = self.table.clone();
        let client = self.dynamodb_client.clone();
        let ids: Vec<String> = users.iter().map(|user| user.id.clone()).collect();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                for chunk in ids.chunks(BATCH_DELETE_CHUNK) {
                    let mut requests = Vec::with_capacity(chunk.len());
                    for id in chunk {
                        let delete = DeleteRequest::builder()
                            .key("id", AttributeValue::S(id.clone()))
                            .build()
                            .map_err(|error| {
                                format!("failed to build delete request for user {id}: {error}")
                            })?;
                        requests.push(WriteRequest::builder().delete_request(delete).build());
                    }

                    client
                        .batch_write_item()
                        .request_items(&table, requests)
                        .send()
                        .await
                        .map_err(|error| format!("failed to delete evicted users: {error}"))?;
                }

                Ok(())
            })
        })
    }
}

fn user_from_item(item: &HashMap<String, AttributeValue>) -> Result<User, String> {
    let id = string_attribute(item, "id")?;
    let name = string_attribute(item, "name")?;
    let raw_created_at = string_attribute(item, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&raw_created_at)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| format!("invalid created_at for user {id}: {error}"))?;

    Ok(User {
        id,
        name,
        created_at,
    })
}

fn string_attribute(item: &HashMap<String, AttributeValue>, key: &str) -> Result<String, String> {
    item.get(key)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .ok_or_else(|| format!("user item is missing string attribute '{key}'"))
}

fn format_created_at(created_at: &DateTime<Utc>) -> String {
    created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

struct HttpNotificationTransport {
    endpoint: String,
    http_client: reqwest::blocking::Client,
}

impl NotificationTransport for HttpNotificationTransport {
    fn post_json(&self, body: &str) -> Result<TransportResponse, String> {
        let request = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body.to_string());

        tokio::task::block_in_place(|| {
            let response = request
                .send()
                .map_err(|error| format!("failed to send greeting: {error}"))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .map_err(|error| format!("failed to read greeting response: {error}"))?;

            Ok(TransportResponse { status, body })
        })
    }
}

async fn handle_request(event: LambdaEvent<serde_json::Value>) -> Result<String, Error> {
    let record = extract_signup_record(event.payload).map_err(Error::from)?;
    let user: User = serde_json::from_value(record)
        .map_err(|error| Error::from(format!("invalid signup record: {error}")))?;

    let config = SignupHandlerConfig {
        sender: env_string("GREETING_SENDER", DEFAULT_SENDER),
        pool_capacity: env_usize("USER_POOL_SIZE", signup_core::pool::DEFAULT_POOL_CAPACITY)?,
        greet_count: env_usize("USERS_IN_GREETING", signup_core::selection::DEFAULT_GREET_COUNT)?,
        id_strictness: if env_flag("REQUIRE_USER_ID") {
            IdStrictness::Required
        } else {
            IdStrictness::Lenient
        },
        retry: RetryPolicy {
            max_attempts: env_usize("DELIVERY_MAX_ATTEMPTS", RetryPolicy::default().max_attempts)?,
            backoff: Duration::from_secs(env_u64(
                "DELIVERY_BACKOFF_SECONDS",
                RetryPolicy::default().backoff.as_secs(),
            )?),
        },
    };

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let user_store = DynamoDbUserStore {
        table: env_string("USER_TABLE", DEFAULT_USER_TABLE),
        dynamodb_client: aws_sdk_dynamodb::Client::new(&aws_config),
    };

    let request_timeout =
        Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECONDS", DEFAULT_REQUEST_TIMEOUT.as_secs())?);
    let transport = HttpNotificationTransport {
        endpoint: env_string("NOTIFICATION_ENDPOINT", DEFAULT_NOTIFICATION_ENDPOINT),
        http_client: tokio::task::block_in_place(|| {
            reqwest::blocking::Client::builder()
                .timeout(request_timeout)
                .build()
                .map_err(|error| Error::from(format!("failed to build http client: {error}")))
        })?,
    };

    let mut rng = StdRng::from_entropy();
    let greeting = handle_signup(&user, &config, &user_store, &transport, &mut rng)
        .map_err(|error| Error::from(error.to_string()))?;

    Ok(greeting.to_pretty_json())
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}

fn env_usize(name: &str, default: usize) -> Result<usize, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::from(format!("{name} must be an unsigned integer"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::from(format!("{name} must be an unsigned integer"))),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}

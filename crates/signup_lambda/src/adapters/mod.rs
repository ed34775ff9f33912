pub mod transport;
pub mod user_store;

pub mod auth;
pub mod b2_storage;
pub mod db;
pub mod password;
pub mod user_store;

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod lobby;
pub mod metrics;
pub mod queue;
pub mod worker_pool;

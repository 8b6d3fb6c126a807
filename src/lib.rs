pub mod alerting;
pub mod config;
pub mod db;
pub mod logging;
pub mod notifications;
pub mod scheduler;
pub mod version;

pub mod dedup;
pub mod monitor_service;

pub use dedup::SeenSet;
pub use monitor_service::{CycleOutcome, MonitorService};

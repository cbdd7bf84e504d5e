//! Per-venue polling and the pass scheduler

pub mod filter;
pub mod orchestrator;
pub mod venue;

pub use filter::{QueryPlan, build_query_plan};
pub use orchestrator::{PassSummary, WatcherOrchestrator};
pub use venue::{PassStats, VenueWatcher};

pub mod logger;
pub mod progress_tracker;
pub mod queue;
pub mod runner;
pub mod store_worker;

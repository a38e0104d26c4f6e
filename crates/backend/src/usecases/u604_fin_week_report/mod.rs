pub mod builder;
pub mod executor;
pub mod merge;

pub use executor::FinWeekExecutor;

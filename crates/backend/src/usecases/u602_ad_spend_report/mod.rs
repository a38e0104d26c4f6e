pub mod executor;
pub mod spend_column;
pub mod statistics;

pub use executor::AdSpendExecutor;

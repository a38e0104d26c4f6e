pub mod builder;
pub mod executor;

pub use executor::BalanceExecutor;

pub mod cache;

pub use cache::ServiceAccountCache;

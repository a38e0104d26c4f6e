pub mod config;
pub mod format;
pub mod http_retry;
pub mod marketplaces;
pub mod sheets;
pub mod telegram;

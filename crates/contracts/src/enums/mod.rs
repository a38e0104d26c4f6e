pub mod marketplace_type;

pub use marketplace_type::MarketplaceType;

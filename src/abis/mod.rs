pub mod account_factory;
pub mod perps_market;

pub use account_factory::AccountCreated;
pub use perps_market::IPerpsMarket;

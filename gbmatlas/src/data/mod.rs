pub mod priceseries;
pub mod provider;
pub mod sink;

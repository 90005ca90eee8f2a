pub mod core;
pub mod exchanges;
pub mod utils;

pub use core::{config::ExchangeConfig, errors::ExchangeError};
pub use exchanges::huobi::{
    HuobiBuilder, MarketClient, MarketWsClient, TradeClient, TradeWsClient, TradeWsV2Client,
};

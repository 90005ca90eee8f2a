pub mod builder;
pub mod codec;
pub mod rest;
pub mod types;
pub mod websocket;

// Re-export main components
pub use builder::{
    new_market_client, new_market_ws_client, new_trade_client, new_trade_ws_client,
    new_trade_ws_v2_client, HuobiBuilder,
};
pub use codec::{MarketCodec, TradeV1Codec, TradeV2Codec};
pub use rest::{MarketClient, TradeClient};
pub use types::{
    Account, AccountBalance, BalanceEntry, HuobiResponse, HuobiTick, Kline, MergedTicker,
    SymbolInfo, TradeDetail, TradeDirection, TradeEntry,
};
pub use websocket::{HuobiWsClient, MarketWsClient, TradeWsClient, TradeWsV2Client};

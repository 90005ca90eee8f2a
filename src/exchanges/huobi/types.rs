use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// REST envelope for calls answering with `data`
#[derive(Debug, Clone, Deserialize)]
pub struct HuobiResponse<T> {
    pub status: String,
    #[serde(default)]
    pub ch: Option<String>,
    #[serde(default)]
    pub ts: Option<u64>,
    pub data: T,
}

/// Envelope for market calls and pushes answering with `tick`
#[derive(Debug, Clone, Deserialize)]
pub struct HuobiTick<T> {
    #[serde(default)]
    pub status: Option<String>,
    pub ch: String,
    pub ts: u64,
    pub tick: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeEntry {
    /// Exceeds 64 bits on the wire, kept as a JSON number
    pub id: Number,
    pub ts: u64,
    #[serde(rename = "tradeId", default)]
    pub trade_id: Option<u64>,
    pub amount: Decimal,
    pub price: Decimal,
    pub direction: TradeDirection,
}

/// `market.$symbol.trade.detail` tick
#[derive(Debug, Clone, Deserialize)]
pub struct TradeDetail {
    pub id: u64,
    pub ts: u64,
    pub data: Vec<TradeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Kline {
    pub id: u64,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub amount: Decimal,
    pub vol: Decimal,
    pub count: u64,
}

/// Aggregated ticker with best bid/ask as `[price, size]`
#[derive(Debug, Clone, Deserialize)]
pub struct MergedTicker {
    pub id: u64,
    #[serde(default)]
    pub version: Option<u64>,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub amount: Decimal,
    pub vol: Decimal,
    pub count: u64,
    pub bid: [Decimal; 2],
    pub ask: [Decimal; 2],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SymbolInfo {
    pub base_currency: String,
    pub quote_currency: String,
    pub price_precision: u32,
    pub amount_precision: u32,
    pub symbol_partition: String,
    pub symbol: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: u64,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceEntry {
    pub currency: String,
    /// `trade` or `frozen`
    #[serde(rename = "type")]
    pub balance_type: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalance {
    pub id: u64,
    #[serde(rename = "type")]
    pub account_type: String,
    pub state: String,
    pub list: Vec<BalanceEntry>,
}

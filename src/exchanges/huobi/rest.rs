use crate::core::errors::ExchangeError;
use crate::core::kernel::query::Params;
use crate::core::kernel::{ReqwestRest, RestClient};
use crate::exchanges::huobi::types::{
    Account, AccountBalance, HuobiResponse, HuobiTick, Kline, MergedTicker, SymbolInfo,
    TradeDetail,
};
use serde_json::Value;
use tracing::instrument;

fn symbol_params(symbol: &str) -> Params {
    let mut params = Params::new();
    params.insert("symbol".to_string(), Value::String(symbol.to_string()));
    params
}

/// Public market data over REST, no credentials needed
#[derive(Debug, Clone)]
pub struct MarketClient<R: RestClient = ReqwestRest> {
    rest: R,
}

impl<R: RestClient> MarketClient<R> {
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    /// Unsigned GET; parameters go in the canonical query string
    pub async fn get(&self, path: &str, params: Option<&Params>) -> Result<Value, ExchangeError> {
        self.rest.get(path, params, false).await
    }

    /// Unsigned POST; parameters go in the JSON body
    pub async fn post(&self, path: &str, params: Option<&Params>) -> Result<Value, ExchangeError> {
        self.rest.post(path, params, false).await
    }

    #[instrument(skip(self), fields(exchange = "huobi", symbol = %symbol))]
    pub async fn get_kline(
        &self,
        symbol: &str,
        period: &str,
        size: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let mut params = symbol_params(symbol);
        params.insert("period".to_string(), Value::String(period.to_string()));
        params.insert("size".to_string(), Value::from(size));

        let response: HuobiResponse<Vec<Kline>> = self
            .rest
            .get_json("/market/history/kline", Some(&params), false)
            .await?;
        Ok(response.data)
    }

    #[instrument(skip(self), fields(exchange = "huobi", symbol = %symbol))]
    pub async fn get_merged_ticker(&self, symbol: &str) -> Result<MergedTicker, ExchangeError> {
        let response: HuobiTick<MergedTicker> = self
            .rest
            .get_json("/market/detail/merged", Some(&symbol_params(symbol)), false)
            .await?;
        Ok(response.tick)
    }

    /// Most recent trades for `symbol`
    #[instrument(skip(self), fields(exchange = "huobi", symbol = %symbol))]
    pub async fn get_trade_detail(&self, symbol: &str) -> Result<TradeDetail, ExchangeError> {
        let response: HuobiTick<TradeDetail> = self
            .rest
            .get_json("/market/trade", Some(&symbol_params(symbol)), false)
            .await?;
        Ok(response.tick)
    }

    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_symbols(&self) -> Result<Vec<SymbolInfo>, ExchangeError> {
        let response: HuobiResponse<Vec<SymbolInfo>> = self
            .rest
            .get_json("/v1/common/symbols", None, false)
            .await?;
        Ok(response.data)
    }
}

/// Signed account and trading calls over REST
///
/// GET merges the sign fields with the caller's parameters and signs the
/// whole set. POST signs only the sign fields and sends the caller's
/// parameters unsigned as the JSON body.
#[derive(Debug, Clone)]
pub struct TradeClient<R: RestClient = ReqwestRest> {
    rest: R,
}

impl<R: RestClient> TradeClient<R> {
    /// `rest` must carry a signer
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    pub async fn get(&self, path: &str, params: Option<&Params>) -> Result<Value, ExchangeError> {
        self.rest.get(path, params, true).await
    }

    pub async fn post(&self, path: &str, params: Option<&Params>) -> Result<Value, ExchangeError> {
        self.rest.post(path, params, true).await
    }

    #[instrument(skip(self), fields(exchange = "huobi"))]
    pub async fn get_accounts(&self) -> Result<Vec<Account>, ExchangeError> {
        let response: HuobiResponse<Vec<Account>> = self
            .rest
            .get_json("/v1/account/accounts", None, true)
            .await?;
        Ok(response.data)
    }

    #[instrument(skip(self), fields(exchange = "huobi", account_id = account_id))]
    pub async fn get_account_balance(
        &self,
        account_id: u64,
    ) -> Result<AccountBalance, ExchangeError> {
        let path = format!("/v1/account/accounts/{}/balance", account_id);
        let response: HuobiResponse<AccountBalance> =
            self.rest.get_json(&path, None, true).await?;
        Ok(response.data)
    }
}

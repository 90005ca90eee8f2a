use huobi_api::utils::logging::init_logging;
use huobi_api::HuobiBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug = std::env::var("HUOBI_DEBUG").is_ok();
    init_logging(debug);

    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "market.btcusdt.trade.detail".to_string());

    let builder = HuobiBuilder::new();

    let symbols = builder.build_market_rest()?.get_symbols().await?;
    info!("Found {} symbols", symbols.len());

    let market = builder.build_market_ws().await?;
    market
        .subscribe(&topic, |topic, document| {
            info!(topic = %topic, "{}", document["tick"]);
        })
        .await?;
    info!(topic = %topic, "Subscribed, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    market.close().await;
    Ok(())
}

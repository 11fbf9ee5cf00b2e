// demos/ws_market.rs
use kucoin_futures_connector_rs::types::{FuturesMarket, KucoinWebsocketConfig};
use kucoin_futures_connector_rs::websocket::{KucoinFuturesWsClient, StreamHandlers};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Optional: Load .env file if you have one
    dotenv::dotenv().ok();

    let symbols: Vec<String> = std::env::args().skip(1).collect();
    let symbols: Vec<&str> = if symbols.is_empty() {
        vec!["XBTUSDM"]
    } else {
        symbols.iter().map(String::as_str).collect()
    };

    let handlers = StreamHandlers::new()
        .on_welcome(|| info!("session established"))
        .on_symbol_ticker(|ticker| {
            info!(
                "{}: last={} bid={} ask={} seq={}",
                ticker.symbol, ticker.price, ticker.best_bid_price, ticker.best_ask_price,
                ticker.sequence
            );
        })
        .on_diagnostic(|diagnostic| warn!("diagnostic: {:?}", diagnostic));

    info!("Connecting to the public market stream...");
    let client = KucoinFuturesWsClient::connect(
        KucoinWebsocketConfig::market_stream(FuturesMarket::Coinm),
        handlers,
    )
    .await?;

    client.subscribe_symbol_ticker(&symbols).await?;
    info!("Subscribed to tickers for {:?}", symbols);

    // Keep the connection alive for a while
    info!("Listening for messages for 60 seconds...");
    sleep(Duration::from_secs(60)).await;

    client.close().await;
    info!("Client closed.");
    Ok(())
}

// demos/ws_user.rs
use kucoin_futures_connector_rs::types::{
    BalanceUpdateEvent, FuturesMarket, KucoinWebsocketConfig,
};
use kucoin_futures_connector_rs::websocket::{KucoinFuturesWsClient, StreamHandlers};
use std::env;
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

    // Load configuration from environment variables
    let api_key = env::var("KUCOIN_API_KEY").expect("KUCOIN_API_KEY not set");
    let api_secret = env::var("KUCOIN_API_SECRET").expect("KUCOIN_API_SECRET not set");
    let api_passphrase = env::var("KUCOIN_API_PASSPHRASE").expect("KUCOIN_API_PASSPHRASE not set");
    let is_test: bool = env::var("KUCOIN_SANDBOX")
        .unwrap_or("true".to_string())
        .parse()
        .expect("KUCOIN_SANDBOX must be true or false");

    let mut config = KucoinWebsocketConfig::user_stream(
        FuturesMarket::Usdm,
        api_key,
        api_secret,
        api_passphrase,
    );
    config.is_test = is_test;

    let handlers = StreamHandlers::new()
        .on_welcome(|| info!("session established"))
        .on_order_update(|order| {
            info!(
                "order {} [{}] {:?} {} @ {} -> {}",
                order.order_id, order.symbol, order.side, order.size, order.price, order.status
            );
        })
        .on_balance_update(|balance| match balance {
            BalanceUpdateEvent::AvailableBalance(event) => info!(
                "balance: available={} hold={} {}",
                event.available_balance, event.hold_balance, event.currency
            ),
            BalanceUpdateEvent::OrderMargin(event) => {
                info!("order margin: {} {}", event.order_margin, event.currency)
            }
        })
        .on_position_change(|position| {
            info!(
                "position {}: qty={} entry={} mark={} upnl={}",
                position.symbol,
                position.current_qty,
                position.avg_entry_price,
                position.mark_price,
                position.unrealised_pnl
            );
        })
        .on_diagnostic(|diagnostic| warn!("diagnostic: {:?}", diagnostic));

    info!("Connecting to the private user stream (sandbox: {})...", is_test);
    let client = KucoinFuturesWsClient::connect(config, handlers).await?;

    client.subscribe_trade_orders().await?;
    client.subscribe_balance().await?;
    info!("Subscribed to order and balance streams.");

    // Keep alive until Ctrl+C
    tokio::signal::ctrl_c().await?;
    client.close().await;
    info!("Client closed.");
    Ok(())
}

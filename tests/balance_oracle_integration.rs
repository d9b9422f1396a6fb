//! Integration tests for the JSON-RPC balance oracle and the price feed
//!
//! Both endpoints are served by a local wiremock server; retry waits are
//! recorded instead of slept.

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::rpc;
use sharp_monitor::common::retry::RecordingSleeper;
use sharp_monitor::common::traits::{BalanceOracle, PriceFeed};
use sharp_monitor::common::types::{USDC_MINT, WRAPPED_SOL_MINT};
use sharp_monitor::{Asset, CoinGeckoPriceFeed, MonitorError, RpcBalanceOracle};

const WALLET: &str = "BotWa11et1111111111111111111111111111111111";

fn oracle(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> RpcBalanceOracle {
    RpcBalanceOracle::new(&server.uri())
        .expect("Failed to create oracle")
        .with_sleeper(sleeper)
}

#[tokio::test]
async fn test_sol_balance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "getBalance", "params": [WALLET]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::balance(2_500_000_000)))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = oracle(&server, Arc::new(RecordingSleeper::new()));
    let balance = oracle.balance(WALLET, Asset::Sol).await.unwrap();
    assert_eq!(balance, dec!(2.5));
}

#[tokio::test]
async fn test_token_balances_use_mint_filter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getTokenAccountsByOwner",
            "params": [WALLET, {"mint": WRAPPED_SOL_MINT}, {"encoding": "jsonParsed"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::token_accounts(&["750000000"])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getTokenAccountsByOwner",
            "params": [WALLET, {"mint": USDC_MINT}, {"encoding": "jsonParsed"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::token_accounts(&["12340000"])))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Arc::new(RecordingSleeper::new()));
    assert_eq!(oracle.balance(WALLET, Asset::WrappedSol).await.unwrap(), dec!(0.75));
    assert_eq!(oracle.balance(WALLET, Asset::Usdc).await.unwrap(), dec!(12.34));
}

#[tokio::test]
async fn test_no_token_account_is_zero() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::token_accounts(&[])))
        .mount(&server)
        .await;

    let oracle = oracle(&server, Arc::new(RecordingSleeper::new()));
    assert_eq!(oracle.balance(WALLET, Asset::Usdc).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn test_rpc_rate_limit_is_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::error(429, "Too many requests")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::balance(1_000_000_000)))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let oracle = oracle(&server, sleeper.clone());
    assert_eq!(oracle.balance(WALLET, Asset::Sol).await.unwrap(), dec!(1));
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_http_rate_limit_waits_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::balance(500_000_000)))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let oracle = oracle(&server, sleeper.clone());
    assert_eq!(oracle.balance(WALLET, Asset::Sol).await.unwrap(), dec!(0.5));
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(7100); 2]);
}

#[tokio::test]
async fn test_gives_up_after_retry_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let oracle = oracle(&server, sleeper.clone());
    let err = oracle.balance(WALLET, Asset::Sol).await.unwrap_err();

    assert!(matches!(err, MonitorError::RetriesExhausted { attempts: 5, .. }));
    let secs: Vec<u64> = sleeper.waits().iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![1, 2, 4, 8]);
}

#[tokio::test]
async fn test_invalid_params_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc::error(-32602, "Invalid param: WrongSize")))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let oracle = oracle(&server, sleeper.clone());
    let err = oracle.balance("short", Asset::Sol).await.unwrap_err();

    assert!(matches!(err, MonitorError::Rpc { code: -32602, .. }));
    assert!(sleeper.waits().is_empty());
}

// ============================================================================
// Price feed
// ============================================================================

#[tokio::test]
async fn test_sol_usd_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/simple/price"))
        .and(query_param("ids", "solana"))
        .and(query_param("vs_currencies", "usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"solana": {"usd": 148.37}})))
        .mount(&server)
        .await;

    let feed = CoinGeckoPriceFeed::new(&format!("{}/api/v3/simple/price", server.uri())).unwrap();
    assert_eq!(feed.usd_price(Asset::Sol).await.unwrap(), dec!(148.37));
}

#[tokio::test]
async fn test_missing_price_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let feed = CoinGeckoPriceFeed::new(&server.uri()).unwrap();
    assert!(feed.usd_price(Asset::Sol).await.is_err());
}

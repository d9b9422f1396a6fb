//! Common test utilities and fixtures

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use sharp_monitor::common::retry::{BackoffPolicy, RecordingSleeper};
use sharp_monitor::{DispatchClient, WebhookSink};

/// Dispatch client over a real webhook sink that records waits instead of sleeping
pub fn recording_client(sleeper: Arc<RecordingSleeper>) -> DispatchClient {
    let sink = WebhookSink::new().expect("Failed to create webhook sink");
    DispatchClient::new(Arc::new(sink), BackoffPolicy::default()).with_sleeper(sleeper)
}

/// JSON-RPC responses from the balance oracle
pub mod rpc {
    use super::*;

    pub fn balance(lamports: u64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"context": {"slot": 250_000_000u64}, "value": lamports}
        })
    }

    pub fn token_accounts(amounts: &[&str]) -> Value {
        let accounts: Vec<Value> = amounts
            .iter()
            .map(|amount| {
                json!({
                    "pubkey": "TokenAccount1111111111111111111111111111111",
                    "account": {
                        "data": {
                            "parsed": {
                                "info": {
                                    "tokenAmount": {"amount": amount, "decimals": 9}
                                },
                                "type": "account"
                            },
                            "program": "spl-token"
                        },
                        "lamports": 2039280
                    }
                })
            })
            .collect();
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"context": {"slot": 250_000_000u64}, "value": accounts}
        })
    }

    pub fn error(code: i64, message: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": code, "message": message}
        })
    }
}

/// Channel history payloads
pub mod discord {
    use super::*;

    /// A signal message with a block difference and optional GRPC tag
    pub fn signal_message(id: &str, channel_id: &str, timestamp: &str, blocks: &str, grpc: Option<&str>) -> Value {
        let mut fields = vec![json!({"name": "Block Difference", "value": blocks, "inline": true})];
        if let Some(grpc) = grpc {
            fields.push(json!({"name": "GRPC", "value": grpc, "inline": true}));
        }
        json!({
            "id": id,
            "channel_id": channel_id,
            "timestamp": timestamp,
            "content": "",
            "embeds": [{"title": "Snipe", "fields": fields}]
        })
    }
}

/// Session CSV contents
pub mod sessions {
    pub const HEADER: &str = "Date,Token,Action,Invested,Received,Target Wallet";

    pub fn csv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out.push('\n');
        out
    }
}

//! Mock cluster RPC for endpoint and adapter tests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use solana_transaction::versioned::VersionedTransaction;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers a JSON-RPC request, echoing its id.
struct JsonRpc(Value);

impl Respond for JsonRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        ResponseTemplate::new(200)
            .set_body_json(json!({"jsonrpc": "2.0", "id": body["id"], "result": self.0}))
    }
}

/// Accepts `sendTransaction`, answering with the transaction's own signature.
struct Broadcast;

impl Respond for Broadcast {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let encoded = body["params"][0].as_str().unwrap();
        let raw = STANDARD
            .decode(encoded)
            .or_else(|_| bs58::decode(encoded).into_vec())
            .unwrap();
        let tx: VersionedTransaction = bincode::deserialize(&raw).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": tx.signatures[0].to_string()
        }))
    }
}

/// Answers every call of `rpc_method` with `result`.
pub(crate) async fn mock(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(JsonRpc(result))
        .mount(server)
        .await;
}

/// Answers every call of `rpc_method` with a JSON-RPC error.
pub(crate) async fn mock_error(server: &MockServer, rpc_method: &str, code: i64, message: &str) {
    let message = message.to_owned();
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(move |request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": {"code": code, "message": message}
            }))
        })
        .mount(server)
        .await;
}

/// Accepts every broadcast.
pub(crate) async fn mock_send(server: &MockServer) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "sendTransaction"})))
        .respond_with(Broadcast)
        .mount(server)
        .await;
}

/// One `getSignatureStatuses` entry.
pub(crate) fn signature_status(err: Option<Value>, confirmation: &str) -> Value {
    let status = err
        .clone()
        .map_or_else(|| json!({"Ok": null}), |e| json!({"Err": e}));
    json!({
        "slot": 100,
        "confirmations": null,
        "err": err,
        "status": status,
        "confirmationStatus": confirmation
    })
}

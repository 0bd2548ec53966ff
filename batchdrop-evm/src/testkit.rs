//! Mock JSON-RPC node for endpoint and adapter tests.

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub(crate) const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";
pub(crate) const SIGNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// A JSON-RPC result or an error `(code, message)`.
pub(crate) type Reply = Result<Value, (i64, &'static str)>;

/// Answers a JSON-RPC request, echoing its id.
struct JsonRpc(Reply);

impl Respond for JsonRpc {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let reply = match &self.0 {
            Ok(result) => json!({"jsonrpc": "2.0", "id": body["id"], "result": result}),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": {"code": code, "message": message}
            }),
        };
        ResponseTemplate::new(200).set_body_json(reply)
    }
}

/// Answers every call of `rpc_method` with `reply`.
pub(crate) async fn mock(server: &MockServer, rpc_method: &str, reply: Reply) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(JsonRpc(reply))
        .mount(server)
        .await;
}

/// Answers the first `times` calls of `rpc_method` with `reply`, then defers to
/// mocks mounted after it.
pub(crate) async fn mock_times(server: &MockServer, rpc_method: &str, reply: Reply, times: u64) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(JsonRpc(reply))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// A mined EIP-1559 receipt with the given status (`"0x1"` success, `"0x0"` revert).
pub(crate) fn receipt(status: &str) -> Value {
    json!({
        "transactionHash": HASH,
        "transactionIndex": "0x0",
        "blockHash": "0x1d59ff54b1eb26b013ce3cb5fc9dab3705b415a67127a003c3e61eb445bb8df2",
        "blockNumber": "0x10",
        "from": SIGNER,
        "to": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "contractAddress": null,
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "type": "0x2",
        "status": status
    })
}

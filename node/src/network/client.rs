// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::judge::{Judge, JudgeError, JudgeResult};
use async_trait::async_trait;
use opml_kernel::protocol::JudgeCall;
use opml_kernel::types::{ChallengeId, Hash32, Role};
use opml_kernel::witness::revert_reason;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON-RPC error code for a call that executed and reverted.
pub const REVERT_CODE: i64 = 3;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Selector of the Solidity `Error(string)` revert payload.
const ERROR_SELECTOR: &str = "08c379a0";

impl RpcErrorObject {
    fn into_judge_error(self) -> JudgeError {
        let reverted = self.code == REVERT_CODE || self.message.contains("execution reverted");
        if !reverted {
            return JudgeError::Transport(format!("rpc error {}: {}", self.code, self.message));
        }
        let data = match &self.data {
            Some(Value::String(data)) => Some(data.as_str()),
            _ => None,
        };
        let reason = data
            .and_then(decode_error_string)
            .or_else(|| revert_reason(&self.message).map(str::to_string))
            .or_else(|| data.map(str::to_string))
            .unwrap_or_else(|| self.message.clone());
        JudgeError::Reverted(reason)
    }
}

/// Reason string of an ABI-encoded `Error(string)` payload: selector, offset
/// word, then a length-prefixed UTF-8 string at that offset.
fn decode_error_string(data: &str) -> Option<String> {
    let body = data.strip_prefix("0x").unwrap_or(data).strip_prefix(ERROR_SELECTOR)?;
    let bytes = hex::decode(body).ok()?;
    let word = |at: usize| -> Option<usize> {
        let w = bytes.get(at..at.checked_add(32)?)?;
        if w[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&w[24..]);
        usize::try_from(u64::from_be_bytes(buf)).ok()
    };
    let offset = word(0)?;
    let len = word(offset)?;
    let start = offset.checked_add(32)?;
    let raw = bytes.get(start..start.checked_add(len)?)?;
    String::from_utf8(raw.to_vec()).ok()
}

/// JSON-RPC judge gateway, bound to one role's account.
///
/// Every method maps to `opml_<name>` with named params. Mutations carry a
/// `from` field naming the role; trie nodes travel as `0x` hex.
#[derive(Debug)]
pub struct JudgeRpcClient {
    base_url: String,
    client: Client,
    role: Role,
    next_id: AtomicU64,
}

impl JudgeRpcClient {
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Self::with_client(Client::new(), url, role)
    }

    /// Shares one connection pool between both roles' handles.
    pub fn with_client(client: Client, url: impl Into<String>, role: Role) -> Self {
        let url = url.into();
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
            role,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn rpc_call<T: DeserializeOwned>(&self, method: &str, params: Value) -> JudgeResult<T> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": format!("opml_{}", method),
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(JudgeError::Transport(format!("{} failed: {}", method, resp.status())));
        }

        let body: RpcResponse = resp
            .json()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(err.into_judge_error());
        }
        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|e| JudgeError::Transport(format!("{}: bad result: {}", method, e)))
    }

    async fn query<T: DeserializeOwned>(&self, method: &str, id: ChallengeId) -> JudgeResult<T> {
        self.rpc_call(method, json!({ "challengeId": id })).await
    }

    async fn send(&self, method: &str, mut params: Value) -> JudgeResult<()> {
        if let Value::Object(map) = &mut params {
            map.insert("from".into(), json!(self.role));
        }
        self.rpc_call(method, params).await
    }
}

fn hex_node(node: &[u8]) -> String {
    format!("0x{}", hex::encode(node))
}

#[async_trait]
impl Judge for JudgeRpcClient {
    fn role(&self) -> Role {
        self.role
    }

    async fn current_step(&self, id: ChallengeId) -> JudgeResult<u64> {
        self.query("currentStep", id).await
    }

    async fn current_layer(&self, id: ChallengeId) -> JudgeResult<u32> {
        self.query("currentLayer", id).await
    }

    async fn total_layer(&self, id: ChallengeId) -> JudgeResult<u32> {
        self.query("totalLayer", id).await
    }

    async fn node_id(&self, id: ChallengeId) -> JudgeResult<u64> {
        self.query("nodeID", id).await
    }

    async fn is_searching(&self, id: ChallengeId) -> JudgeResult<bool> {
        self.query("isSearching", id).await
    }

    async fn proposed_state(&self, id: ChallengeId) -> JudgeResult<Hash32> {
        self.query("proposedState", id).await
    }

    async fn checkpoint_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<i64> {
        self.rpc_call("checkpointAt", json!({ "challengeId": id, "layer": layer })).await
    }

    async fn step_count_at(&self, id: ChallengeId, layer: u32) -> JudgeResult<u64> {
        self.rpc_call("stepCountAt", json!({ "challengeId": id, "layer": layer })).await
    }

    async fn claimed_result(&self) -> JudgeResult<Hash32> {
        self.rpc_call("claimedResult", json!({})).await
    }

    async fn submit_result(&self, root: Hash32) -> JudgeResult<()> {
        self.send("submitResult", json!({ "root": root })).await
    }

    async fn initiate_challenge(
        &self,
        root: Hash32,
        step_total: u64,
        total_layers: u32,
    ) -> JudgeResult<ChallengeId> {
        let params = json!({
            "from": self.role,
            "root": root,
            "stepTotal": step_total,
            "totalLayers": total_layers,
        });
        self.rpc_call("initiateChallenge", params).await
    }

    async fn propose_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()> {
        self.send("proposeState", json!({ "challengeId": id, "root": root })).await
    }

    async fn respond_state(&self, id: ChallengeId, root: Hash32) -> JudgeResult<()> {
        self.send("respondState", json!({ "challengeId": id, "root": root })).await
    }

    async fn advance_layer(
        &self,
        id: ChallengeId,
        start_root: Hash32,
        end_root: Hash32,
        end_step_count: u64,
    ) -> JudgeResult<()> {
        let params = json!({
            "challengeId": id,
            "startRoot": start_root,
            "endRoot": end_root,
            "endStepCount": end_step_count,
        });
        self.send("advanceLayer", params).await
    }

    async fn confirm_transition(&self, id: ChallengeId) -> JudgeResult<()> {
        self.send("confirmStateTransition", json!({ "challengeId": id })).await
    }

    async fn deny_transition(&self, id: ChallengeId) -> JudgeResult<()> {
        self.send("denyStateTransition", json!({ "challengeId": id })).await
    }

    async fn call_with_witness(&self, call: &JudgeCall, nodes: &[Vec<u8>]) -> JudgeResult<()> {
        let nodes: Vec<String> = nodes.iter().map(|n| hex_node(n)).collect();
        self.send("callWithWitness", json!({ "call": call, "nodes": nodes })).await
    }

    async fn supply_node(&self, node: &[u8]) -> JudgeResult<()> {
        self.send("supplyNode", json!({ "node": hex_node(node) })).await
    }
}

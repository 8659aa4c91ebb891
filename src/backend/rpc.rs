use super::{Backend, ValueWrite};
use crate::error::{Result, SignError};
use crate::model::{DocumentInfo, Item, ItemId, ItemPatch, NewItem, RecordId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC client for the `call_kw` endpoint of the document server.
pub struct RpcBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    session_id: Option<String>,
    next_request: u64,
}

#[derive(Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcFault>,
}

#[derive(Deserialize)]
struct RpcFault {
    #[serde(default)]
    message: String,
    data: Option<RpcFaultData>,
}

#[derive(Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    message: String,
}

impl RpcBackend {
    pub fn new(base_url: &str, model: &str, session_id: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SignError::backend("connect", e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            session_id,
            next_request: 1,
        })
    }

    fn call<T: DeserializeOwned>(&mut self, method: &'static str, args: Value) -> Result<T> {
        let body = self.send(method, args)?;
        parse_reply(method, &body)
    }

    fn ack(&mut self, method: &'static str, args: Value) -> Result<()> {
        let body = self.send(method, args)?;
        parse_ack(method, &body)
    }

    fn send(&mut self, method: &'static str, args: Value) -> Result<String> {
        let id = self.next_request;
        self.next_request += 1;
        let url = format!("{}/web/dataset/call_kw/{}/{}", self.base_url, self.model, method);
        debug!(%url, id, "rpc call");
        let mut request = self
            .client
            .post(&url)
            .json(&request_body(&self.model, method, args, id));
        if let Some(session) = &self.session_id {
            request = request.header(reqwest::header::COOKIE, format!("session_id={session}"));
        }
        request
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| SignError::backend(method, e.to_string()))
    }
}

fn request_body(model: &str, method: &str, args: Value, id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "call",
        "params": {
            "model": model,
            "method": method,
            "args": args,
            "kwargs": {},
        },
        "id": id,
    })
}

fn decode<T: DeserializeOwned>(method: &'static str, body: &str) -> Result<Option<T>> {
    let reply: RpcReply<T> =
        serde_json::from_str(body).map_err(|e| SignError::backend(method, e.to_string()))?;
    if let Some(fault) = reply.error {
        let message = match fault.data {
            Some(data) if !data.message.is_empty() => data.message,
            _ => fault.message,
        };
        warn!(method, %message, "server rejected call");
        return Err(SignError::backend(method, message));
    }
    Ok(reply.result)
}

fn parse_reply<T: DeserializeOwned>(method: &'static str, body: &str) -> Result<T> {
    decode(method, body)?.ok_or_else(|| SignError::backend(method, "reply carried no result"))
}

fn parse_ack(method: &'static str, body: &str) -> Result<()> {
    decode::<Value>(method, body).map(drop)
}

fn write_args(record: RecordId, writes: &[ValueWrite]) -> Value {
    let ops: Vec<Value> = writes
        .iter()
        .map(|w| json!([1, w.item, w.values]))
        .collect();
    json!([[record], {"item_ids": ops}])
}

impl Backend for RpcBackend {
    fn get_info(&mut self, record: RecordId) -> Result<DocumentInfo> {
        self.call("get_info", json!([[record]]))
    }

    fn add_item(&mut self, record: RecordId, item: &NewItem) -> Result<Item> {
        self.call("add_item", json!([[record], item]))
    }

    fn set_item_data(&mut self, record: RecordId, item: ItemId, patch: &ItemPatch) -> Result<()> {
        self.ack("set_item_data", json!([[record], item, patch]))
    }

    fn delete_item(&mut self, record: RecordId, item: ItemId) -> Result<()> {
        self.ack("delete_item", json!([[record], item]))
    }

    fn write(&mut self, record: RecordId, writes: &[ValueWrite]) -> Result<()> {
        self.ack("write", write_args(record, writes))
    }

    fn action_sign(&mut self, record: RecordId) -> Result<()> {
        self.ack("action_sign", json!([[record]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemValues;

    #[test]
    fn body_wraps_call_kw_params() {
        let body = request_body("sign.oca.request", "get_info", json!([[4]]), 9);
        assert_eq!(body["params"]["method"], "get_info");
        assert_eq!(body["params"]["args"], json!([[4]]));
        assert_eq!(body["id"], 9);
    }

    #[test]
    fn write_uses_update_operations() {
        let args = write_args(
            4,
            &[ValueWrite {
                item: 12,
                values: ItemValues { value_text: Some("Ada".into()), value_binary: None },
            }],
        );
        assert_eq!(args, json!([[4], {"item_ids": [[1, 12, {"value_text": "Ada"}]]}]));
    }

    #[test]
    fn server_fault_becomes_backend_error() {
        let body = r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": 200, "message": "Odoo Server Error",
            "data": {"message": "Field Name is not filled"}}}"#;
        let err = parse_ack("action_sign", body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "backend call `action_sign` failed: Field Name is not filled"
        );
    }

    #[test]
    fn acknowledgements_need_no_content() {
        assert!(parse_ack("delete_item", r#"{"jsonrpc": "2.0", "id": 1, "result": true}"#).is_ok());
        assert!(parse_ack("write", r#"{"jsonrpc": "2.0", "id": 2, "result": null}"#).is_ok());
        assert!(parse_reply::<Item>("add_item", r#"{"jsonrpc": "2.0", "id": 3, "result": null}"#).is_err());
    }
}

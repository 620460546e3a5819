//! Remote mail backend: JSON-RPC 2.0 over HTTP, used when an agent mail URL
//! is configured. Every operation maps to a `tools/call` request naming one
//! of the four mail tools; results may arrive as a bare JSON payload or
//! wrapped in a `content[]` envelope of typed `json`/`text` entries.

use crate::model::{Importance, InboxQuery, MailMessage};
use forge_core::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RemoteMail {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ToolCallParams,
}

#[derive(Serialize)]
struct ToolCallParams {
    name: &'static str,
    arguments: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ContentEnvelope {
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentItem {
    Json { json: Value },
    Text { text: String },
}

impl RemoteMail {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::MailBackend(e.to_string()))?;
        Ok(Self { client, url: url.into(), timeout })
    }

    pub async fn send(
        &self,
        project: &str,
        sender: &str,
        recipients: &[String],
        subject: &str,
        body: &str,
        importance: Importance,
        ack_required: bool,
        thread_id: Option<&str>,
    ) -> Result<Vec<i64>> {
        let args = json!({
            "project": project,
            "from": sender,
            "to": recipients,
            "subject": subject,
            "body": body,
            "importance": importance.to_string(),
            "ack_required": ack_required,
            "thread_id": thread_id,
        });
        let result = self.call("send_message", args).await?;
        let ids = result
            .get("ids")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
            .ok_or_else(|| ForgeError::MailBackend("send_message result missing ids[]".into()))?;
        Ok(ids)
    }

    pub async fn inbox(&self, project: &str, agent: &str, query: &InboxQuery) -> Result<Vec<MailMessage>> {
        let args = json!({
            "project": project,
            "agent": agent,
            "since": query.since,
            "unread_only": query.unread_only,
            "limit": query.limit,
            "include_bodies": query.include_bodies,
        });
        let result = self.call("fetch_inbox", args).await?;
        let messages = result
            .get("messages")
            .cloned()
            .unwrap_or(result);
        serde_json::from_value(messages).map_err(|e| ForgeError::MailBackend(format!("malformed inbox: {e}")))
    }

    pub async fn read(&self, project: &str, agent: &str, message_id: i64) -> Result<MailMessage> {
        let args = json!({"project": project, "agent": agent, "message_id": message_id, "include_bodies": true});
        let result = self.call("mark_message_read", args).await?;
        serde_json::from_value(result).map_err(|e| ForgeError::MailBackend(format!("malformed message: {e}")))
    }

    pub async fn ack(&self, project: &str, agent: &str, message_id: i64) -> Result<()> {
        let args = json!({"project": project, "agent": agent, "message_id": message_id});
        self.call("acknowledge_message", args).await?;
        Ok(())
    }

    async fn call(&self, tool: &'static str, arguments: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "tools/call",
            params: ToolCallParams { name: tool, arguments },
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&self.url).json(&request).send(),
        )
        .await
        .map_err(|_| ForgeError::MailBackend(format!("{tool} request timed out")))?
        .map_err(|e| ForgeError::MailBackend(format!("{tool} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForgeError::MailBackend(format!("{tool} returned HTTP {status}")));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::MailBackend(format!("{tool} response was not valid JSON-RPC: {e}")))?;

        if let Some(error) = body.error {
            return Err(ForgeError::MailBackend(format!("{tool} rpc error {}: {}", error.code, error.message)));
        }

        let result = body.result.ok_or_else(|| ForgeError::MailBackend(format!("{tool} response had no result")))?;
        decode_result(result)
    }
}

/// Normalizes a `tools/call` result into a plain JSON value, unwrapping a
/// `content[]` envelope when present and merging its entries.
fn decode_result(result: Value) -> Result<Value> {
    match serde_json::from_value::<ContentEnvelope>(result.clone()) {
        Ok(envelope) => {
            for item in envelope.content {
                match item {
                    ContentItem::Json { json } => return Ok(json),
                    ContentItem::Text { text } => {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            return Ok(value);
                        }
                        return Ok(Value::String(text));
                    }
                }
            }
            Ok(Value::Null)
        }
        Err(_) => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_result_passes_through_bare_payload() {
        let value = json!({"ids": [1, 2]});
        let decoded = decode_result(value.clone()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_result_unwraps_json_content_entry() {
        let wrapped = json!({"content": [{"type": "json", "json": {"ids": [3]}}]});
        let decoded = decode_result(wrapped).unwrap();
        assert_eq!(decoded, json!({"ids": [3]}));
    }

    #[test]
    fn decode_result_parses_text_content_entry_as_json_when_possible() {
        let wrapped = json!({"content": [{"type": "text", "text": "{\"ids\":[4]}"}]});
        let decoded = decode_result(wrapped).unwrap();
        assert_eq!(decoded, json!({"ids": [4]}));
    }

    #[test]
    fn decode_result_keeps_plain_text_content_entry_as_string() {
        let wrapped = json!({"content": [{"type": "text", "text": "ok"}]});
        let decoded = decode_result(wrapped).unwrap();
        assert_eq!(decoded, Value::String("ok".into()));
    }
}

//! Flyzoo 聊天室来源
//!
//! `getchatroomhistory` 返回最近 N 条消息（新到旧）。游标为已见过的最新时间，
//! 早于游标的记录视为已拉取；与游标同一时间的记录保留，由缓冲区按 ID 去重。
//!
//! `StartMessages` 有时是数组，有时是数组序列化后的字符串；
//! 两种都按 JSON 数据严格解析，其它形态按零条记录处理。

use super::normalize::WrapperRule;
use super::{Cursor, PollBatch, SourceAdapter};
use crate::config::FlyzooConfig;
use crate::message::{parse_timestamp, Message};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "StartMessages", default)]
    start_messages: Value,
}

#[derive(Debug, Deserialize)]
struct FlyzooRecord {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "UserName")]
    user_name: Option<String>,
    #[serde(rename = "Text", default)]
    text: Option<String>,
    #[serde(rename = "Date")]
    date: Option<String>,
}

/// Flyzoo 聊天室来源
pub struct FlyzooSource {
    client: Client,
    api_base: String,
    source_id: String,
    label: String,
    chatroom_id: String,
    website_id: String,
    page_size: u32,
    wrapper: Option<WrapperRule>,
}

impl FlyzooSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        config: &FlyzooConfig,
        source_id: String,
        label: String,
        chatroom_id: String,
        website_id: String,
        page_size: u32,
        wrapper: Option<WrapperRule>,
    ) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            source_id,
            label,
            chatroom_id,
            website_id,
            page_size,
            wrapper,
        }
    }

    pub fn history_url(&self) -> String {
        format!("{}/chatrooms/getchatroomhistory", self.api_base)
    }

    /// 解析 `StartMessages`
    fn decode_start_messages(value: Value) -> Result<Vec<FlyzooRecord>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(_) => serde_json::from_value(value).context("malformed StartMessages array"),
            Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
            Value::String(s) => serde_json::from_str(&s).context("StartMessages string is not a JSON array"),
            other => bail!("unexpected StartMessages type: {}", json_type(&other)),
        }
    }

    /// 解析一页历史消息
    ///
    /// 纯函数（无 I/O）。只保留不早于 `after` 的记录；新游标为本页最新时间。
    pub fn parse_page(
        body: &str,
        after: Option<DateTime<Utc>>,
        source_id: &str,
        label: &str,
        wrapper: Option<&WrapperRule>,
    ) -> Result<PollBatch> {
        let response: HistoryResponse =
            serde_json::from_str(body).context("unexpected Flyzoo history payload")?;
        let raw = match Self::decode_start_messages(response.start_messages) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(source = %source_id, error = %e, "Rejected malformed StartMessages");
                return Ok(PollBatch::default());
            }
        };

        let mut records: Vec<Message> = raw
            .into_iter()
            .rev()
            .filter_map(|r| match Self::convert(r, source_id, label, wrapper) {
                Ok(message) => Some(message),
                Err(e) => {
                    debug!(source = %source_id, error = %e, "Discarded malformed Flyzoo record");
                    None
                }
            })
            .collect();
        records.sort_by_key(|m| m.timestamp);

        let newest = records.last().map(|m| m.timestamp);
        if let Some(after) = after {
            records.retain(|m| m.timestamp >= after);
        }

        let cursor = match (newest, after) {
            (Some(newest), Some(after)) if newest <= after => None,
            (Some(newest), _) => Some(Cursor::Timestamp(newest)),
            (None, _) => None,
        };

        Ok(PollBatch { records, cursor })
    }

    fn convert(raw: FlyzooRecord, source_id: &str, label: &str, wrapper: Option<&WrapperRule>) -> Result<Message> {
        let id = raw.id.filter(|id| !id.is_empty()).ok_or_else(|| anyhow!("missing Id"))?;
        let username = raw
            .user_name
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("missing UserName for {}", id))?;
        let timestamp = raw
            .date
            .as_deref()
            .ok_or_else(|| anyhow!("missing Date for {}", id))
            .and_then(parse_timestamp)?;
        let content = raw.text.unwrap_or_default();

        let (username, content) = match wrapper {
            Some(rule) => rule.apply(&username, &content),
            None => (username, content),
        };

        Ok(Message {
            id,
            source_id: source_id.to_string(),
            display_name: username.clone(),
            username,
            content,
            timestamp,
            attachments: Vec::new(),
            channel: label.to_string(),
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SourceAdapter for FlyzooSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn poll(&self, cursor: Option<&Cursor>) -> Result<PollBatch> {
        let after = match cursor {
            Some(Cursor::Timestamp(ts)) => Some(*ts),
            _ => None,
        };
        let url = self.history_url();
        debug!(source = %self.source_id, url = %url, after = ?after, "Fetching Flyzoo history");

        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .query(&[
                ("id", self.chatroom_id.as_str()),
                ("start", ""),
                ("q", page_size.as_str()),
                ("wid", self.website_id.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?;
        let body = response.text().await.context("failed to read Flyzoo response")?;

        Self::parse_page(&body, after, &self.source_id, &self.label, self.wrapper.as_ref())
    }
}

//! Discord 频道来源
//!
//! 通过 `GET /channels/{id}/messages?limit=N&after=<cursor>` 拉取消息。
//! API 按新到旧返回，解析后反转为时间正序。

use super::normalize::WrapperRule;
use super::{Cursor, PollBatch, SourceAdapter};
use crate::config::DiscordConfig;
use crate::message::{parse_timestamp, Attachment, Message};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: Option<String>,
    author: Option<DiscordAuthor>,
    #[serde(default)]
    content: Option<String>,
    timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
}

#[derive(Debug, Deserialize)]
struct DiscordAuthor {
    username: Option<String>,
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordAttachment {
    #[serde(default)]
    url: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    name: Option<String>,
}

/// Discord 频道来源
pub struct DiscordSource {
    client: Client,
    api_base: String,
    token: Option<String>,
    source_id: String,
    label: String,
    channel_id: String,
    page_limit: u32,
    wrapper: Option<WrapperRule>,
}

impl DiscordSource {
    pub fn new(
        client: Client,
        config: &DiscordConfig,
        source_id: String,
        label: String,
        channel_id: String,
        page_limit: u32,
        wrapper: Option<WrapperRule>,
    ) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            source_id,
            label,
            channel_id,
            page_limit,
            wrapper,
        }
    }

    /// 拉取地址
    pub fn messages_url(&self, cursor: Option<&Cursor>) -> String {
        let base = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, self.channel_id, self.page_limit
        );
        match cursor {
            Some(Cursor::MessageId(id)) => format!("{}&after={}", base, id),
            // 时间游标对 Discord 无意义，按首轮处理
            Some(Cursor::Timestamp(_)) | None => base,
        }
    }

    /// 解析一页消息
    ///
    /// 纯函数（无 I/O），缺少必需字段的记录直接丢弃。
    /// 新游标取响应中第一条（最新）记录的 ID，即使它随后被过滤掉。
    pub fn parse_page(
        body: &str,
        source_id: &str,
        label: &str,
        wrapper: Option<&WrapperRule>,
    ) -> Result<PollBatch> {
        let raw: Vec<DiscordMessage> =
            serde_json::from_str(body).context("unexpected Discord messages payload")?;

        let cursor = raw
            .first()
            .and_then(|m| m.id.clone())
            .map(Cursor::MessageId);

        let records = raw
            .into_iter()
            .rev()
            .filter_map(|m| match Self::convert(m, source_id, label, wrapper) {
                Ok(message) => Some(message),
                Err(e) => {
                    debug!(source = %source_id, error = %e, "Discarded malformed Discord record");
                    None
                }
            })
            .collect();

        Ok(PollBatch { records, cursor })
    }

    fn convert(
        raw: DiscordMessage,
        source_id: &str,
        label: &str,
        wrapper: Option<&WrapperRule>,
    ) -> Result<Message> {
        let id = raw.id.filter(|id| !id.is_empty()).ok_or_else(|| anyhow!("missing id"))?;
        let author = raw.author.ok_or_else(|| anyhow!("missing author for {}", id))?;
        let username = author
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("missing author username for {}", id))?;
        let timestamp = raw
            .timestamp
            .as_deref()
            .ok_or_else(|| anyhow!("missing timestamp for {}", id))
            .and_then(parse_timestamp)?;
        let content = raw.content.unwrap_or_default();

        let (username, content) = match wrapper {
            Some(rule) => rule.apply(&username, &content),
            None => (username, content),
        };

        let attachments = raw
            .attachments
            .into_iter()
            .map(|a| Attachment {
                url: a.url,
                filename: a.filename,
                content_type: a.content_type.unwrap_or_default(),
            })
            .collect();

        Ok(Message {
            id,
            source_id: source_id.to_string(),
            display_name: author.global_name.unwrap_or_else(|| "Unknown".to_string()),
            username,
            content,
            timestamp,
            attachments,
            channel: label.to_string(),
        })
    }
}

#[async_trait]
impl SourceAdapter for DiscordSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn poll(&self, cursor: Option<&Cursor>) -> Result<PollBatch> {
        let url = self.messages_url(cursor);
        debug!(source = %self.source_id, url = %url, "Fetching Discord messages");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?;
        let body = response.text().await.context("failed to read Discord response")?;

        Self::parse_page(&body, &self.source_id, &self.label, self.wrapper.as_ref())
    }
}

/// 查询频道名，失败时回退为 `Channel <id>`
pub async fn resolve_channel_name(client: &Client, config: &DiscordConfig, channel_id: &str) -> String {
    let fallback = format!("Channel {}", channel_id);
    let url = format!("{}/channels/{}", config.api_base.trim_end_matches('/'), channel_id);

    let mut request = client.get(&url);
    if let Some(token) = &config.token {
        request = request.header(AUTHORIZATION, token);
    }

    let result = async move {
        let channel: DiscordChannel = request.send().await?.error_for_status()?.json().await?;
        Ok::<_, reqwest::Error>(channel)
    }
    .await;

    match result {
        Ok(channel) => channel.name.filter(|n| !n.is_empty()).unwrap_or(fallback),
        Err(e) => {
            warn!(channel_id = %channel_id, error = %e, "Failed to resolve channel name");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"[
        {
            "id": "1003",
            "author": { "username": "HERE-BOT GG", "global_name": null },
            "content": ":golf: **gg_caesar**: SPY 600c @ 1.20 | @ (09:45:10)",
            "timestamp": "2025-02-25T14:45:10.000000+00:00",
            "attachments": []
        },
        {
            "id": "1002",
            "author": { "username": "stocksareeazy", "global_name": "Eazy" },
            "content": "chart",
            "timestamp": "2025-02-25T14:40:00.000000+00:00",
            "attachments": [
                { "url": "https://cdn.discordapp.com/a.png", "filename": "a.png", "content_type": "image/png" }
            ]
        },
        {
            "id": "1001",
            "author": { "username": "yashnogja" },
            "content": "no timestamp"
        }
    ]"#;

    fn source() -> DiscordSource {
        DiscordSource::new(
            Client::new(),
            &DiscordConfig::default(),
            "all-trades".to_string(),
            "all-trades".to_string(),
            "1266047163297828904".to_string(),
            50,
            None,
        )
    }

    #[test]
    fn test_parse_page_reverses_and_unwraps() {
        let wrapper = WrapperRule::new("HERE-BOT GG");
        let batch = DiscordSource::parse_page(PAGE, "all-trades", "all-trades", Some(&wrapper)).unwrap();

        assert_eq!(batch.cursor, Some(Cursor::MessageId("1003".to_string())));
        // 缺少时间戳的记录被丢弃
        assert_eq!(batch.records.len(), 2);

        assert_eq!(batch.records[0].id, "1002");
        assert_eq!(batch.records[0].display_name, "Eazy");
        assert_eq!(batch.records[0].attachments[0].content_type, "image/png");

        let wrapped = &batch.records[1];
        assert_eq!(wrapped.id, "1003");
        assert_eq!(wrapped.username, "gg_caesar");
        assert_eq!(wrapped.content, "SPY 600c @ 1.20");
        assert_eq!(wrapped.display_name, "Unknown");
        assert_eq!(wrapped.channel, "all-trades");
        assert_eq!(wrapped.source_id, "all-trades");
    }

    #[test]
    fn test_parse_empty_page_keeps_cursor() {
        let batch = DiscordSource::parse_page("[]", "s", "s", None).unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.cursor.is_none());
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let err = DiscordSource::parse_page(r#"{"message": "401: Unauthorized"}"#, "s", "s", None);
        assert!(err.is_err());
    }

    #[test]
    fn test_messages_url() {
        let source = source();
        assert_eq!(
            source.messages_url(None),
            "https://discord.com/api/v9/channels/1266047163297828904/messages?limit=50"
        );
        assert_eq!(
            source.messages_url(Some(&Cursor::MessageId("42".to_string()))),
            "https://discord.com/api/v9/channels/1266047163297828904/messages?limit=50&after=42"
        );
    }

    #[test]
    fn test_name_returns_label() {
        assert_eq!(source().name(), "all-trades");
    }
}

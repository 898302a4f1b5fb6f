//! Telegram Bot API 渠道
//!
//! `POST {api_base}/bot{token}/sendMessage`，请求体 `{chat_id, text}`。
//! 429 响应的等待时间依次取自 `parameters.retry_after`、`Retry-After` 头、默认值。

use crate::config::RelayConfig;
use crate::notification::channel::{NotificationSink, SendResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram 渠道
pub struct TelegramSink {
    client: Client,
    endpoint: String,
    chat_id: String,
    default_retry_after: Duration,
}

impl TelegramSink {
    /// 根据转发配置创建，缺少 bot token 时报错
    pub fn from_config(client: Client, config: &RelayConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("telegram bot token not configured"))?;
        Ok(Self::new(
            client,
            &config.api_base,
            token,
            config.chat_id.clone(),
            config.default_retry_after(),
        ))
    }

    pub fn new(
        client: Client,
        api_base: &str,
        token: &str,
        chat_id: impl Into<String>,
        default_retry_after: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
            chat_id: chat_id.into(),
            default_retry_after,
        }
    }
}

/// 从 429 响应中解析等待时间
pub fn parse_retry_after(body: &str, header: Option<&str>, default: Duration) -> Duration {
    let from_body = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|r| r.parameters)
        .and_then(|p| p.retry_after);
    if let Some(secs) = from_body {
        return Duration::from_secs(secs);
    }

    header
        .and_then(|h| h.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let description = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|r| r.description);
    match description {
        Some(d) => format!("HTTP {}: {}", status.as_u16(), d),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<SendResult> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .context("telegram request failed")?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id = %self.chat_id, "Telegram message sent");
            return Ok(SendResult::Sent);
        }

        let header = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&body, header.as_deref(), self.default_retry_after);
            return Ok(SendResult::RateLimited { retry_after });
        }

        Ok(SendResult::Failed(describe_failure(status, &body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(5);

    #[test]
    fn test_retry_after_from_body() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#;
        assert_eq!(parse_retry_after(body, Some("3"), DEFAULT), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_after_falls_back_to_header_then_default() {
        assert_eq!(parse_retry_after("{}", Some("3"), DEFAULT), Duration::from_secs(3));
        assert_eq!(parse_retry_after("not json", Some(" 4 "), DEFAULT), Duration::from_secs(4));
        assert_eq!(parse_retry_after("", Some("soon"), DEFAULT), DEFAULT);
        assert_eq!(parse_retry_after("", None, DEFAULT), DEFAULT);
    }

    #[test]
    fn test_describe_failure() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        assert_eq!(
            describe_failure(StatusCode::BAD_REQUEST, body),
            "HTTP 400: Bad Request: chat not found"
        );
        assert_eq!(describe_failure(StatusCode::BAD_GATEWAY, "<html>"), "HTTP 502");
    }

    #[test]
    fn test_from_config_requires_token() {
        let config = RelayConfig {
            chat_id: "-100".to_string(),
            ..RelayConfig::default()
        };
        assert!(TelegramSink::from_config(Client::new(), &config).is_err());

        let config = RelayConfig {
            bot_token: Some("123:abc".to_string()),
            ..config
        };
        let sink = TelegramSink::from_config(Client::new(), &config).unwrap();
        assert_eq!(sink.endpoint, "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(sink.name(), "telegram");
    }
}

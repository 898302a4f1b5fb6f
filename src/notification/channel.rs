//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 被限流，等待 `retry_after` 后可重试
    RateLimited { retry_after: Duration },
    /// 发送失败
    Failed(String),
}

/// 通知渠道 trait
///
/// 传输层错误以 `Err` 返回，调用方按 `Failed` 处理。
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发送一条文本
    async fn send(&self, text: &str) -> Result<SendResult>;
}

//! 消息来源适配器
//!
//! 每个来源实现 `SourceAdapter`：给定游标拉取更新的消息，
//! 返回按时间正序排列的已归一化消息和新游标。
//! 适配器不直接接触共享缓冲区，由 `SourcePoller` 负责过滤与写入。

pub mod discord;
pub mod flyzoo;
pub mod normalize;
pub mod poller;

pub use discord::DiscordSource;
pub use flyzoo::FlyzooSource;
pub use normalize::WrapperRule;
pub use poller::SourcePoller;

use crate::config::{AppConfig, SourceConfig, SourceKind};
use crate::message::Message;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// 轮询游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// 最新一条消息 ID
    MessageId(String),
    /// 最新一条消息时间
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::MessageId(id) => write!(f, "id:{}", id),
            Cursor::Timestamp(ts) => write!(f, "ts:{}", ts.to_rfc3339()),
        }
    }
}

/// 单轮拉取结果
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    /// 按时间正序排列的候选消息
    pub records: Vec<Message>,
    /// 新游标；`None` 表示沿用旧游标
    pub cursor: Option<Cursor>,
}

/// 来源适配器 trait
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// 来源名称（用于日志）
    fn name(&self) -> &str;

    /// 拉取游标之后的消息
    async fn poll(&self, cursor: Option<&Cursor>) -> Result<PollBatch>;
}

/// 根据配置创建适配器
pub fn build_adapter(
    client: &reqwest::Client,
    config: &AppConfig,
    source: &SourceConfig,
    label: String,
) -> Arc<dyn SourceAdapter> {
    match &source.kind {
        SourceKind::Discord { channel_id, page_limit } => Arc::new(DiscordSource::new(
            client.clone(),
            &config.discord,
            source.id.clone(),
            label,
            channel_id.clone(),
            *page_limit,
            source.wrapper.clone(),
        )),
        SourceKind::Flyzoo {
            chatroom_id,
            website_id,
            page_size,
        } => Arc::new(FlyzooSource::new(
            client.clone(),
            &config.flyzoo,
            source.id.clone(),
            label,
            chatroom_id.clone(),
            website_id.clone(),
            *page_size,
            source.wrapper.clone(),
        )),
    }
}

/// 解析来源显示标签
///
/// 配置了 label 直接使用；Discord 来源查询频道名，失败回退 `Channel <id>`。
pub async fn resolve_label(client: &reqwest::Client, config: &AppConfig, source: &SourceConfig) -> String {
    if let Some(label) = &source.label {
        return label.clone();
    }
    match &source.kind {
        SourceKind::Discord { channel_id, .. } => {
            discord::resolve_channel_name(client, &config.discord, channel_id).await
        }
        SourceKind::Flyzoo { .. } => source.display_label(),
    }
}

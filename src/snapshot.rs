//! 快照读取 - 按时间排序并转换到展示时区

use crate::message::{Attachment, Message};
use crate::state::SharedState;
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 展示时间格式
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 展示时区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    /// 进程所在的本地时区
    Local,
    /// IANA 时区
    Named(Tz),
}

impl DisplayZone {
    /// 格式化为 `YYYY-MM-DD HH:MM:SS`
    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        match self {
            DisplayZone::Local => timestamp.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            DisplayZone::Named(tz) => timestamp.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        }
    }
}

impl FromStr for DisplayZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("local") {
            return Ok(DisplayZone::Local);
        }
        s.parse::<Tz>()
            .map(DisplayZone::Named)
            .map_err(|_| format!("unknown time zone: {}", s))
    }
}

impl fmt::Display for DisplayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayZone::Local => write!(f, "local"),
            DisplayZone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// 读接口返回的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMessage {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub content: String,
    pub timestamp: String,
    pub attachments: Vec<Attachment>,
    pub channel: String,
}

impl DisplayMessage {
    pub fn from_message(message: Message, zone: DisplayZone) -> Self {
        Self {
            timestamp: zone.format(message.timestamp),
            id: message.id,
            username: message.username,
            display_name: message.display_name,
            content: message.content,
            attachments: message.attachments,
            channel: message.channel,
        }
    }
}

/// 快照读取器
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    state: Arc<SharedState>,
}

impl SnapshotReader {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// 读取按时间升序排列的展示副本
    pub fn read(&self, zone: DisplayZone) -> Vec<DisplayMessage> {
        self.state
            .snapshot()
            .into_iter()
            .map(|m| DisplayMessage::from_message(m, zone))
            .collect()
    }

    pub fn all_warm(&self) -> bool {
        self.state.all_warm()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

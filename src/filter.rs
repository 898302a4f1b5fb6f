//! 过滤引擎 - 作者白名单、时间窗口、内容标记
//!
//! 规则按顺序执行，全部通过才接收：
//! 1. 作者在来源白名单内（配置了白名单时）
//! 2. 消息时间在接收窗口内（默认 24 小时）
//! 3. 作者要求内容标记时，正文必须包含该标记

use crate::config::SourceConfig;
use crate::message::Message;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// 过滤引擎
#[derive(Debug, Clone, Copy)]
pub struct FilterEngine {
    window: Duration,
}

impl FilterEngine {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// 是否接收该消息
    pub fn accepts(&self, record: &Message, source: &SourceConfig, now: DateTime<Utc>) -> bool {
        if !source.is_author_allowed(&record.username) {
            debug!(source = %source.id, id = %record.id, author = %record.username, "Rejected: author not allowed");
            return false;
        }

        if !self.within_window(record.timestamp, now) {
            debug!(source = %source.id, id = %record.id, timestamp = %record.timestamp, "Rejected: outside recency window");
            return false;
        }

        if !Self::marker_satisfied(record, source) {
            debug!(source = %source.id, id = %record.id, author = %record.username, "Rejected: required marker missing");
            return false;
        }

        true
    }

    /// 消息年龄是否在窗口内（未来时间视为在窗口内）
    pub fn within_window(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(timestamp) <= self.window
    }

    /// 作者的内容标记要求是否满足
    pub fn marker_satisfied(record: &Message, source: &SourceConfig) -> bool {
        match source
            .author_rule(&record.username)
            .and_then(|rule| rule.required_marker.as_deref())
        {
            Some(marker) => record.content.contains(marker),
            None => true,
        }
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(Duration::hours(crate::config::DEFAULT_RECENCY_WINDOW_HOURS))
    }
}

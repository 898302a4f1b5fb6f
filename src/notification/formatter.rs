//! 转发文本格式化

use crate::message::Message;
use crate::snapshot::DisplayZone;

/// 转发消息格式化器
#[derive(Debug, Clone, Copy)]
pub struct MessageFormatter {
    zone: DisplayZone,
}

impl MessageFormatter {
    pub fn new(zone: DisplayZone) -> Self {
        Self { zone }
    }

    /// `用户名 (显示名) [频道] 时间` 换行后接正文
    pub fn format(&self, message: &Message) -> String {
        format!(
            "{} ({}) [{}] {}\n{}",
            message.username,
            message.display_name,
            message.channel,
            self.zone.format(message.timestamp),
            message.content
        )
    }
}

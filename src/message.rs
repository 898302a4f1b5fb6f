//! 消息模型 - 所有来源统一转换成 `Message`

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: String,
}

/// 已归一化的消息
///
/// 写入共享缓冲区后不再修改；展示时的时区格式化作用在副本上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 消息 ID（来源内唯一，缓冲区按 ID 去重）
    pub id: String,
    /// 来源 ID（对应配置中的 source id）
    pub source_id: String,
    /// 作者（机器人转发的消息会被还原为真实作者）
    pub username: String,
    /// 作者显示名
    pub display_name: String,
    /// 归一化后的正文
    pub content: String,
    /// 发送时间
    pub timestamp: DateTime<Utc>,
    /// 附件列表
    pub attachments: Vec<Attachment>,
    /// 来源标签（频道名）
    pub channel: String,
}

/// 解析来源返回的时间戳
///
/// 优先按 RFC 3339 解析；不带时区的时间按 UTC 处理。
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(anyhow!("unrecognized timestamp: {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-02-25T12:00:00.123000+00:00").unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2025, 2, 25, 12, 0, 0).unwrap().timestamp());

        let shifted = parse_timestamp("2025-02-25T14:00:00+02:00").unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2025, 2, 25, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_assumes_utc() {
        let ts = parse_timestamp("2025-02-25T12:00:00.000").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 2, 25, 12, 0, 0).unwrap());

        let spaced = parse_timestamp("2025-02-25 12:00:00").unwrap();
        assert_eq!(spaced, ts);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }
}

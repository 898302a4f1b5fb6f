//! 机器人转发消息的内容归一化
//!
//! 转发机器人发出的消息形如 `:golf: **真实作者**: 正文 | @ (12:00:00)`，
//! 需要还原真实作者并去掉前后缀。

use serde::{Deserialize, Serialize};

/// 转发包装规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperRule {
    /// 转发机器人的用户名
    pub wrapper_author: String,
    /// 前缀标记（紧跟真实作者名）
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// 真实作者名的结束标记
    #[serde(default = "default_author_end")]
    pub author_end: String,
    /// 尾部标记，从最后一次出现处截断
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

fn default_prefix() -> String {
    ":golf: **".to_string()
}

fn default_author_end() -> String {
    "**: ".to_string()
}

fn default_suffix() -> String {
    " | @ (".to_string()
}

impl WrapperRule {
    pub fn new(wrapper_author: impl Into<String>) -> Self {
        Self {
            wrapper_author: wrapper_author.into(),
            prefix: default_prefix(),
            author_end: default_author_end(),
            suffix: default_suffix(),
        }
    }

    /// 还原作者与正文
    ///
    /// 不匹配规则的消息原样返回。
    pub fn apply(&self, author: &str, content: &str) -> (String, String) {
        if author != self.wrapper_author || self.prefix.is_empty() {
            return (author.to_string(), content.to_string());
        }

        let Some(rest) = content.strip_prefix(self.prefix.as_str()) else {
            return (author.to_string(), content.to_string());
        };

        let Some(end) = rest.find(self.author_end.as_str()) else {
            return (author.to_string(), content.to_string());
        };

        let embedded_author = rest[..end].trim();
        if embedded_author.is_empty() {
            return (author.to_string(), content.to_string());
        }

        let mut body = &rest[end + self.author_end.len()..];
        if !self.suffix.is_empty() {
            if let Some(pos) = body.rfind(self.suffix.as_str()) {
                body = &body[..pos];
            }
        }

        (embedded_author.to_string(), body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwraps_author_and_strips_markers() {
        let rule = WrapperRule::new("HERE-BOT GG");
        let (author, content) = rule.apply(
            "HERE-BOT GG",
            ":golf: **gg_caesar**: long NVDA 140c | @ (09:31:02)",
        );
        assert_eq!(author, "gg_caesar");
        assert_eq!(content, "long NVDA 140c");
    }

    #[test]
    fn test_missing_suffix_keeps_body() {
        let rule = WrapperRule::new("HERE-BOT GG");
        let (author, content) = rule.apply("HERE-BOT GG", ":golf: **yashnogja**: trimmed 50%");
        assert_eq!(author, "yashnogja");
        assert_eq!(content, "trimmed 50%");
    }

    #[test]
    fn test_suffix_uses_last_occurrence() {
        let rule = WrapperRule::new("bot");
        let (_, content) = rule.apply("bot", ":golf: **a**: x | @ (y) then | @ (10:00:00)");
        assert_eq!(content, "x | @ (y) then");
    }

    #[test]
    fn test_other_authors_pass_through() {
        let rule = WrapperRule::new("HERE-BOT GG");
        let raw = ":golf: **someone**: hello | @ (09:00:00)";
        let (author, content) = rule.apply("stocksareeazy", raw);
        assert_eq!(author, "stocksareeazy");
        assert_eq!(content, raw);
    }

    #[test]
    fn test_wrapper_without_prefix_passes_through() {
        let rule = WrapperRule::new("HERE-BOT GG");
        let (author, content) = rule.apply("HERE-BOT GG", "daily recap posted");
        assert_eq!(author, "HERE-BOT GG");
        assert_eq!(content, "daily recap posted");
    }

    #[test]
    fn test_unterminated_author_passes_through() {
        let rule = WrapperRule::new("HERE-BOT GG");
        let raw = ":golf: **broken message";
        let (author, content) = rule.apply("HERE-BOT GG", raw);
        assert_eq!(author, "HERE-BOT GG");
        assert_eq!(content, raw);
    }
}

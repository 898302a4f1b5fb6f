//! 配置加载
//!
//! 配置文件读取优先级：
//! 1. 命令行 `--config` 指定的路径
//! 2. `~/.config/chat-relay-monitor/config.json`
//!
//! 敏感字段可由环境变量覆盖：`DISCORD_TOKEN`、`TELEGRAM_BOT_TOKEN`。

use crate::snapshot::DisplayZone;
use crate::source::normalize::WrapperRule;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RECENCY_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v9";
pub const DEFAULT_FLYZOO_API: &str = "https://widget-b.flyzoo.co";
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
/// 相邻两次转发的最小间隔下限（毫秒）
pub const MIN_SEND_INTERVAL_MS: u64 = 1000;
/// 时间窗口上限（小时）
pub const MAX_RECENCY_WINDOW_HOURS: i64 = 24 * 365;

/// 顶层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 共享缓冲区容量
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// 每个来源的轮询间隔（秒）
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// 只接收最近 N 小时内的消息
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: i64,
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 展示时区（IANA 名称，或 "local"）
    #[serde(default)]
    pub display_timezone: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub flyzoo: FlyzooConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// 读接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Discord API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_discord_api")]
    pub api_base: String,
    /// Authorization token
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_discord_api(),
            token: None,
        }
    }
}

/// Flyzoo API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlyzooConfig {
    #[serde(default = "default_flyzoo_api")]
    pub api_base: String,
}

impl Default for FlyzooConfig {
    fn default() -> Self {
        Self {
            api_base: default_flyzoo_api(),
        }
    }
}

/// Telegram 转发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 是否启用转发
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default, skip_serializing)]
    pub bot_token: Option<String>,
    /// 目标 chat_id
    #[serde(default)]
    pub chat_id: String,
    /// 扫描间隔（秒）
    #[serde(default = "default_relay_interval_secs")]
    pub interval_secs: u64,
    /// 两次发送之间的最小间隔（毫秒）
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    /// 429 响应未携带 retry_after 时的等待秒数
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: default_telegram_api(),
            bot_token: None,
            chat_id: String::new(),
            interval_secs: default_relay_interval_secs(),
            min_send_interval_ms: default_min_send_interval_ms(),
            default_retry_after_secs: default_retry_after_secs(),
        }
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// 最小发送间隔，不低于 `MIN_SEND_INTERVAL_MS`
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms.max(MIN_SEND_INTERVAL_MS))
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

/// 来源类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Discord 频道
    Discord {
        channel_id: String,
        #[serde(default = "default_discord_page_limit")]
        page_limit: u32,
    },
    /// Flyzoo 聊天室
    Flyzoo {
        chatroom_id: String,
        website_id: String,
        #[serde(default = "default_flyzoo_page_size")]
        page_size: u32,
    },
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Discord { .. } => "discord",
            SourceKind::Flyzoo { .. } => "flyzoo",
        }
    }
}

/// 单个作者的过滤规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRule {
    pub name: String,
    /// 正文必须包含的标记（如 🚩）
    #[serde(default)]
    pub required_marker: Option<String>,
}

impl AuthorRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_marker: None,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.required_marker = Some(marker.into());
        self
    }
}

/// 单个来源配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 来源 ID（全局唯一）
    pub id: String,
    /// 显示标签；Discord 来源为空时启动时查询频道名
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
    /// 作者白名单；为空表示不限制
    #[serde(default)]
    pub allowed_authors: Option<Vec<AuthorRule>>,
    /// 转发机器人归一化规则
    #[serde(default)]
    pub wrapper: Option<WrapperRule>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind,
            allowed_authors: None,
            wrapper: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<AuthorRule>) -> Self {
        self.allowed_authors = Some(authors);
        self
    }

    /// 查找作者规则
    pub fn author_rule(&self, author: &str) -> Option<&AuthorRule> {
        self.allowed_authors
            .as_ref()
            .and_then(|rules| rules.iter().find(|r| r.name == author))
    }

    /// 作者是否在白名单内（未配置白名单时总是允许）
    pub fn is_author_allowed(&self, author: &str) -> bool {
        match &self.allowed_authors {
            Some(_) => self.author_rule(author).is_some(),
            None => true,
        }
    }

    /// 显示标签（未解析前的回退值）
    pub fn display_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.kind {
            SourceKind::Discord { channel_id, .. } => format!("Channel {}", channel_id),
            SourceKind::Flyzoo { .. } => "flyzoo-chat".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            poll_interval_secs: default_poll_interval_secs(),
            recency_window_hours: default_recency_window_hours(),
            request_timeout_secs: default_request_timeout_secs(),
            display_timezone: None,
            server: ServerConfig::default(),
            discord: DiscordConfig::default(),
            flyzoo: FlyzooConfig::default(),
            relay: RelayConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("chat-relay-monitor")
            .join("config.json")
    }

    /// 加载配置并应用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.apply_env_overrides();
        debug!(path = %path.display(), sources = config.sources.len(), "Config loaded");
        Ok(config)
    }

    /// 从 JSON 字符串解析
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 用环境变量覆盖敏感字段
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.relay.bot_token = Some(token);
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        if self.buffer_capacity == 0 {
            bail!("buffer_capacity must be greater than 0");
        }
        if self.recency_window_hours <= 0 || self.recency_window_hours > MAX_RECENCY_WINDOW_HOURS {
            bail!(
                "recency_window_hours must be between 1 and {}",
                MAX_RECENCY_WINDOW_HOURS
            );
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than 0");
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                bail!("source id must not be empty");
            }
            if !seen.insert(source.id.as_str()) {
                bail!("duplicate source id: {}", source.id);
            }
        }

        self.display_zone()?;

        if self.relay.enabled {
            if self.relay.interval_secs == 0 {
                bail!("relay.interval_secs must be greater than 0");
            }
            if self.relay.min_send_interval_ms < MIN_SEND_INTERVAL_MS {
                bail!(
                    "relay.min_send_interval_ms must be at least {}",
                    MIN_SEND_INTERVAL_MS
                );
            }
            if self.relay.chat_id.trim().is_empty() {
                bail!("relay is enabled but relay.chat_id is empty");
            }
            if self.relay.bot_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                bail!("relay is enabled but no bot token (set TELEGRAM_BOT_TOKEN)");
            }
        }

        Ok(())
    }

    /// 解析展示时区
    pub fn display_zone(&self) -> Result<DisplayZone> {
        match &self.display_timezone {
            Some(name) => name
                .parse()
                .map_err(|e| anyhow!("invalid display_timezone {:?}: {}", name, e)),
            None => Ok(DisplayZone::Local),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 接收时间窗口，限制在 1 小时到 `MAX_RECENCY_WINDOW_HOURS` 之间
    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recency_window_hours.clamp(1, MAX_RECENCY_WINDOW_HOURS))
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_recency_window_hours() -> i64 {
    DEFAULT_RECENCY_WINDOW_HOURS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5002
}

fn default_discord_api() -> String {
    DEFAULT_DISCORD_API.to_string()
}

fn default_flyzoo_api() -> String {
    DEFAULT_FLYZOO_API.to_string()
}

fn default_telegram_api() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}

fn default_true() -> bool {
    true
}

fn default_relay_interval_secs() -> u64 {
    5
}

fn default_min_send_interval_ms() -> u64 {
    1000
}

fn default_retry_after_secs() -> u64 {
    5
}

fn default_discord_page_limit() -> u32 {
    50
}

fn default_flyzoo_page_size() -> u32 {
    25
}

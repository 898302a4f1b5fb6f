//! Chat Relay Monitor - 多来源聊天消息采集、去重与转发

pub mod config;
pub mod filter;
pub mod message;
pub mod notification;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod supervisor;

pub use config::{AppConfig, AuthorRule, RelayConfig, SourceConfig, SourceKind};
pub use filter::FilterEngine;
pub use message::{Attachment, Message};
pub use notification::{MessageFormatter, NotificationSink, RelayDispatcher, RelayReport, SendResult, TelegramSink};
pub use snapshot::{DisplayMessage, DisplayZone, SnapshotReader};
pub use source::{Cursor, PollBatch, SourceAdapter, SourcePoller, WrapperRule};
pub use state::{IngestReport, SharedState};
pub use supervisor::{RunOptions, Supervisor};

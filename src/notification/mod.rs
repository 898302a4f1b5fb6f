//! 转发通知层
//!
//! - `NotificationSink`：渠道抽象，每个渠道独立实现
//! - `RelayDispatcher`：按时间顺序、限速地把新消息送到渠道
//!
//! # 使用示例
//! ```ignore
//! use chat_relay_monitor::notification::{MessageFormatter, RelayDispatcher, TelegramSink};
//!
//! let sink = Arc::new(TelegramSink::from_config(client, &config.relay)?);
//! let dispatcher = RelayDispatcher::new(sink, state, config.sources.clone(), filter, formatter);
//! tokio::spawn(dispatcher.run());
//! ```

pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod formatter;
pub mod throttle;

pub use channel::{NotificationSink, SendResult};
pub use channels::TelegramSink;
pub use dispatcher::{RelayDispatcher, RelayReport};
pub use formatter::MessageFormatter;
pub use throttle::SendThrottle;

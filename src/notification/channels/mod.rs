//! 具体渠道实现

pub mod telegram;

pub use telegram::TelegramSink;

//! 发送节流 - 保证相邻两次发送之间的最小间隔

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// 发送节流器
#[derive(Debug)]
pub struct SendThrottle {
    min_interval: Duration,
    last_send: Option<Instant>,
}

impl SendThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 等到允许下一次发送，并记录本次发送时间
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_send {
            sleep_until(last + self.min_interval).await;
        }
        self.last_send = Some(Instant::now());
    }

    /// 距离下次可发送的剩余时间
    pub fn remaining(&self) -> Duration {
        match self.last_send {
            Some(last) => (last + self.min_interval).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

//! 转发分发器 - 把新消息按时间顺序送到通知渠道
//!
//! 每轮：
//! 1. 锁内取出未转发、未抑制的候选（任一来源未预热时为空）
//! 2. 锁外复查时间窗口和内容标记
//! 3. 逐条发送，相邻发送间隔不少于 `min_send_interval`
//! 4. 被限流时等待 `retry_after` 后重试一次
//!
//! 只有确认成功的消息才会记入已转发集合，失败的留给下一轮。

use super::channel::{NotificationSink, SendResult};
use super::formatter::MessageFormatter;
use super::throttle::SendThrottle;
use crate::config::{SourceConfig, MIN_SEND_INTERVAL_MS};
use crate::filter::FilterEngine;
use crate::message::Message;
use crate::state::SharedState;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单轮转发结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// 是否因有来源未预热而跳过
    pub skipped_cold: bool,
    /// 复查后待发送的条数
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
    /// 遇到限流的次数
    pub rate_limited: usize,
}

/// 转发分发器
pub struct RelayDispatcher {
    sink: Arc<dyn NotificationSink>,
    state: Arc<SharedState>,
    sources: HashMap<String, SourceConfig>,
    filter: FilterEngine,
    formatter: MessageFormatter,
    throttle: SendThrottle,
    interval: Duration,
}

impl RelayDispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        state: Arc<SharedState>,
        sources: Vec<SourceConfig>,
        filter: FilterEngine,
        formatter: MessageFormatter,
    ) -> Self {
        Self {
            sink,
            state,
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
            filter,
            formatter,
            throttle: SendThrottle::new(Duration::from_millis(MIN_SEND_INTERVAL_MS)),
            interval: Duration::from_secs(5),
        }
    }

    /// 设置相邻两次发送的最小间隔，低于 1 秒时按 1 秒处理
    pub fn with_min_send_interval(mut self, min_interval: Duration) -> Self {
        let floor = Duration::from_millis(MIN_SEND_INTERVAL_MS);
        self.throttle = SendThrottle::new(min_interval.max(floor));
        self
    }

    /// 设置扫描间隔
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn still_eligible(&self, message: &Message) -> bool {
        if !self.filter.within_window(message.timestamp, Utc::now()) {
            return false;
        }
        match self.sources.get(&message.source_id) {
            Some(source) => FilterEngine::marker_satisfied(message, source),
            None => true,
        }
    }

    /// 执行一轮转发
    pub async fn run_cycle(&mut self) -> RelayReport {
        let view = self.state.relay_view();
        let mut report = RelayReport::default();

        if !view.all_warm {
            debug!("Relay skipped: not all sources warm");
            report.skipped_cold = true;
            return report;
        }

        let candidates: Vec<Message> = view
            .pending
            .into_iter()
            .filter(|m| self.still_eligible(m))
            .collect();
        report.candidates = candidates.len();

        for message in &candidates {
            let text = self.formatter.format(message);
            let (sent, rate_limited) = self.deliver(&message.id, &text).await;
            report.rate_limited += rate_limited;
            if sent {
                self.state.mark_sent(&message.id);
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.candidates > 0 {
            info!(
                sink = self.sink.name(),
                sent = report.sent,
                failed = report.failed,
                "Relay cycle complete"
            );
        }
        report
    }

    /// 发送一条，限流时重试一次；返回 (是否成功, 限流次数)
    async fn deliver(&mut self, id: &str, text: &str) -> (bool, usize) {
        match self.attempt(id, text).await {
            SendResult::Sent => (true, 0),
            SendResult::RateLimited { retry_after } => {
                warn!(id = %id, retry_after_secs = retry_after.as_secs_f64(), "Rate limited, retrying once");
                tokio::time::sleep(retry_after).await;
                match self.attempt(id, text).await {
                    SendResult::Sent => (true, 1),
                    SendResult::RateLimited { .. } => {
                        warn!(id = %id, "Still rate limited, leaving for next cycle");
                        (false, 2)
                    }
                    SendResult::Failed(reason) => {
                        warn!(id = %id, reason = %reason, "Retry failed, leaving for next cycle");
                        (false, 1)
                    }
                }
            }
            SendResult::Failed(reason) => {
                warn!(id = %id, reason = %reason, "Relay send failed");
                (false, 0)
            }
        }
    }

    async fn attempt(&mut self, id: &str, text: &str) -> SendResult {
        self.throttle.acquire().await;
        match self.sink.send(text).await {
            Ok(result) => result,
            Err(e) => {
                debug!(id = %id, error = %e, "Sink transport error");
                SendResult::Failed(e.to_string())
            }
        }
    }

    /// 持续转发，直到任务被取消
    pub async fn run(mut self) {
        info!(
            sink = self.sink.name(),
            interval_secs = self.interval.as_secs(),
            min_send_interval_ms = self.throttle.min_interval().as_millis() as u64,
            "Relay dispatcher started"
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthorRule, SourceKind};
    use crate::snapshot::DisplayZone;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// 测试用的 mock 渠道，按顺序返回预设结果，之后一律成功
    struct MockSink {
        script: Mutex<VecDeque<Result<SendResult>>>,
        calls: Mutex<Vec<(Instant, String)>>,
    }

    impl MockSink {
        fn new(script: Vec<Result<SendResult>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Instant, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send(&self, text: &str) -> Result<SendResult> {
            self.calls.lock().unwrap().push((Instant::now(), text.to_string()));
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(SendResult::Sent))
        }
    }

    fn message(source: &str, id: &str, content: &str, age_secs: i64) -> Message {
        Message {
            id: id.to_string(),
            source_id: source.to_string(),
            username: "smartertrader".to_string(),
            display_name: "smartertrader".to_string(),
            content: content.to_string(),
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            attachments: Vec::new(),
            channel: source.to_string(),
        }
    }

    fn flyzoo() -> SourceConfig {
        SourceConfig::new(
            "flyzoo",
            SourceKind::Flyzoo {
                chatroom_id: "r".into(),
                website_id: "w".into(),
                page_size: 25,
            },
        )
        .with_authors(vec![AuthorRule::new("smartertrader").with_marker("🚩")])
    }

    fn warm_state() -> Arc<SharedState> {
        let state = Arc::new(SharedState::new(100, ["flyzoo"]));
        state.ingest_cycle("flyzoo", Vec::new());
        state
    }

    fn dispatcher(sink: Arc<MockSink>, state: Arc<SharedState>) -> RelayDispatcher {
        RelayDispatcher::new(
            sink,
            state,
            vec![flyzoo()],
            FilterEngine::default(),
            MessageFormatter::new(DisplayZone::Named(chrono_tz::UTC)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_in_order_with_pacing() {
        let state = warm_state();
        state.ingest_cycle(
            "flyzoo",
            vec![
                message("flyzoo", "b", "🚩 second", 10),
                message("flyzoo", "a", "🚩 first", 20),
                message("flyzoo", "c", "🚩 third", 5),
            ],
        );
        let sink = Arc::new(MockSink::new(Vec::new()));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 0);

        let calls = sink.calls();
        assert!(calls[0].1.ends_with("🚩 first"));
        assert!(calls[1].1.ends_with("🚩 second"));
        assert!(calls[2].1.ends_with("🚩 third"));
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_secs(1));
        }
        assert!(state.is_sent("a") && state.is_sent("b") && state.is_sent("c"));

        // 已转发的消息不会再次发送
        let report = dispatcher.run_cycle().await;
        assert_eq!(report.candidates, 0);
        assert_eq!(sink.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_min_interval_still_paces_one_second() {
        let state = warm_state();
        state.ingest_cycle(
            "flyzoo",
            vec![
                message("flyzoo", "a", "🚩 a", 30),
                message("flyzoo", "b", "🚩 b", 20),
                message("flyzoo", "c", "🚩 c", 10),
            ],
        );
        let sink = Arc::new(MockSink::new(Vec::new()));
        let mut dispatcher =
            dispatcher(Arc::clone(&sink), Arc::clone(&state)).with_min_send_interval(Duration::ZERO);

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 3);
        let calls = sink.calls();
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_then_retries_once() {
        let state = warm_state();
        state.ingest_cycle("flyzoo", vec![message("flyzoo", "m", "🚩 go", 1)]);
        let sink = Arc::new(MockSink::new(vec![Ok(SendResult::RateLimited {
            retry_after: Duration::from_secs(7),
        })]));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.rate_limited, 1);

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0 - calls[0].0 >= Duration::from_secs(7));
        assert!(state.is_sent("m"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_retry_leaves_message_for_next_cycle() {
        let state = warm_state();
        state.ingest_cycle("flyzoo", vec![message("flyzoo", "m", "🚩 go", 1)]);
        let sink = Arc::new(MockSink::new(vec![
            Ok(SendResult::RateLimited {
                retry_after: Duration::from_secs(2),
            }),
            Err(anyhow!("connection reset")),
        ]));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert!(!state.is_sent("m"));
        assert_eq!(sink.calls().len(), 2);

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 1);
        assert!(state.is_sent("m"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_failure_is_not_retried() {
        let state = warm_state();
        state.ingest_cycle("flyzoo", vec![message("flyzoo", "m", "🚩 go", 1)]);
        let sink = Arc::new(MockSink::new(vec![Ok(SendResult::Failed("HTTP 400".to_string()))]));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(sink.calls().len(), 1);
        assert!(!state.is_sent("m"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_sent_until_all_warm() {
        let state = Arc::new(SharedState::new(100, ["flyzoo", "discord"]));
        state.ingest_cycle("flyzoo", Vec::new());
        state.ingest_cycle("flyzoo", vec![message("flyzoo", "m", "🚩 go", 1)]);
        let sink = Arc::new(MockSink::new(Vec::new()));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert!(report.skipped_cold);
        assert!(sink.calls().is_empty());

        state.ingest_cycle("discord", Vec::new());
        let report = dispatcher.run_cycle().await;
        assert_eq!(report.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_drops_stale_and_unmarked() {
        let state = warm_state();
        // 直接写入缓冲区，绕过来源过滤
        state.append(message("flyzoo", "stale", "🚩 old", 25 * 3600));
        state.append(message("flyzoo", "plain", "no flag", 1));
        state.append(message("flyzoo", "ok", "🚩 fine", 1));
        let sink = Arc::new(MockSink::new(Vec::new()));
        let mut dispatcher = dispatcher(Arc::clone(&sink), Arc::clone(&state));

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.candidates, 1);
        assert_eq!(report.sent, 1);
        assert!(state.is_sent("ok"));
        assert!(!state.is_sent("stale"));
        assert!(!state.is_sent("plain"));
    }
}

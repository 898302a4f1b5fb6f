//! 来源轮询任务
//!
//! 每个来源一个任务：拉取、过滤、写入共享状态，然后休眠一个轮询间隔。
//! 单轮失败只记录日志，不影响其它来源，也不推进预热状态。

use super::{Cursor, SourceAdapter};
use crate::config::SourceConfig;
use crate::filter::FilterEngine;
use crate::state::{IngestReport, SharedState};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SourcePoller {
    adapter: Arc<dyn SourceAdapter>,
    config: SourceConfig,
    filter: FilterEngine,
    state: Arc<SharedState>,
    interval: Duration,
    cursor: Option<Cursor>,
}

impl SourcePoller {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        config: SourceConfig,
        filter: FilterEngine,
        state: Arc<SharedState>,
        interval: Duration,
    ) -> Self {
        Self {
            adapter,
            config,
            filter,
            state,
            interval,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// 执行一轮拉取
    ///
    /// 拉取失败时返回错误，游标与预热状态保持不变。
    pub async fn poll_once(&mut self) -> Result<IngestReport> {
        let batch = self.adapter.poll(self.cursor.as_ref()).await?;
        let fetched = batch.records.len();

        let now = Utc::now();
        let accepted: Vec<_> = batch
            .records
            .into_iter()
            .filter(|record| self.filter.accepts(record, &self.config, now))
            .collect();
        let accepted_count = accepted.len();

        let report = self.state.ingest_cycle(&self.config.id, accepted);

        if let Some(cursor) = batch.cursor {
            self.cursor = Some(cursor);
        }

        debug!(
            source = %self.config.id,
            fetched,
            accepted = accepted_count,
            inserted = report.inserted,
            suppressed = report.suppressed,
            cursor = ?self.cursor.as_ref().map(|c| c.to_string()),
            "Poll cycle complete"
        );
        if report.became_warm && report.all_warm {
            info!(source = %self.config.id, "All sources warm, relay enabled");
        }

        Ok(report)
    }

    /// 持续轮询，直到任务被取消
    pub async fn run(mut self) {
        info!(
            source = %self.config.id,
            adapter = self.adapter.name(),
            interval_secs = self.interval.as_secs(),
            "Source poller started"
        );
        loop {
            if let Err(e) = self.poll_once().await {
                warn!(source = %self.config.id, error = %e, "Poll cycle failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

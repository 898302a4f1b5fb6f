//! 预热抑制 - 首轮拉取到的历史消息不转发
//!
//! 每个来源初始为 `Cold`，首轮拉取成功完成后变为 `Warm`（单向）。
//! 所有来源都 `Warm` 之后才允许转发；`Cold` 期间接收的消息 ID
//! 永久进入抑制集合，但仍然出现在快照中。

use std::collections::{HashMap, HashSet};
use tracing::info;

/// 来源预热状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmState {
    Cold,
    Warm,
}

/// 预热抑制跟踪器
#[derive(Debug)]
pub struct WarmupTracker {
    sources: HashMap<String, WarmState>,
    suppressed: HashSet<String>,
    all_warm: bool,
}

impl WarmupTracker {
    pub fn new<I, S>(source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: HashMap<String, WarmState> = source_ids
            .into_iter()
            .map(|id| (id.into(), WarmState::Cold))
            .collect();
        // 没有来源时没有需要等待的首轮
        let all_warm = sources.is_empty();
        Self {
            sources,
            suppressed: HashSet::new(),
            all_warm,
        }
    }

    /// 来源状态；未配置的来源视为 `Cold`
    pub fn state(&self, source_id: &str) -> WarmState {
        self.sources.get(source_id).copied().unwrap_or(WarmState::Cold)
    }

    pub fn is_warm(&self, source_id: &str) -> bool {
        self.state(source_id) == WarmState::Warm
    }

    pub fn all_warm(&self) -> bool {
        self.all_warm
    }

    /// 标记来源完成一轮拉取，返回是否发生了 Cold → Warm 转换
    pub fn complete_cycle(&mut self, source_id: &str) -> bool {
        let Some(state) = self.sources.get_mut(source_id) else {
            return false;
        };
        if *state == WarmState::Warm {
            return false;
        }

        *state = WarmState::Warm;
        info!(source = %source_id, "Source warmed up");

        if !self.all_warm && self.sources.values().all(|s| *s == WarmState::Warm) {
            self.all_warm = true;
            info!(sources = self.sources.len(), "All sources warm; relay enabled for new messages");
        }
        true
    }

    /// 加入抑制集合
    pub fn suppress(&mut self, message_id: impl Into<String>) {
        self.suppressed.insert(message_id.into());
    }

    pub fn is_suppressed(&self, message_id: &str) -> bool {
        self.suppressed.contains(message_id)
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.len()
    }
}

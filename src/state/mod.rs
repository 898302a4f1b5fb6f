//! 共享状态 - 消息缓冲区、预热抑制集合、已转发集合
//!
//! 三者构成唯一的共享可变区域，由一把互斥锁保护。
//! 锁内只做 O(容量) 的复制与筛选，排序和任何网络调用都在锁外进行。

pub mod buffer;
pub mod warmup;

pub use buffer::MessageBuffer;
pub use warmup::{WarmState, WarmupTracker};

use crate::message::Message;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// 单轮拉取写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// 实际插入缓冲区的条数
    pub inserted: usize,
    /// 因首轮拉取被抑制的条数
    pub suppressed: usize,
    /// 本轮是否使该来源完成预热
    pub became_warm: bool,
    /// 本轮结束后是否全部来源已预热
    pub all_warm: bool,
}

/// 转发候选视图（锁内一次性取出的时间点副本）
#[derive(Debug, Clone, Default)]
pub struct RelayView {
    pub all_warm: bool,
    /// 未转发、未抑制的消息，按时间升序
    pub pending: Vec<Message>,
}

#[derive(Debug)]
struct StateInner {
    buffer: MessageBuffer,
    warmup: WarmupTracker,
    sent: HashSet<String>,
}

/// 共享状态句柄，通过 `Arc<SharedState>` 传给各个任务
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<StateInner>,
}

impl SharedState {
    pub fn new<I, S>(capacity: usize, source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Mutex::new(StateInner {
                buffer: MessageBuffer::new(capacity),
                warmup: WarmupTracker::new(source_ids),
                sent: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        // 锁中毒时沿用内部数据
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 写入一轮拉取结果
    ///
    /// 来源仍为 `Cold` 时，本轮所有消息进入抑制集合；
    /// 写入完成后该来源转为 `Warm`（无论本轮有无消息）。
    pub fn ingest_cycle(&self, source_id: &str, records: Vec<Message>) -> IngestReport {
        let mut inner = self.lock();
        let cold = !inner.warmup.is_warm(source_id);
        let mut report = IngestReport::default();

        for record in records {
            if cold {
                inner.warmup.suppress(record.id.clone());
                report.suppressed += 1;
            }
            if inner.buffer.append(record) {
                report.inserted += 1;
            }
        }

        report.became_warm = inner.warmup.complete_cycle(source_id);
        report.all_warm = inner.warmup.all_warm();
        report
    }

    /// 单条追加（不经过预热逻辑，仅供测试构造缓冲区内容）
    #[cfg(test)]
    pub(crate) fn append(&self, message: Message) -> bool {
        self.lock().buffer.append(message)
    }

    /// 按时间升序返回缓冲区副本（时间相同则保持插入顺序）
    pub fn snapshot(&self) -> Vec<Message> {
        let mut copy = self.lock().buffer.to_vec();
        copy.sort_by_key(|m| m.timestamp);
        copy
    }

    /// 取出转发候选
    pub fn relay_view(&self) -> RelayView {
        let (all_warm, mut pending) = {
            let inner = self.lock();
            let all_warm = inner.warmup.all_warm();
            if !all_warm {
                return RelayView {
                    all_warm,
                    pending: Vec::new(),
                };
            }
            let pending: Vec<Message> = inner
                .buffer
                .iter()
                .filter(|m| !inner.sent.contains(&m.id) && !inner.warmup.is_suppressed(&m.id))
                .cloned()
                .collect();
            (all_warm, pending)
        };
        pending.sort_by_key(|m| m.timestamp);

        RelayView { all_warm, pending }
    }

    /// 确认发送成功后记录
    pub fn mark_sent(&self, message_id: &str) {
        self.lock().sent.insert(message_id.to_string());
    }

    pub fn is_sent(&self, message_id: &str) -> bool {
        self.lock().sent.contains(message_id)
    }

    pub fn is_suppressed(&self, message_id: &str) -> bool {
        self.lock().warmup.is_suppressed(message_id)
    }

    pub fn is_warm(&self, source_id: &str) -> bool {
        self.lock().warmup.is_warm(source_id)
    }

    pub fn all_warm(&self) -> bool {
        self.lock().warmup.all_warm()
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }
}

//! 有界去重消息缓冲区

use crate::message::Message;
use std::collections::{HashSet, VecDeque};

/// 有界消息缓冲区
///
/// 按插入顺序保存，满时淘汰最早插入的一条；同一 ID 只保留一份。
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: usize,
    entries: VecDeque<Message>,
    ids: HashSet<String>,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// 追加消息，返回是否实际插入
    pub fn append(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }

        self.ids.insert(message.id.clone());
        self.entries.push_back(message);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// 按插入顺序复制全部消息，O(N)
    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }
}

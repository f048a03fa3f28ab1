//! 待处理队列
//!
//! 严格先进先出。条目在外呼结束（成功或失败）时才移出，
//! 所以队列长度包含已派发但未结束的条目。

use std::collections::VecDeque;

/// 条目所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Queued,
    Dispatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    id: String,
    stage: Stage,
}

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾
    pub fn push_back(&mut self, id: impl Into<String>) {
        self.entries.push_back(PendingEntry {
            id: id.into(),
            stage: Stage::Queued,
        });
    }

    /// 最早到达且尚未派发的条目
    pub fn peek_queued(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.stage == Stage::Queued)
            .map(|e| e.id.as_str())
    }

    /// 把最早的 `Queued` 条目标记为 `Dispatched` 并返回其标识
    pub fn dispatch_next(&mut self) -> Option<String> {
        let entry = self.entries.iter_mut().find(|e| e.stage == Stage::Queued)?;
        entry.stage = Stage::Dispatched;
        Some(entry.id.clone())
    }

    /// 外呼结束后移出条目
    pub fn retire(&mut self, id: &str) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn queued_count(&self) -> usize {
        self.entries.iter().filter(|e| e.stage == Stage::Queued).count()
    }

    pub fn dispatched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.stage == Stage::Dispatched)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! 并发闸门 - 基础设施层
//!
//! 持有在途请求计数，只暴露"非阻塞申请名额"的能力。
//! 闸门内部不排队，等待策略由调度器决定。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// 并发闸门
///
/// 不变式：`0 <= active_count <= max_concurrent`，
/// 且 `active_count` 等于当前未释放的 `GatePermit` 数量。
#[derive(Debug)]
pub struct ConcurrencyGate {
    max_concurrent: usize,
    active: AtomicUsize,
    acquired_total: AtomicU64,
    released_total: AtomicU64,
}

/// 申请/释放累计次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    pub acquired: u64,
    pub released: u64,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            active: AtomicUsize::new(0),
            acquired_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
        }
    }

    /// 尝试占用一个名额
    ///
    /// 非阻塞：已满时立即返回 `None`。成功时返回的 `GatePermit`
    /// 在被丢弃时自动释放名额。
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        let admitted = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_concurrent).then_some(n + 1)
            })
            .is_ok();
        if !admitted {
            return None;
        }
        self.acquired_total.fetch_add(1, Ordering::Relaxed);
        debug!(
            "闸门放行，在途 {}/{}",
            self.active_count(),
            self.max_concurrent
        );
        Some(GatePermit {
            gate: Arc::clone(self),
        })
    }

    fn release(&self) {
        match self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(_) => {
                self.released_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => error!("闸门计数下溢，释放次数多于申请次数"),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn has_free_slot(&self) -> bool {
        self.active_count() < self.max_concurrent
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            acquired: self.acquired_total.load(Ordering::Relaxed),
            released: self.released_total.load(Ordering::Relaxed),
        }
    }
}

/// 闸门名额，丢弃即释放
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<ConcurrencyGate>,
}

impl GatePermit {
    /// 显式释放
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

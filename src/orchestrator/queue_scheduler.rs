//! 队列调度器 - 编排层
//!
//! ## 职责
//!
//! 把待处理队列中的问题经过并发闸门交给问答客户端，并把结果写回账本。
//!
//! ## 调度规则
//!
//! 1. 每次账本/队列/闸门状态变化后显式调用 `pump()`，不做定时轮询
//! 2. 严格先进先出：到达顺序决定派发顺序
//! 3. 外呼结束（成功、失败、超时、panic）时：写回结果 → 移出队列 → 释放名额 → 再次 `pump()`
//! 4. 队列长度达到上限时直接拒绝新提交
//!
//! ## 并发模型
//!
//! - 账本和队列放在同一把锁里，锁内的修改互相原子
//! - 每个外呼是一个 tokio 任务，持有 `GatePermit`，任何退出路径都会释放名额
//! - 结果失败只影响对应记录，不会阻塞其他外呼

use crate::clients::{AnswerClient, AnswerResult, ErrorKind};
use crate::config::Config;
use crate::error::SubmitError;
use crate::infrastructure::{ConcurrencyGate, GatePermit, GateStats};
use crate::models::{QuestionRecord, RecordPatch, RecordState, SessionId};
use crate::services::SessionStore;
use crate::utils::logging::{short_id, truncate_text};
use crate::workflow::{LedgerLimits, PendingQueue, QuestionLedger};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 调度器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    /// 队列长度上限（包含已派发未结束的条目）
    pub max_pending: usize,
    pub limits: LedgerLimits,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_pending: config.max_pending,
            limits: config.ledger_limits(),
        }
    }
}

/// 每次变更后发布给界面的视图
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerView {
    pub records: Vec<QuestionRecord>,
    /// 待处理队列长度
    pub pending: usize,
    /// 在途外呼数量
    pub active: usize,
}

impl LedgerView {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}

struct SchedulerState {
    ledger: QuestionLedger,
    queue: PendingQueue,
    /// 每次重置加一，用来丢弃重置前发出的外呼结果
    epoch: u64,
}

struct Inner {
    session_id: SessionId,
    settings: SchedulerSettings,
    client: AnswerClient,
    store: SessionStore,
    gate: Arc<ConcurrencyGate>,
    state: Mutex<SchedulerState>,
    view_tx: watch::Sender<LedgerView>,
}

/// 队列调度器
///
/// 只能用非空的 `SessionId` 构造，没有会话时不存在调度器，也就不会派发任何请求。
/// 构造和提交都会派生 tokio 任务，需要在运行时内调用。
#[derive(Clone)]
pub struct QueueScheduler {
    inner: Arc<Inner>,
}

impl QueueScheduler {
    /// 激活会话：恢复持久化的记录并开始调度
    ///
    /// 上次未完成（`Pending` / `InFlight`）的记录会按原顺序重新排队。
    pub fn activate(
        session_id: SessionId,
        settings: SchedulerSettings,
        client: AnswerClient,
        store: SessionStore,
    ) -> Self {
        let restored = store.load(&session_id);
        let mut ledger = QuestionLedger::restore(settings.limits, restored);
        let mut queue = PendingQueue::new();

        let unfinished: Vec<String> = ledger
            .records()
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.id.clone())
            .collect();
        let pending_patch = RecordPatch {
            state: Some(RecordState::Pending),
            answer_text: None,
        };
        for id in unfinished {
            if ledger.update(&id, &pending_patch).is_ok() {
                queue.push_back(id);
            }
        }

        info!("📂 会话 {} 已激活: 恢复 {} 条记录", session_id, ledger.len());
        if !queue.is_empty() {
            // 恢复的条目全部重新排队，即使超过上限；排空到上限以下之前拒绝新提交
            info!(
                "🔁 重新排队 {} 条未完成的问题 (上限 {})",
                queue.len(),
                settings.max_pending
            );
        }

        let (view_tx, _) = watch::channel(LedgerView::default());
        let inner = Arc::new(Inner {
            session_id,
            settings,
            client,
            store,
            gate: Arc::new(ConcurrencyGate::new(settings.max_concurrent)),
            state: Mutex::new(SchedulerState {
                ledger,
                queue,
                epoch: 0,
            }),
            view_tx,
        });

        {
            let state = inner.lock_state();
            inner.persist(&state);
            inner.publish(&state);
        }
        inner.pump();

        Self { inner }
    }

    /// 提交一个问题
    ///
    /// 校验失败或队列已满时同步返回错误，问题不会进入队列。
    pub fn submit(&self, question_text: &str) -> Result<QuestionRecord, SubmitError> {
        let record = {
            let mut state = self.inner.lock_state();
            let cap = self.inner.settings.max_pending;
            if state.queue.len() >= cap {
                warn!("⚠️ 待处理队列已满 ({}/{}), 拒绝提交", state.queue.len(), cap);
                return Err(SubmitError::QueueFull { cap });
            }

            let record = state.ledger.append(question_text).map_err(|e| {
                warn!("⚠️ 提交被拒绝: {}", e);
                e
            })?;
            state.queue.push_back(record.id.clone());
            self.inner.persist(&state);
            self.inner.publish(&state);
            record
        };

        info!(
            "📝 [{}] 已入队: {}",
            short_id(&record.id),
            truncate_text(&record.question_text, 60)
        );
        self.inner.pump();
        Ok(record)
    }

    /// 输入框当前是否允许提交
    pub fn can_submit(&self, input: &str) -> bool {
        !input.trim().is_empty() && self.pending_len() < self.inner.settings.max_pending
    }

    /// 显式重置会话：清空账本和队列，删除持久化数据
    ///
    /// 重置前已发出的外呼照常结束并释放名额，但结果会被丢弃。
    pub fn reset(&self) {
        let mut state = self.inner.lock_state();
        state.epoch += 1;
        state.ledger.clear();
        state.queue.clear();
        if let Err(e) = self.inner.store.clear(&self.inner.session_id) {
            warn!("⚠️ 清除持久化数据失败: {}", e);
        }
        self.inner.publish(&state);
        info!("🧹 会话 {} 已重置", self.inner.session_id);
    }

    pub fn snapshot(&self) -> Vec<QuestionRecord> {
        self.inner.lock_state().ledger.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<LedgerView> {
        self.inner.view_tx.subscribe()
    }

    /// 等待队列清空且没有在途外呼
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // 发送端由 self 持有，不会提前关闭
        let _ = rx.wait_for(LedgerView::is_idle).await;
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.gate.active_count()
    }

    pub fn gate_stats(&self) -> GateStats {
        self.inner.gate.stats()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 持久化失败只记日志，内存中的账本仍然有效
    ///
    /// 在状态锁内同步写入，`FileStore` 时是阻塞的文件 IO。
    /// 记录量受队列上限约束，写入很小；存储变慢时应改为 `spawn_blocking` 写快照。
    fn persist(&self, state: &SchedulerState) {
        if let Err(e) = self.store.save(&self.session_id, state.ledger.records()) {
            warn!("⚠️ 保存会话 {} 失败（内存记录不受影响）: {}", self.session_id, e);
        }
    }

    fn publish(&self, state: &SchedulerState) {
        self.view_tx.send_replace(LedgerView {
            records: state.ledger.snapshot(),
            pending: state.queue.len(),
            active: self.gate.active_count(),
        });
    }

    /// 只要队列里有等待的条目且闸门有空位，就派发队首
    fn pump(self: &Arc<Self>) {
        loop {
            let (id, question, permit, epoch) = {
                let mut state = self.lock_state();
                if state.queue.peek_queued().is_none() {
                    return;
                }
                let Some(permit) = self.gate.try_acquire() else {
                    debug!(
                        "闸门已满，在途 {}，等待 {}",
                        state.queue.dispatched_count(),
                        state.queue.queued_count()
                    );
                    return;
                };
                let Some(id) = state.queue.dispatch_next() else {
                    return;
                };

                if let Err(e) = state.ledger.update(&id, &RecordPatch::in_flight()) {
                    error!("[{}] 无法标记为派发中，移出队列: {}", short_id(&id), e);
                    state.queue.retire(&id);
                    self.publish(&state);
                    continue;
                }
                let question = state
                    .ledger
                    .get(&id)
                    .map(|r| r.question_text.clone())
                    .unwrap_or_default();

                self.persist(&state);
                self.publish(&state);
                (id, question, permit, state.epoch)
            };

            info!(
                "🚀 [{}] 已派发 (在途 {}/{})",
                short_id(&id),
                self.gate.active_count(),
                self.gate.max_concurrent()
            );
            tokio::spawn(Arc::clone(self).dispatch(id, question, permit, epoch));
        }
    }

    async fn dispatch(self: Arc<Self>, id: String, question: String, permit: GatePermit, epoch: u64) {
        let result = AssertUnwindSafe(self.client.ask(&self.session_id, &question))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("[{}] ❌ 外呼过程中发生 panic", short_id(&id));
                AnswerResult::failure(ErrorKind::Unknown)
            });

        self.settle(&id, result, permit, epoch);
        self.pump();
    }

    fn settle(&self, id: &str, result: AnswerResult, permit: GatePermit, epoch: u64) {
        let mut state = self.lock_state();

        if state.epoch != epoch {
            debug!("[{}] 会话已重置，丢弃结果", short_id(id));
            permit.release();
            self.publish(&state);
            return;
        }

        let patch = match result {
            AnswerResult::Answer { text } => {
                info!("✅ [{}] 已回答", short_id(id));
                RecordPatch::answered(text)
            }
            AnswerResult::Failure { kind, message } => {
                warn!("❌ [{}] 失败 ({:?}): {}", short_id(id), kind, message);
                RecordPatch::failed(message)
            }
        };
        if let Err(e) = state.ledger.update(id, &patch) {
            error!("[{}] 写回结果失败: {}", short_id(id), e);
        }
        state.queue.retire(id);
        permit.release();

        self.persist(&state);
        self.publish(&state);
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use question_queue::error::TransportError;
use question_queue::{
    AnswerClient, AnswerTransport, LedgerLimits, MemoryStore, QueueScheduler, SchedulerSettings,
    SessionId, SessionStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 预设的单次外呼行为
#[derive(Clone)]
pub enum Outcome {
    Answer(String),
    Error(TransportError),
    Panic,
}

#[derive(Clone)]
pub struct Step {
    pub delay: Duration,
    pub outcome: Outcome,
}

impl Step {
    pub fn answer_after(ms: u64, text: &str) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            outcome: Outcome::Answer(text.to_string()),
        }
    }

    pub fn error_after(ms: u64, err: TransportError) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            outcome: Outcome::Error(err),
        }
    }

    pub fn panic_after(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            outcome: Outcome::Panic,
        }
    }
}

/// 按问题文本返回预设结果的传输层，记录派发顺序和峰值并发
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, Step>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, question: &str, step: Step) {
        self.script
            .lock()
            .unwrap()
            .insert(question.to_string(), step);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerTransport for ScriptedTransport {
    async fn send(
        &self,
        _session_id: &SessionId,
        questions: &[String],
    ) -> Result<Vec<String>, TransportError> {
        assert_eq!(questions.len(), 1, "每次只发送一个问题");
        let question = questions[0].clone();
        self.calls.lock().unwrap().push(question.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // 超时取消时也要减回去
        let _guard = InFlightGuard(&self.in_flight);

        let step = self
            .script
            .lock()
            .unwrap()
            .get(&question)
            .cloned()
            .unwrap_or_else(|| Step::answer_after(10, &format!("answer to {}", question)));

        tokio::time::sleep(step.delay).await;
        match step.outcome {
            Outcome::Answer(text) => Ok(vec![text]),
            Outcome::Error(err) => Err(err),
            Outcome::Panic => panic!("scripted transport panic for {}", question),
        }
    }
}

pub fn settings(max_concurrent: usize, max_pending: usize) -> SchedulerSettings {
    SchedulerSettings {
        max_concurrent,
        max_pending,
        limits: LedgerLimits::default(),
    }
}

pub fn session() -> SessionId {
    SessionId::new("scenario-session").unwrap()
}

pub fn start(
    transport: Arc<ScriptedTransport>,
    settings: SchedulerSettings,
    timeout: Duration,
    kv: Arc<MemoryStore>,
) -> QueueScheduler {
    QueueScheduler::activate(
        session(),
        settings,
        AnswerClient::new(transport, timeout),
        SessionStore::new(kv),
    )
}

//! 答案逐段展示 - 业务能力层
//!
//! 只规定展示的时序：最新且已回答的记录按固定节奏逐段展示，
//! 其余记录直接展示全文，没有答案的记录显示加载占位。

use crate::models::{QuestionRecord, RecordState};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// 按空白切分，保留空白段本身，拼接后与原文一致
pub fn segment(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut last = 0;
    for m in whitespace().find_iter(text) {
        if m.start() > last {
            segments.push(text[last..m.start()].to_string());
        }
        segments.push(m.as_str().to_string());
        last = m.end();
    }
    if last < text.len() {
        segments.push(text[last..].to_string());
    }
    segments
}

/// 一条记录应当如何展示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealMode {
    Loading,
    Immediate(String),
    Progressive(String),
}

pub fn reveal_mode(record: &QuestionRecord) -> RevealMode {
    match &record.answer_text {
        None => RevealMode::Loading,
        Some(text) if record.state == RecordState::Answered && record.is_latest => {
            RevealMode::Progressive(text.clone())
        }
        Some(text) => RevealMode::Immediate(text.clone()),
    }
}

/// 渲染结果
#[derive(Debug, Clone)]
pub enum RevealView {
    /// 尚无答案
    Loading,
    /// 已展示的文本，随节奏增长，最终等于全文
    Text(watch::Receiver<String>),
}

impl RevealView {
    /// 当前已展示的文本
    pub fn current(&self) -> Option<String> {
        match self {
            RevealView::Loading => None,
            RevealView::Text(rx) => Some(rx.borrow().clone()),
        }
    }
}

struct ActiveReveal {
    record_id: String,
    answer: String,
    rx: watch::Receiver<String>,
    task: JoinHandle<()>,
}

/// 单条记录的展示控制器
///
/// 用同样的输入重复渲染不会重新开始展示。
/// 控制器被丢弃时，进行中的展示随之停止。需要在 tokio 运行时内使用。
pub struct RevealController {
    interval: Duration,
    active: Option<ActiveReveal>,
}

impl RevealController {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: None,
        }
    }

    pub fn render(&mut self, record: &QuestionRecord) -> RevealView {
        match reveal_mode(record) {
            RevealMode::Loading => {
                self.cancel();
                RevealView::Loading
            }
            RevealMode::Immediate(text) => {
                self.cancel();
                let (_tx, rx) = watch::channel(text);
                RevealView::Text(rx)
            }
            RevealMode::Progressive(text) => {
                if let Some(active) = &self.active {
                    if active.record_id == record.id && active.answer == text {
                        return RevealView::Text(active.rx.clone());
                    }
                }
                self.cancel();
                let rx = self.start(record.id.clone(), text);
                RevealView::Text(rx)
            }
        }
    }

    fn start(&mut self, record_id: String, answer: String) -> watch::Receiver<String> {
        let (tx, rx) = watch::channel(String::new());
        let segments = segment(&answer);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回
            ticker.tick().await;
            let mut shown = String::new();
            for piece in segments {
                ticker.tick().await;
                shown.push_str(&piece);
                if tx.send(shown.clone()).is_err() {
                    return;
                }
            }
        });

        self.active = Some(ActiveReveal {
            record_id,
            answer,
            rx: rx.clone(),
            task,
        });
        rx
    }

    /// 是否有正在进行的展示
    pub fn is_revealing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

impl Drop for RevealController {
    fn drop(&mut self) {
        self.cancel();
    }
}

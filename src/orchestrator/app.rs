//! 命令行应用 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、打开存储、确定会话、探测后端
//! 2. **读取输入**：标准输入每一行即一次提交（相当于不带 Shift 的回车）
//! 3. **展示答案**：订阅账本视图，严格按账本顺序展示，最新答案逐段展示
//! 4. **统计输出**：输入结束后等待队列清空，输出会话统计
//!
//! 输入 `/reset` 重置会话，`/quit` 退出。

use crate::clients::{AnswerClient, HttpTransport};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{FileStore, KeyValueStore};
use crate::models::{QuestionRecord, RecordState};
use crate::orchestrator::queue_scheduler::{LedgerView, QueueScheduler, SchedulerSettings};
use crate::services::{RevealController, RevealView, SessionBootstrap, SessionStore};
use crate::utils::logging::{log_startup, print_final_stats};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    scheduler: QueueScheduler,
}

impl App {
    /// 初始化应用
    ///
    /// 会话没有上传标记且配置不允许假定就绪时返回 `DocumentNotReady`，调度器不会启动。
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        log_startup(&config);

        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.store_dir)?);

        let bootstrap = SessionBootstrap::new(kv.clone());
        let session_id = bootstrap.resolve_session()?;
        if !bootstrap.ensure_document_ready(&session_id, config.assume_document_ready)? {
            return Err(AppError::DocumentNotReady {
                session: session_id.to_string(),
            });
        }

        let transport = Arc::new(HttpTransport::new(&config)?);
        match transport.health_check().await {
            Ok(status) => info!("✓ 后端连接正常: {}", status),
            Err(e) => warn!("⚠️ 后端探测失败，继续运行: {}", e),
        }

        let client = AnswerClient::new(transport, config.request_timeout());
        let scheduler = QueueScheduler::activate(
            session_id,
            SchedulerSettings::from_config(&config),
            client,
            SessionStore::new(kv),
        );

        Ok(Self { config, scheduler })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> AppResult<()> {
        if self.scheduler.snapshot().is_empty() {
            println!("Document ready. You can start asking your questions now.");
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let input = async move {
            let result = self.read_input().await;
            info!("⏳ 输入结束，等待剩余问题完成...");
            self.scheduler.wait_idle().await;
            let _ = stop_tx.send(());
            result
        };
        let render = render_loop(
            self.scheduler.subscribe(),
            self.config.reveal_interval(),
            stop_rx,
            io::stdout(),
        );

        let (input_result, render_result) = tokio::join!(input, render);
        input_result?;
        render_result?;

        let records = self.scheduler.snapshot();
        let answered = count_state(&records, RecordState::Answered);
        let failed = count_state(&records, RecordState::Failed);
        print_final_stats(answered, failed, records.len());

        Ok(())
    }

    async fn read_input(&self) -> AppResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match line.trim() {
                "/quit" => break,
                "/reset" => {
                    self.scheduler.reset();
                    println!("Session cleared.");
                }
                input if !self.scheduler.can_submit(input) => {
                    if !input.is_empty() {
                        println!(
                            "Please wait: {} questions are still pending.",
                            self.scheduler.pending_len()
                        );
                    }
                }
                input => {
                    if let Err(e) = self.scheduler.submit(input) {
                        println!("Not submitted: {}", e);
                    }
                }
            }
        }
        Ok(())
    }
}

fn count_state(records: &[QuestionRecord], state: RecordState) -> usize {
    records.iter().filter(|r| r.state == state).count()
}

/// 展示进度：下一条待展示记录的位置
///
/// 只有前面的记录都已展示，后面已完成的记录才会被放出。
#[derive(Debug, Default)]
struct DisplayCursor {
    next: usize,
    last_shown: Option<String>,
}

impl DisplayCursor {
    /// 返回本轮可以展示的连续一段记录
    ///
    /// 上一条已展示的记录不在原位时说明账本被重置，从头开始。
    fn advance<'a>(&mut self, records: &'a [QuestionRecord]) -> &'a [QuestionRecord] {
        if let Some(id) = &self.last_shown {
            let unchanged = self
                .next
                .checked_sub(1)
                .and_then(|idx| records.get(idx))
                .is_some_and(|r| &r.id == id);
            if !unchanged {
                self.next = 0;
                self.last_shown = None;
            }
        }

        let start = self.next;
        let ready = records[start..]
            .iter()
            .take_while(|r| r.is_terminal())
            .count();
        let end = start + ready;
        if end > start {
            self.next = end;
            self.last_shown = Some(records[end - 1].id.clone());
        }
        &records[start..end]
    }
}

/// 按账本顺序展示已完成的记录，收到停止信号后再展示一轮就退出
async fn render_loop<W: Write>(
    mut rx: watch::Receiver<LedgerView>,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    mut out: W,
) -> io::Result<W> {
    let mut reveal = RevealController::new(interval);
    let mut cursor = DisplayCursor::default();
    let mut stopping = false;

    loop {
        let records = rx.borrow_and_update().records.clone();
        for record in cursor.advance(&records) {
            write_record(&mut out, &mut reveal, record).await?;
        }

        if stopping {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut stop_rx => {
                stopping = true;
            }
        }
    }
    Ok(out)
}

async fn write_record<W: Write>(
    out: &mut W,
    reveal: &mut RevealController,
    record: &QuestionRecord,
) -> io::Result<()> {
    writeln!(out, "Q: {}", record.question_text)?;
    writeln!(out, "{}", "-".repeat(40))?;
    if let RevealView::Text(mut text_rx) = reveal.render(record) {
        let full_len = record.answer_text.as_ref().map_or(0, String::len);
        write_progressively(out, &mut text_rx, full_len).await?;
    }
    Ok(())
}

async fn write_progressively<W: Write>(
    out: &mut W,
    text_rx: &mut watch::Receiver<String>,
    full_len: usize,
) -> io::Result<()> {
    let mut printed = 0;
    loop {
        let current = text_rx.borrow_and_update().clone();
        if current.len() > printed {
            write!(out, "{}", &current[printed..])?;
            out.flush()?;
            printed = current.len();
        }
        if printed >= full_len || text_rx.changed().await.is_err() {
            break;
        }
    }
    writeln!(out, "\n")
}

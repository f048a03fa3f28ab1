//! # Question Queue
//!
//! 面向文档问答后端的客户端问题队列
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `KeyValueStore` - 字符串键值存储（内存 / 文件）
//! - `ConcurrencyGate` - 在途请求名额，`GatePermit` 丢弃即释放
//!
//! ### ② 业务能力层（Clients / Services）
//! - `clients/` - `AnswerClient` 单次外呼，负责超时和错误分类
//! - `services/` - `SessionStore` 持久化、`SessionBootstrap` 会话标识、`RevealController` 逐段展示
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - `QuestionLedger` 有序账本、`PendingQueue` 先进先出队列
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/queue_scheduler` - 调度循环：闸门放行 → 外呼 → 写回 → 重新调度
//! - `orchestrator/app` - 命令行应用
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{AnswerClient, AnswerResult, AnswerTransport, ErrorKind, HttpTransport};
pub use config::Config;
pub use error::{AppError, AppResult, SubmitError};
pub use infrastructure::{ConcurrencyGate, FileStore, KeyValueStore, MemoryStore};
pub use models::{QuestionRecord, RecordPatch, RecordState, SessionId};
pub use orchestrator::{App, LedgerView, QueueScheduler, SchedulerSettings};
pub use services::{RevealController, RevealView, SessionStore};
pub use workflow::{LedgerLimits, PendingQueue, QuestionLedger};

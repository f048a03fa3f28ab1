//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `queue_scheduler` - 队列调度器
//! - 持有账本、待处理队列和并发闸门
//! - 决定何时派发、如何写回结果
//! - 每次状态变化后显式重新调度
//!
//! ### `app` - 命令行应用
//! - 初始化日志、配置、存储和后端连接
//! - 从标准输入读取问题并展示答案
//!
//! ## 层次关系
//!
//! ```text
//! app (读输入、展示)
//!     ↓
//! queue_scheduler (调度 Vec<QuestionRecord>)
//!     ↓
//! workflow (账本 / 队列)  +  clients (单次外呼)  +  services (持久化 / 展示)
//!     ↓
//! infrastructure (键值存储 / 并发闸门)
//! ```

pub mod app;
pub mod queue_scheduler;

pub use app::App;
pub use queue_scheduler::{LedgerView, QueueScheduler, SchedulerSettings};

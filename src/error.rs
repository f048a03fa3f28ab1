//! 错误类型
//!
//! 按层划分：提交校验、账本、持久化、网络传输、配置。
//! `AppError` 汇总所有错误，`App` 的初始化和运行都返回 `AppResult`。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("提交被拒绝: {0}")]
    Submit(#[from] SubmitError),
    #[error("账本错误: {0}")]
    Ledger(#[from] LedgerError),
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    #[error("网络错误: {0}")]
    Transport(#[from] TransportError),
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 终端读写失败
    #[error("输入输出错误: {0}")]
    Io(#[from] std::io::Error),
    /// 会话的文档尚未上传，不能开始提问
    #[error("会话 {session} 尚未上传文档")]
    DocumentNotReady { session: String },
}

/// 提交校验失败，同步返回给提交者，问题不会进入队列
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// 去除首尾空白后为空
    #[error("问题不能为空")]
    Empty,
    /// 超过长度上限
    #[error("问题过长: {len} 个字符 (上限 {max})")]
    TooLong { len: usize, max: usize },
    /// 与账本中已有问题重复（忽略大小写）
    #[error("问题已提交过: {existing_id}")]
    Duplicate { existing_id: String },
    /// 待处理队列已满
    #[error("待处理队列已满 (上限 {cap})")]
    QueueFull { cap: usize },
}

/// 账本更新错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("记录不存在: {0}")]
    UnknownRecord(String),
    /// 终态记录不能再被修改
    #[error("记录 {id} 已处于终态 {state}")]
    Terminal { id: String, state: String },
    /// 只有终态才能携带答案
    #[error("状态 {state} 不能携带答案文本")]
    AnswerWithoutTerminal { state: String },
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读写失败 ({key}): {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 存储空间不足
    #[error("存储空间不足: 写入 {key} 需要 {needed} 字节, 剩余 {available} 字节")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 与问答后端通信时的错误
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 后端返回非 2xx 状态
    #[error("后端返回状态 {status}: {message:?}")]
    Status { status: u16, message: Option<String> },
    /// 请求超时
    #[error("请求超时")]
    Timeout,
    /// 网络层失败
    #[error("请求失败: {0}")]
    Network(String),
    /// 响应结构不符合预期
    #[error("响应格式错误: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件解析失败 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: String, reason: String },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

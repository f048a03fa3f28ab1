use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 会话标识
///
/// 由上游（上传/启动流程）提供，非空才有效。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// 去除首尾空白后为空则返回 `None`
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// 生成一个新的随机会话标识
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 记录的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Pending,
    InFlight,
    Answered,
    Failed,
}

impl RecordState {
    /// `Answered` 和 `Failed` 是终态
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordState::Answered | RecordState::Failed)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordState::Pending => "Pending",
            RecordState::InFlight => "InFlight",
            RecordState::Answered => "Answered",
            RecordState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// 一个问题及其答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    pub question_text: String,
    pub state: RecordState,
    /// 仅在终态时存在；`Failed` 时为面向用户的提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_latest: bool,
}

impl QuestionRecord {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// 对记录的部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub state: Option<RecordState>,
    pub answer_text: Option<String>,
}

impl RecordPatch {
    pub fn in_flight() -> Self {
        Self {
            state: Some(RecordState::InFlight),
            answer_text: None,
        }
    }

    pub fn answered(text: impl Into<String>) -> Self {
        Self {
            state: Some(RecordState::Answered),
            answer_text: Some(text.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(RecordState::Failed),
            answer_text: Some(message.into()),
        }
    }
}

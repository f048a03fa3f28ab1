//! 会话持久化服务 - 业务能力层
//!
//! 只负责"按会话读写问题记录"能力，存储键为 `{sessionId}-questions`。

use crate::error::StoreError;
use crate::infrastructure::KeyValueStore;
use crate::models::{QuestionRecord, SessionId};
use std::sync::Arc;
use tracing::{debug, warn};

/// 会话持久化服务
///
/// 职责：
/// - 读取时容忍损坏数据：清掉损坏的条目并返回空列表
/// - 恢复出的记录一律 `is_latest = false`
/// - 不决定何时保存，由调度器在每次变更后调用
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn key_for(session_id: &SessionId) -> String {
        format!("{}-questions", session_id)
    }

    /// 读取会话的全部记录
    ///
    /// 任何读取或解析失败都只记日志，返回空列表。
    pub fn load(&self, session_id: &SessionId) -> Vec<QuestionRecord> {
        let key = Self::key_for(session_id);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("⚠️ 读取会话 {} 的记录失败: {}", session_id, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<QuestionRecord>>(&raw) {
            Ok(mut records) => {
                for record in records.iter_mut() {
                    record.is_latest = false;
                }
                debug!("会话 {} 恢复了 {} 条记录", session_id, records.len());
                records
            }
            Err(e) => {
                warn!("⚠️ 会话 {} 的持久化数据已损坏，已丢弃: {}", session_id, e);
                if let Err(e) = self.kv.remove(&key) {
                    warn!("⚠️ 清理损坏数据失败: {}", e);
                }
                Vec::new()
            }
        }
    }

    /// 保存会话的全部记录
    pub fn save(&self, session_id: &SessionId, records: &[QuestionRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string(records)?;
        self.kv.set(&Self::key_for(session_id), &json)
    }

    /// 删除会话的持久化记录
    pub fn clear(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.kv.remove(&Self::key_for(session_id))
    }
}

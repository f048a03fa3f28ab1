//! 会话启动服务 - 业务能力层
//!
//! 负责确定当前会话标识，以及会话的文档是否已经上传到后端。
//! 上传本身不在本 crate 范围内，这里只读写它留下的标记。

use crate::error::StoreError;
use crate::infrastructure::KeyValueStore;
use crate::models::SessionId;
use std::sync::Arc;
use tracing::{info, warn};

const SESSION_KEY: &str = "sessionID";

pub struct SessionBootstrap {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionBootstrap {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// 读取已保存的会话标识，没有则生成一个新的并保存
    pub fn resolve_session(&self) -> Result<SessionId, StoreError> {
        if let Some(existing) = self.kv.get(SESSION_KEY)?.and_then(SessionId::new) {
            info!("♻️ 沿用已有会话: {}", existing);
            return Ok(existing);
        }

        let fresh = SessionId::generate();
        self.kv.set(SESSION_KEY, fresh.as_str())?;
        info!("🆕 创建新会话: {}", fresh);
        Ok(fresh)
    }

    fn uploaded_key(session_id: &SessionId) -> String {
        format!("{}-pdfUploaded", session_id)
    }

    /// 该会话的文档是否已上传
    pub fn is_document_ready(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.kv.get(&Self::uploaded_key(session_id))?.as_deref() == Some("true"))
    }

    pub fn mark_document_ready(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.kv.set(&Self::uploaded_key(session_id), "true")
    }

    /// 决定会话能否开始提问
    ///
    /// 没有上传标记时，`assume_ready` 为 true 则补上标记并放行，否则保持未就绪。
    pub fn ensure_document_ready(
        &self,
        session_id: &SessionId,
        assume_ready: bool,
    ) -> Result<bool, StoreError> {
        if self.is_document_ready(session_id)? {
            return Ok(true);
        }
        if !assume_ready {
            warn!("⚠️ 会话 {} 尚未上传文档", session_id);
            return Ok(false);
        }
        warn!("⚠️ 会话 {} 没有上传标记，假定文档已就绪", session_id);
        self.mark_document_ready(session_id)?;
        Ok(true)
    }
}

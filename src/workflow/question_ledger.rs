//! 问题账本
//!
//! 一个会话内所有问题的有序记录，是界面渲染和持久化的唯一数据来源。
//! 记录严格按提交顺序排列，完成顺序不会改变位置。

use crate::error::{LedgerError, SubmitError};
use crate::models::{QuestionRecord, RecordPatch, RecordState};
use chrono::Utc;
use uuid::Uuid;

/// 提交校验的限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLimits {
    /// 最大字符数（按 Unicode 字符计）
    pub max_question_len: usize,
    /// 是否拒绝与已有问题重复的提交
    pub reject_duplicates: bool,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_question_len: 1000,
            reject_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuestionLedger {
    records: Vec<QuestionRecord>,
    limits: LedgerLimits,
}

impl QuestionLedger {
    pub fn new(limits: LedgerLimits) -> Self {
        Self {
            records: Vec::new(),
            limits,
        }
    }

    /// 用持久化恢复的记录重建账本，所有记录的 `is_latest` 置为 false
    pub fn restore(limits: LedgerLimits, mut records: Vec<QuestionRecord>) -> Self {
        for record in records.iter_mut() {
            record.is_latest = false;
        }
        Self { records, limits }
    }

    /// 校验一次提交，成功时返回去除首尾空白后的文本
    pub fn validate(&self, question_text: &str) -> Result<String, SubmitError> {
        let trimmed = question_text.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::Empty);
        }

        let len = trimmed.chars().count();
        if len > self.limits.max_question_len {
            return Err(SubmitError::TooLong {
                len,
                max: self.limits.max_question_len,
            });
        }

        if self.limits.reject_duplicates {
            let folded = trimmed.to_lowercase();
            if let Some(existing) = self
                .records
                .iter()
                .find(|r| r.question_text.trim().to_lowercase() == folded)
            {
                return Err(SubmitError::Duplicate {
                    existing_id: existing.id.clone(),
                });
            }
        }

        Ok(trimmed.to_string())
    }

    /// 追加一条 `Pending` 记录，并把它设为唯一的最新记录
    pub fn append(&mut self, question_text: &str) -> Result<QuestionRecord, SubmitError> {
        let text = self.validate(question_text)?;

        for record in self.records.iter_mut() {
            record.is_latest = false;
        }

        let record = QuestionRecord {
            id: Uuid::new_v4().to_string(),
            question_text: text,
            state: RecordState::Pending,
            answer_text: None,
            created_at: Utc::now(),
            is_latest: true,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    /// 对记录做部分更新
    ///
    /// 重复应用同一个补丁是幂等的。终态记录只接受不改变任何内容的补丁。
    ///
    /// # 返回
    /// 记录是否发生了变化
    pub fn update(&mut self, id: &str, patch: &RecordPatch) -> Result<bool, LedgerError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::UnknownRecord(id.to_string()))?;

        let next_state = patch.state.unwrap_or(record.state);
        if patch.answer_text.is_some() && !next_state.is_terminal() {
            return Err(LedgerError::AnswerWithoutTerminal {
                state: next_state.to_string(),
            });
        }

        let state_changes = next_state != record.state;
        let answer_changes = patch
            .answer_text
            .as_ref()
            .is_some_and(|text| record.answer_text.as_ref() != Some(text));

        if !state_changes && !answer_changes {
            return Ok(false);
        }
        if record.is_terminal() {
            return Err(LedgerError::Terminal {
                id: id.to_string(),
                state: record.state.to_string(),
            });
        }

        record.state = next_state;
        if let Some(text) = &patch.answer_text {
            record.answer_text = Some(text.clone());
        }
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&QuestionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[QuestionRecord] {
        &self.records
    }

    /// 完整的有序列表，用于渲染和持久化
    pub fn snapshot(&self) -> Vec<QuestionRecord> {
        self.records.clone()
    }

    pub fn latest(&self) -> Option<&QuestionRecord> {
        self.records.iter().find(|r| r.is_latest)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

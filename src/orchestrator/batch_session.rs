//! 批次会话
//!
//! 一次选择动作产生的全部条目，加上会话令牌与批次级错误。
//! `is_processing` 由条目状态实时计算，不单独存储。

use std::fmt;

use serde::Serialize;

use crate::models::{ItemId, UploadItem, UploadStatus};

/// 会话令牌
///
/// 每次选择文件或重置都会换新令牌；派发出去的请求携带派发时的令牌，
/// 回来时令牌不一致即视为过期结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// 批次级错误（与单个条目无关的全局状况）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// 后端健康检查失败
    BackendUnavailable(String),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::BackendUnavailable(msg) => write!(f, "后端不可用: {}", msg),
        }
    }
}

/// 批次统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
}

/// 编排器独占的批次状态
#[derive(Debug)]
pub struct BatchSession {
    token: SessionToken,
    items: Vec<UploadItem>,
    batch_error: Option<BatchError>,
    pending_previews: usize,
}

impl BatchSession {
    /// 空会话
    pub fn empty(token: SessionToken) -> Self {
        Self::with_items(token, Vec::new())
    }

    pub fn with_items(token: SessionToken, items: Vec<UploadItem>) -> Self {
        Self {
            token,
            items,
            batch_error: None,
            pending_previews: 0,
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// 条目（按选择顺序）
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [UploadItem] {
        &mut self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    /// 是否还有条目处于 uploading
    pub fn is_processing(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.status() == UploadStatus::Uploading)
    }

    pub fn batch_error(&self) -> Option<&BatchError> {
        self.batch_error.as_ref()
    }

    pub fn set_batch_error(&mut self, error: BatchError) {
        self.batch_error = Some(error);
    }

    pub fn clear_batch_error(&mut self) {
        self.batch_error = None;
    }

    pub fn pending_previews(&self) -> usize {
        self.pending_previews
    }

    pub fn preview_requested(&mut self) {
        self.pending_previews += 1;
    }

    pub fn preview_resolved(&mut self) {
        self.pending_previews = self.pending_previews.saturating_sub(1);
    }

    /// 会话是否已无任何未完成的工作
    pub fn is_settled(&self) -> bool {
        !self.is_processing() && self.pending_previews == 0
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status() {
                UploadStatus::Pending => summary.pending += 1,
                UploadStatus::Uploading => summary.uploading += 1,
                UploadStatus::Completed => summary.completed += 1,
                UploadStatus::Error => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedFields, FileHandle};

    fn session_of(n: u64) -> BatchSession {
        let items = (1..=n)
            .map(|i| UploadItem::new(ItemId(i), FileHandle::new(format!("{}.png", i), vec![1])))
            .collect();
        BatchSession::with_items(SessionToken(7), items)
    }

    #[test]
    fn test_processing_is_derived_from_items() {
        let mut session = session_of(2);
        assert!(!session.is_processing());

        session.item_mut(ItemId(1)).unwrap().begin_upload().unwrap();
        assert!(session.is_processing());

        session
            .item_mut(ItemId(1))
            .unwrap()
            .complete(ExtractedFields::default())
            .unwrap();
        assert!(!session.is_processing());
    }

    #[test]
    fn test_summary_counts() {
        let mut session = session_of(3);
        let item = session.item_mut(ItemId(2)).unwrap();
        item.begin_upload().unwrap();
        item.fail("boom").unwrap();
        session.item_mut(ItemId(3)).unwrap().begin_upload().unwrap();

        assert_eq!(
            session.summary(),
            BatchSummary {
                total: 3,
                pending: 1,
                uploading: 1,
                completed: 0,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_settled_waits_for_previews() {
        let mut session = session_of(1);
        session.preview_requested();
        assert!(!session.is_settled());
        session.preview_resolved();
        session.preview_resolved();
        assert_eq!(session.pending_previews(), 0);
        assert!(session.is_settled());
    }
}

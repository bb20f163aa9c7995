//! 上传条目及其状态机
//!
//! ```text
//! pending --begin_upload--> uploading --complete--> completed
//! error   --begin_upload--> uploading --fail------> error
//! ```
//!
//! `completed` 是终态；`data` 与 `error` 由内部状态枚举承载，不可能同时存在。

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::InvalidTransition;
use crate::models::extraction::ExtractedFields;
use crate::models::file_handle::FileHandle;

/// 条目标识，在同一个编排器内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    /// 是否属于可（重新）提交的集合
    pub fn is_retryable(self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可直接展示的预览（data URL）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewUrl(pub String);

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ItemState {
    Pending,
    Uploading,
    Completed(ExtractedFields),
    Error(String),
}

impl ItemState {
    fn status(&self) -> UploadStatus {
        match self {
            ItemState::Pending => UploadStatus::Pending,
            ItemState::Uploading => UploadStatus::Uploading,
            ItemState::Completed(_) => UploadStatus::Completed,
            ItemState::Error(_) => UploadStatus::Error,
        }
    }
}

/// 一个选中文件及其独立的上传/提取生命周期
#[derive(Debug, Clone)]
pub struct UploadItem {
    id: ItemId,
    file: FileHandle,
    preview_url: Option<PreviewUrl>,
    state: ItemState,
    selected_at: DateTime<Local>,
    finished_at: Option<DateTime<Local>>,
}

impl UploadItem {
    /// 创建处于 pending 状态的新条目
    pub fn new(id: ItemId, file: FileHandle) -> Self {
        Self {
            id,
            file,
            preview_url: None,
            state: ItemState::Pending,
            selected_at: Local::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn preview_url(&self) -> Option<&PreviewUrl> {
        self.preview_url.as_ref()
    }

    pub fn status(&self) -> UploadStatus {
        self.state.status()
    }

    /// 提取结果，仅 completed 状态存在
    pub fn data(&self) -> Option<&ExtractedFields> {
        match &self.state {
            ItemState::Completed(data) => Some(data),
            _ => None,
        }
    }

    /// 错误信息，仅 error 状态存在
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ItemState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn selected_at(&self) -> DateTime<Local> {
        self.selected_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        self.finished_at
    }

    /// 设置预览，只允许设置一次；返回是否生效
    pub fn attach_preview(&mut self, preview: PreviewUrl) -> bool {
        if self.preview_url.is_some() {
            return false;
        }
        self.preview_url = Some(preview);
        true
    }

    /// pending/error -> uploading
    pub fn begin_upload(&mut self) -> Result<(), InvalidTransition> {
        if !self.status().is_retryable() {
            return Err(self.invalid(UploadStatus::Uploading));
        }
        self.state = ItemState::Uploading;
        self.finished_at = None;
        Ok(())
    }

    /// uploading -> completed
    pub fn complete(&mut self, data: ExtractedFields) -> Result<(), InvalidTransition> {
        self.ensure_uploading(UploadStatus::Completed)?;
        self.state = ItemState::Completed(data);
        self.finished_at = Some(Local::now());
        Ok(())
    }

    /// uploading -> error
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.ensure_uploading(UploadStatus::Error)?;
        self.state = ItemState::Error(message.into());
        self.finished_at = Some(Local::now());
        Ok(())
    }

    /// 生成只读报告
    pub fn to_report(&self) -> ItemReport {
        ItemReport {
            id: self.id,
            file_name: self.file.name().to_string(),
            status: self.status(),
            preview: self.preview_url.is_some(),
            data: self.data().cloned(),
            error: self.error().map(str::to_string),
            selected_at: self.selected_at,
            finished_at: self.finished_at,
        }
    }

    fn ensure_uploading(&self, to: UploadStatus) -> Result<(), InvalidTransition> {
        if self.status() == UploadStatus::Uploading {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: UploadStatus) -> InvalidTransition {
        InvalidTransition {
            from: self.status(),
            to,
        }
    }
}

/// 提供给结果展示方的只读快照
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: ItemId,
    pub file_name: String,
    pub status: UploadStatus,
    pub preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractedFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub selected_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
}

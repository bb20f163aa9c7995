//! # Doc Extract Uploader
//!
//! 把证件图片批量提交到远程提取后端，并分别跟踪每个文件的进度与结果
//!
//! ## 架构设计
//!
//! ### ① 数据层（Models）
//! - `models/` - 文件句柄、上传条目状态机、提取结果
//!
//! ### ② 能力层（Clients / Services）
//! - `clients/` - `BackendClient`：一次提交一个文件，返回成功或带 detail 的失败
//! - `services/` - `PreviewGenerator`：为文件生成 data URL 预览
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/batch_session` - 批次状态，`is_processing` 由条目推导
//! - `orchestrator/upload_orchestrator` - 选择、提交、结果回写、重置
//!
//! ### ④ 应用层（App）
//! - `app` - 命令行：读取文件、运行一轮批次、输出报告
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use clients::{BackendClient, HttpBackendClient};
pub use config::Config;
pub use error::{AppError, AppResult, ExtractError, PreviewError};
pub use models::{ExtractedFields, ExtractionResponse, FileHandle, ItemId, UploadItem, UploadStatus};
pub use orchestrator::{BatchError, BatchSummary, Resolution, SessionToken, UploadOrchestrator};
pub use services::{DataUrlPreviewGenerator, PreviewGenerator};

//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_session` - 批次状态
//! - 持有按选择顺序排列的条目
//! - 会话令牌、批次级错误、未返回的预览数
//! - `is_processing` 由条目状态推导
//!
//! ### `upload_orchestrator` - 批量上传编排器
//! - 选择文件 / 提交批次 / 重置批次
//! - 用 Semaphore 控制并发数量
//! - 按令牌丢弃过期结果
//!
//! ## 层次关系
//!
//! ```text
//! app (CLI：读取文件、输出报告)
//!     ↓
//! upload_orchestrator (处理 Vec<UploadItem>)
//!     ↓
//! clients::BackendClient / services::PreviewGenerator (处理单个文件)
//! ```

pub mod batch_session;
pub mod upload_orchestrator;

pub use batch_session::{BatchError, BatchSession, BatchSummary, SessionToken};
pub use upload_orchestrator::{
    BatchEvent, Resolution, UploadOrchestrator, DEFAULT_FAILURE_MESSAGE, NO_DATA_MESSAGE,
};

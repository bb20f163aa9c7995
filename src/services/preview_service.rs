//! 预览生成服务 - 业务能力层
//!
//! 只负责"把文件变成可展示的预览"，与上传状态无关

use std::future::Future;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::debug;

use crate::config::Config;
use crate::error::PreviewError;
use crate::models::{FileHandle, PreviewUrl};

/// 预览生成能力
///
/// 实现不得阻塞调用方，并且对任意状态的条目调用一次都是安全的。
pub trait PreviewGenerator: Send + Sync + 'static {
    fn generate_preview(
        &self,
        file: FileHandle,
    ) -> impl Future<Output = Result<PreviewUrl, PreviewError>> + Send;
}

/// 生成 `data:<mime>;base64,...` 形式的预览
pub struct DataUrlPreviewGenerator {
    max_bytes: usize,
}

impl DataUrlPreviewGenerator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_preview_bytes)
    }
}

impl Default for DataUrlPreviewGenerator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PreviewGenerator for DataUrlPreviewGenerator {
    async fn generate_preview(&self, file: FileHandle) -> Result<PreviewUrl, PreviewError> {
        if file.is_empty() {
            return Err(PreviewError::Empty {
                name: file.name().to_string(),
            });
        }
        if file.len() > self.max_bytes {
            return Err(PreviewError::TooLarge {
                name: file.name().to_string(),
                size: file.len(),
                max: self.max_bytes,
            });
        }

        // base64 编码放到阻塞线程池，避免大图占用调度线程
        let url = tokio::task::spawn_blocking(move || encode_data_url(&file))
            .await
            .map_err(|e| PreviewError::Task(e.to_string()))?;

        debug!("预览生成完成，长度 {} 字符", url.len());
        Ok(PreviewUrl(url))
    }
}

fn encode_data_url(file: &FileHandle) -> String {
    format!(
        "data:{};base64,{}",
        file.mime_type(),
        BASE64.encode(file.content())
    )
}

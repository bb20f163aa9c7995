//! 文件句柄
//!
//! 选中文件的原始字节，创建后不可变，克隆只增加引用计数

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::fs;

use crate::error::FileError;
use crate::models::mime;

/// 待上传文件的只读句柄
#[derive(Clone)]
pub struct FileHandle {
    name: Arc<str>,
    content: Arc<[u8]>,
}

impl FileHandle {
    /// 从内存数据创建
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let name: String = name.into();
        let content: Vec<u8> = content.into();
        Self {
            name: Arc::from(name),
            content: Arc::from(content),
        }
    }

    /// 从磁盘读取文件
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FileError::InvalidName {
                path: display.clone(),
            })?
            .to_string();

        let content = fs::read(path)
            .await
            .map_err(|e| FileError::from_io(display, e))?;

        Ok(Self::new(name, content))
    }

    /// 文件名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 文件内容
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// 文件大小（字节）
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// 上传时使用的 MIME 类型
    pub fn mime_type(&self) -> &'static str {
        mime::mime_for(&self.name)
    }

    /// 是否为支持的证件图片/文档类型
    pub fn is_supported(&self) -> bool {
        mime::is_supported(&self.name)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

use thiserror::Error;

use crate::models::UploadStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 后端提取错误
    #[error("后端错误: {0}")]
    Extract(#[from] ExtractError),
    /// 预览生成错误
    #[error("预览错误: {0}")]
    Preview(#[from] PreviewError),
    /// 状态机错误
    #[error("状态错误: {0}")]
    Transition(#[from] InvalidTransition),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("无法解析配置文件 {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 路径没有文件名
    #[error("无效的文件名: {path}")]
    InvalidName { path: String },
}

/// 后端提取错误
///
/// 只有 `Rejected` 携带后端返回的 detail，其余情况一律使用默认提示。
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// 后端返回了非 2xx 响应
    #[error("后端拒绝请求 (HTTP {status}): {}", .detail.as_deref().unwrap_or("无详细信息"))]
    Rejected { status: u16, detail: Option<String> },
    /// 网络请求失败（连接失败、超时等）
    #[error("网络请求失败: {0}")]
    Transport(String),
    /// 响应体解析失败
    #[error("响应解析失败: {0}")]
    Decode(String),
    /// 请求构建失败
    #[error("请求构建失败: {0}")]
    InvalidRequest(String),
}

impl ExtractError {
    /// 后端提供的错误详情
    pub fn detail(&self) -> Option<&str> {
        match self {
            ExtractError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// 预览生成错误
#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    /// 文件为空
    #[error("文件为空，无法生成预览: {name}")]
    Empty { name: String },
    /// 文件超过预览大小上限
    #[error("文件过大，无法生成预览: {name} ({size} 字节 > {max} 字节)")]
    TooLarge { name: String, size: usize, max: usize },
    /// 编码任务异常退出
    #[error("预览任务失败: {0}")]
    Task(String),
}

/// 非法的状态转换
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("非法状态转换: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: UploadStatus,
    pub to: UploadStatus,
}

// ========== 便捷构造函数 ==========

impl FileError {
    /// 根据 io 错误类型构造文件错误
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FileError::NotFound { path }
        } else {
            FileError::ReadFailed { path, source }
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExtractError::Decode(err.to_string())
        } else if err.is_builder() {
            ExtractError::InvalidRequest(err.to_string())
        } else {
            ExtractError::Transport(err.to_string())
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

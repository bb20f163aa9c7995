use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 提取后端地址
    pub backend_base_url: String,
    /// 提取接口路径
    pub extract_path: String,
    /// multipart 中文件字段名
    pub upload_field: String,
    /// 同时进行的上传数量
    pub max_concurrent_uploads: usize,
    /// 单个请求超时（秒）
    pub request_timeout_secs: u64,
    /// 生成预览的文件大小上限（字节）
    pub max_preview_bytes: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8082".to_string(),
            extract_path: "/extract".to_string(),
            upload_field: "file".to_string(),
            max_concurrent_uploads: 4,
            request_timeout_secs: 60,
            max_preview_bytes: 10 * 1024 * 1024,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    ///
    /// 环境变量格式错误会直接报错，不会悄悄退回默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// 加载配置：TOML 文件（可选）+ 环境变量覆盖，最后校验
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let mut config = Self::from_toml_file(path)?;
                config.apply_env()?;
                config
            }
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取，缺失的键使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("BACKEND_BASE_URL") {
            self.backend_base_url = v;
        }
        if let Ok(v) = std::env::var("EXTRACT_PATH") {
            self.extract_path = v;
        }
        if let Ok(v) = std::env::var("UPLOAD_FIELD") {
            self.upload_field = v;
        }
        if let Some(v) = parse_env("MAX_CONCURRENT_UPLOADS", "usize")? {
            self.max_concurrent_uploads = v;
        }
        if let Some(v) = parse_env("REQUEST_TIMEOUT_SECS", "u64")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_env("MAX_PREVIEW_BYTES", "usize")? {
            self.max_preview_bytes = v;
        }
        if let Some(v) = parse_env("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        Ok(())
    }

    /// 校验配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_uploads",
                reason: "必须大于 0".to_string(),
            });
        }
        if self.backend_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backend_base_url",
                reason: "不能为空".to_string(),
            });
        }
        if self.upload_field.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "upload_field",
                reason: "不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 拼接后端接口地址
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.backend_base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

fn parse_env<T: FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

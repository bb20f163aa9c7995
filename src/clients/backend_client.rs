//! 提取后端客户端
//!
//! 封装所有与提取后端相关的 HTTP 调用逻辑

use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ExtractError;
use crate::models::{ExtractedFields, ExtractionRecord, ExtractionResponse, FileHandle};

/// 提取后端能力
///
/// 每次调用只处理一个文件；调用之间相互独立、无序。
pub trait BackendClient: Send + Sync + 'static {
    /// 提交单个文件进行提取
    fn extract(
        &self,
        file: FileHandle,
    ) -> impl Future<Output = Result<ExtractionResponse, ExtractError>> + Send;

    /// 检查后端是否可用
    fn health(&self) -> impl Future<Output = Result<(), ExtractError>> + Send {
        async { Ok(()) }
    }
}

/// 成功响应体
///
/// 优先使用 `results`；后端单文件接口返回的 `extracted_data` 视为一条记录。
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    results: Option<Vec<ExtractionRecord>>,
    #[serde(default)]
    extracted_data: Option<ExtractedFields>,
}

impl From<WireResponse> for ExtractionResponse {
    fn from(wire: WireResponse) -> Self {
        match (wire.results, wire.extracted_data) {
            (Some(results), _) => ExtractionResponse::new(results),
            (None, Some(data)) => ExtractionResponse::single(data),
            (None, None) => ExtractionResponse::default(),
        }
    }
}

/// 基于 reqwest 的提取后端客户端
pub struct HttpBackendClient {
    client: Client,
    extract_url: String,
    health_url: String,
    upload_field: String,
}

impl HttpBackendClient {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExtractError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            extract_url: config.endpoint(&config.extract_path),
            health_url: config.endpoint("/health"),
            upload_field: config.upload_field.clone(),
        })
    }

    pub fn extract_url(&self) -> &str {
        &self.extract_url
    }

    /// 一次请求提交多个文件（批量接口形态，编排器不使用）
    ///
    /// 所有文件放在名为 `files` 的表单字段中。
    pub async fn extract_many(
        &self,
        files: &[FileHandle],
    ) -> Result<ExtractionResponse, ExtractError> {
        let mut form = Form::new();
        for file in files {
            form = form.part("files", Self::file_part(file)?);
        }

        debug!("批量提交 {} 个文件到 {}", files.len(), self.extract_url);
        let response = self
            .client
            .post(&self.extract_url)
            .multipart(form)
            .send()
            .await?;

        Self::read_response(response).await
    }

    fn file_part(file: &FileHandle) -> Result<Part, ExtractError> {
        Part::bytes(file.content().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())
            .map_err(|e| ExtractError::InvalidRequest(e.to_string()))
    }

    /// 把 HTTP 响应映射为成功结果或带 detail 的失败
    async fn read_response(response: Response) -> Result<ExtractionResponse, ExtractError> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            let wire: WireResponse = serde_json::from_slice(&body)
                .map_err(|e| ExtractError::Decode(e.to_string()))?;
            return Ok(wire.into());
        }

        // 失败响应：尽量取出字符串形式的 detail
        let body = response.bytes().await.unwrap_or_default();
        let detail = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string));

        warn!("后端返回错误状态 {}: {:?}", status.as_u16(), detail);

        Err(ExtractError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

impl BackendClient for HttpBackendClient {
    async fn extract(&self, file: FileHandle) -> Result<ExtractionResponse, ExtractError> {
        let form = Form::new().part(self.upload_field.clone(), Self::file_part(&file)?);

        debug!(
            "提交文件 {} ({} 字节, {}) 到 {}",
            file.name(),
            file.len(),
            file.mime_type(),
            self.extract_url
        );

        let response = self
            .client
            .post(&self.extract_url)
            .multipart(form)
            .send()
            .await?;

        Self::read_response(response).await
    }

    async fn health(&self) -> Result<(), ExtractError> {
        let response = self.client.get(&self.health_url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ExtractError::Rejected {
                status: status.as_u16(),
                detail: None,
            })
        }
    }
}

//! 命令行应用
//!
//! 读取文件 → 选择 → 提交 → 等待全部结束 → 输出统计与报告

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::fs;
use tracing::{info, warn};

use crate::clients::{BackendClient, HttpBackendClient};
use crate::config::Config;
use crate::models::{mime, FileHandle, ItemReport, UploadStatus};
use crate::orchestrator::{BatchSummary, UploadOrchestrator};
use crate::services::{DataUrlPreviewGenerator, PreviewGenerator};
use crate::utils::logging;

/// 单次运行的选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 文件或目录（目录只取一层中受支持的文件）
    pub paths: Vec<PathBuf>,
    /// 提交前检查后端是否可用
    pub check_backend: bool,
}

/// 运行结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: BatchSummary,
    pub reports: Vec<ItemReport>,
}

impl RunOutcome {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

/// 应用主结构
pub struct App<B = HttpBackendClient, P = DataUrlPreviewGenerator> {
    config: Config,
    options: RunOptions,
    orchestrator: UploadOrchestrator<B, P>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config, options: RunOptions) -> Result<Self> {
        let orchestrator =
            UploadOrchestrator::from_config(&config).context("无法创建提取后端客户端")?;
        Ok(Self::with_orchestrator(config, options, orchestrator))
    }
}

impl<B, P> App<B, P>
where
    B: BackendClient,
    P: PreviewGenerator,
{
    pub fn with_orchestrator(
        config: Config,
        options: RunOptions,
        orchestrator: UploadOrchestrator<B, P>,
    ) -> Self {
        Self {
            config,
            options,
            orchestrator,
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let started = Instant::now();
        logging::log_startup(
            &self.config.endpoint(&self.config.extract_path),
            self.orchestrator.max_concurrent(),
        );

        let files = load_files(&self.options.paths).await?;
        if files.is_empty() {
            warn!("⚠️ 没有找到可上传的文件，程序结束");
            let outcome = self.outcome();
            logging::print_final_stats(&outcome.summary, started.elapsed());
            return Ok(outcome);
        }

        if self.options.check_backend && !self.orchestrator.check_backend().await {
            let reason = self
                .orchestrator
                .batch_error()
                .map(|e| e.to_string())
                .unwrap_or_default();
            anyhow::bail!("{}", reason);
        }

        self.orchestrator.select_files(files);
        self.orchestrator.settle().await;

        self.orchestrator.submit_batch();
        self.orchestrator.settle().await;

        let outcome = self.outcome();
        logging::print_final_stats(&outcome.summary, started.elapsed());
        Ok(outcome)
    }

    fn outcome(&self) -> RunOutcome {
        RunOutcome {
            summary: self.orchestrator.summary(),
            reports: self.orchestrator.reports(),
        }
    }

    pub fn orchestrator(&self) -> &UploadOrchestrator<B, P> {
        &self.orchestrator
    }
}

/// 展开路径并读取所有文件
///
/// 单个文件读取失败只记录警告，不中断其他文件。
pub async fn load_files(paths: &[PathBuf]) -> Result<Vec<FileHandle>> {
    info!("\n📁 正在扫描待上传的文件...");

    let mut expanded = Vec::new();
    for path in paths {
        if fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
            expanded.extend(scan_dir(path).await?);
        } else {
            expanded.push(path.clone());
        }
    }

    let loaded = join_all(expanded.iter().map(FileHandle::open)).await;

    let mut files = Vec::with_capacity(loaded.len());
    for (path, result) in expanded.iter().zip(loaded) {
        match result {
            Ok(file) => {
                if !file.is_supported() {
                    warn!(
                        "文件类型可能不受支持: {} ({})",
                        file.name(),
                        file.mime_type()
                    );
                }
                files.push(file);
            }
            Err(e) => warn!("加载文件失败 {}: {}", path.display(), e),
        }
    }

    info!("✓ 找到 {} 个待上传的文件", files.len());
    Ok(files)
}

/// 读取目录下一层中受支持的文件，按文件名排序
async fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("无法读取文件夹: {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let supported = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(mime::is_supported)
            .unwrap_or(false);
        if supported && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// 以人类可读的形式输出报告
pub fn format_reports(reports: &[ItemReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let line = match report.status {
            UploadStatus::Completed => {
                let name = report
                    .data
                    .as_ref()
                    .and_then(|d| d.name.as_deref())
                    .unwrap_or("-");
                let number = report
                    .data
                    .as_ref()
                    .and_then(|d| d.cnic_number.as_deref())
                    .unwrap_or("-");
                format!("✅ {}  姓名: {}  证件号: {}", report.file_name, name, number)
            }
            UploadStatus::Error => format!(
                "❌ {}  {}",
                report.file_name,
                report.error.as_deref().unwrap_or_default()
            ),
            status => format!("⏸️ {}  {}", report.file_name, status),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

//! 批量上传编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **选择文件**：为每个文件创建 pending 条目，并为每个条目请求预览
//! 2. **提交批次**：把 pending/error 条目置为 uploading，每个条目一个独立请求
//! 3. **结果回写**：按 (会话令牌, 条目 ID) 把乱序到达的结果写回对应条目
//! 4. **重置**：清空批次；已派发的请求不取消，其结果到达后作为过期结果丢弃
//!
//! ## 并发模型
//!
//! - 只有编排器持有并修改 `BatchSession`，所有修改都在 `&mut self` 方法里完成
//! - 派发出去的任务不接触会话，只通过 channel 回传带令牌的 `BatchEvent`
//! - 使用 Semaphore 限制同时进行的请求数量
//! - `is_processing` 每次读取时由条目状态计算

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::clients::{BackendClient, HttpBackendClient};
use crate::config::Config;
use crate::error::{AppResult, ExtractError, PreviewError};
use crate::models::{
    ExtractionResponse, FileHandle, ItemId, ItemReport, PreviewUrl, UploadItem, UploadStatus,
};
use crate::orchestrator::batch_session::{BatchError, BatchSession, BatchSummary, SessionToken};
use crate::services::{DataUrlPreviewGenerator, PreviewGenerator};
use crate::utils::logging::{self, truncate_text};

/// 后端成功但没有任何记录时的错误信息
pub const NO_DATA_MESSAGE: &str = "No data returned";

/// 后端没有提供 detail 时的默认错误信息
pub const DEFAULT_FAILURE_MESSAGE: &str = "Extraction failed. Please try again.";

/// 派发任务回传给编排器的事件，均携带派发时的会话令牌
#[derive(Debug)]
pub enum BatchEvent {
    Preview {
        token: SessionToken,
        item_id: ItemId,
        result: Result<PreviewUrl, PreviewError>,
    },
    Extraction {
        token: SessionToken,
        item_id: ItemId,
        outcome: Result<ExtractionResponse, ExtractError>,
    },
}

/// 单个事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 已写回当前会话中的条目
    Applied { item_id: ItemId },
    /// 过期或无主的结果，已丢弃
    Stale { item_id: ItemId },
}

impl Resolution {
    pub fn item_id(&self) -> ItemId {
        match self {
            Resolution::Applied { item_id } | Resolution::Stale { item_id } => *item_id,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Resolution::Applied { .. })
    }
}

/// 批量上传编排器
pub struct UploadOrchestrator<B, P> {
    backend: Arc<B>,
    previewer: Arc<P>,
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
    session: BatchSession,
    next_token: u64,
    next_item_id: u64,
    /// 已派发但事件尚未被处理的任务数（包含已放弃的会话）
    outstanding: usize,
    events_tx: mpsc::UnboundedSender<BatchEvent>,
    events_rx: mpsc::UnboundedReceiver<BatchEvent>,
}

impl UploadOrchestrator<HttpBackendClient, DataUrlPreviewGenerator> {
    /// 按配置创建 HTTP 后端 + data URL 预览的编排器
    pub fn from_config(config: &Config) -> AppResult<Self> {
        config.validate()?;
        let backend = HttpBackendClient::new(config)?;
        let previewer = DataUrlPreviewGenerator::from_config(config);
        Ok(Self::new(backend, previewer, config.max_concurrent_uploads))
    }
}

impl<B, P> UploadOrchestrator<B, P>
where
    B: BackendClient,
    P: PreviewGenerator,
{
    /// 创建编排器
    ///
    /// `max_concurrent` 为 0 时按 1 处理。
    pub fn new(backend: B, previewer: P, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend: Arc::new(backend),
            previewer: Arc::new(previewer),
            limiter: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            session: BatchSession::empty(SessionToken(0)),
            next_token: 1,
            next_item_id: 1,
            outstanding: 0,
            events_tx,
            events_rx,
        }
    }

    // ========== 操作 ==========

    /// 选择文件，替换当前批次
    ///
    /// 空输入不做任何修改。必须在 tokio 运行时中调用。
    pub fn select_files(&mut self, files: Vec<FileHandle>) -> usize {
        if files.is_empty() {
            debug!("未选择任何文件，保持当前批次不变");
            return 0;
        }

        let token = self.issue_token();
        let items: Vec<UploadItem> = files
            .into_iter()
            .map(|file| UploadItem::new(self.issue_item_id(), file))
            .collect();
        let count = items.len();

        let previous = std::mem::replace(&mut self.session, BatchSession::with_items(token, items));
        let abandoned = previous.summary().uploading;
        if abandoned > 0 {
            info!(
                "[{}] 替换批次 {}，放弃 {} 个进行中的请求",
                token,
                previous.token(),
                abandoned
            );
        }

        let targets: Vec<(ItemId, FileHandle)> = self
            .session
            .items()
            .iter()
            .map(|item| (item.id(), item.file().clone()))
            .collect();
        for (item_id, file) in targets {
            self.spawn_preview(token, item_id, file);
        }

        info!("📁 [{}] 已选择 {} 个文件", token, count);
        count
    }

    /// 提交所有 pending/error 条目，返回本次派发数量
    ///
    /// 没有可提交条目时不做任何修改。
    pub fn submit_batch(&mut self) -> usize {
        let token = self.session.token();

        let mut dispatch = Vec::new();
        for item in self.session.items_mut() {
            if !item.status().is_retryable() {
                continue;
            }
            match item.begin_upload() {
                Ok(()) => dispatch.push((item.id(), item.file().clone())),
                Err(e) => warn!("[{}] 条目 {} 无法开始上传: {}", token, item.id(), e),
            }
        }

        if dispatch.is_empty() {
            debug!("[{}] 没有待提交的条目", token);
            return 0;
        }

        self.session.clear_batch_error();
        logging::log_batch_submitted(token, dispatch.len(), self.max_concurrent);

        let count = dispatch.len();
        for (item_id, file) in dispatch {
            self.spawn_extraction(token, item_id, file);
        }
        count
    }

    /// 清空批次
    ///
    /// 已派发的请求不会被取消，它们的结果到达后会被丢弃。
    pub fn reset_batch(&mut self) {
        let abandoned = self.session.summary().uploading;
        let token = self.issue_token();
        self.session = BatchSession::empty(token);

        if abandoned > 0 {
            info!(
                "🧹 [{}] 批次已重置，{} 个进行中的请求将被忽略",
                token, abandoned
            );
        } else {
            info!("🧹 [{}] 批次已重置", token);
        }
    }

    /// 检查后端可用性，失败时记录批次级错误
    pub async fn check_backend(&mut self) -> bool {
        match self.backend.health().await {
            Ok(()) => {
                if matches!(
                    self.session.batch_error(),
                    Some(BatchError::BackendUnavailable(_))
                ) {
                    self.session.clear_batch_error();
                }
                debug!("后端健康检查通过");
                true
            }
            Err(e) => {
                let message = e.detail().map(str::to_string).unwrap_or_else(|| e.to_string());
                warn!("⚠️ 后端健康检查失败: {}", message);
                self.session
                    .set_batch_error(BatchError::BackendUnavailable(message));
                false
            }
        }
    }

    // ========== 事件处理 ==========

    /// 等待并处理下一个事件
    ///
    /// 没有任何未完成的任务时返回 None。
    pub async fn next_event(&mut self) -> Option<Resolution> {
        if self.outstanding == 0 {
            return None;
        }
        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    /// 处理所有已到达的事件，不等待
    pub fn drain_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            handled += 1;
        }
        handled
    }

    /// 持续处理事件，直到当前批次没有 uploading 条目且预览全部返回
    pub async fn settle(&mut self) {
        while !self.session.is_settled() {
            if self.next_event().await.is_none() {
                warn!(
                    "[{}] 没有未完成的任务，但批次仍未结束",
                    self.session.token()
                );
                break;
            }
        }
    }

    fn apply(&mut self, event: BatchEvent) -> Resolution {
        self.outstanding = self.outstanding.saturating_sub(1);
        match event {
            BatchEvent::Preview {
                token,
                item_id,
                result,
            } => self.apply_preview(token, item_id, result),
            BatchEvent::Extraction {
                token,
                item_id,
                outcome,
            } => self.apply_extraction(token, item_id, outcome),
        }
    }

    fn apply_preview(
        &mut self,
        token: SessionToken,
        item_id: ItemId,
        result: Result<PreviewUrl, PreviewError>,
    ) -> Resolution {
        if token != self.session.token() {
            debug!(
                "丢弃过期预览: 条目 {} 属于 {}，当前为 {}",
                item_id,
                token,
                self.session.token()
            );
            return Resolution::Stale { item_id };
        }
        self.session.preview_resolved();

        let Some(item) = self.session.item_mut(item_id) else {
            return Resolution::Stale { item_id };
        };

        match result {
            Ok(preview) => {
                if item.attach_preview(preview) {
                    Resolution::Applied { item_id }
                } else {
                    Resolution::Stale { item_id }
                }
            }
            Err(e) => {
                debug!("[{}] 条目 {} 预览生成失败，忽略: {}", token, item_id, e);
                Resolution::Applied { item_id }
            }
        }
    }

    fn apply_extraction(
        &mut self,
        token: SessionToken,
        item_id: ItemId,
        outcome: Result<ExtractionResponse, ExtractError>,
    ) -> Resolution {
        if token != self.session.token() {
            debug!(
                "丢弃过期结果: 条目 {} 属于 {}，当前为 {}",
                item_id,
                token,
                self.session.token()
            );
            return Resolution::Stale { item_id };
        }

        let Some(item) = self.session.item_mut(item_id) else {
            debug!("[{}] 条目 {} 已不存在，丢弃结果", token, item_id);
            return Resolution::Stale { item_id };
        };

        if item.status() != UploadStatus::Uploading {
            warn!(
                "[{}] 条目 {} 当前状态为 {}，丢弃结果",
                token,
                item_id,
                item.status()
            );
            return Resolution::Stale { item_id };
        }

        let transition = match outcome {
            Ok(response) => match response.into_first_record() {
                Some(data) => {
                    info!("[{}] ✓ {} 提取成功", token, item.file().name());
                    item.complete(data)
                }
                None => {
                    warn!("[{}] ⚠️ {} 后端未返回数据", token, item.file().name());
                    item.fail(NO_DATA_MESSAGE)
                }
            },
            Err(e) => {
                let message = e.detail().unwrap_or(DEFAULT_FAILURE_MESSAGE).to_string();
                warn!(
                    "[{}] ❌ {} 提取失败: {}",
                    token,
                    item.file().name(),
                    truncate_text(&e.to_string(), 200)
                );
                item.fail(message)
            }
        };

        if let Err(e) = transition {
            warn!("[{}] 条目 {} 状态回写失败: {}", token, item_id, e);
            return Resolution::Stale { item_id };
        }

        if !self.session.is_processing() {
            logging::log_batch_finished(token, &self.session.summary());
        }
        Resolution::Applied { item_id }
    }

    // ========== 任务派发 ==========

    fn spawn_preview(&mut self, token: SessionToken, item_id: ItemId, file: FileHandle) {
        let previewer = Arc::clone(&self.previewer);
        let events_tx = self.events_tx.clone();
        self.session.preview_requested();
        self.outstanding += 1;

        tokio::spawn(async move {
            let result = tokio::spawn(async move { previewer.generate_preview(file).await })
                .await
                .unwrap_or_else(|e| Err(PreviewError::Task(e.to_string())));

            if events_tx
                .send(BatchEvent::Preview {
                    token,
                    item_id,
                    result,
                })
                .is_err()
            {
                debug!("编排器已释放，丢弃预览 {}", item_id);
            }
        });
    }

    fn spawn_extraction(&mut self, token: SessionToken, item_id: ItemId, file: FileHandle) {
        let backend = Arc::clone(&self.backend);
        let limiter = Arc::clone(&self.limiter);
        let events_tx = self.events_tx.clone();
        self.outstanding += 1;

        tokio::spawn(async move {
            // 超出并发上限的条目在这里排队，状态仍为 uploading
            let outcome = match limiter.acquire_owned().await {
                Ok(_permit) => tokio::spawn(async move { backend.extract(file).await })
                    .await
                    .unwrap_or_else(|e| {
                        Err(ExtractError::Transport(format!("任务执行失败: {}", e)))
                    }),
                Err(e) => Err(ExtractError::Transport(format!("并发限制器已关闭: {}", e))),
            };

            if events_tx
                .send(BatchEvent::Extraction {
                    token,
                    item_id,
                    outcome,
                })
                .is_err()
            {
                debug!("编排器已释放，丢弃结果 {}", item_id);
            }
        });
    }

    fn issue_token(&mut self) -> SessionToken {
        let token = SessionToken(self.next_token);
        self.next_token += 1;
        token
    }

    fn issue_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    // ========== 只读访问 ==========

    /// 当前批次的条目（按选择顺序）
    pub fn items(&self) -> &[UploadItem] {
        self.session.items()
    }

    pub fn item(&self, id: ItemId) -> Option<&UploadItem> {
        self.session.item(id)
    }

    /// 是否还有条目在上传中
    pub fn is_processing(&self) -> bool {
        self.session.is_processing()
    }

    pub fn batch_error(&self) -> Option<&BatchError> {
        self.session.batch_error()
    }

    pub fn session_token(&self) -> SessionToken {
        self.session.token()
    }

    pub fn summary(&self) -> BatchSummary {
        self.session.summary()
    }

    /// 提供给结果展示方的只读报告
    pub fn reports(&self) -> Vec<ItemReport> {
        self.session.items().iter().map(UploadItem::to_report).collect()
    }

    /// 尚未回传事件的任务数（包含已放弃批次的请求）
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::ExtractedFields;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Outcome = Result<ExtractionResponse, ExtractError>;

    /// 每次 extract 调用都挂起，直到测试按文件名给出结果
    #[derive(Clone, Default)]
    struct ScriptedBackend {
        parked: Arc<Mutex<Vec<(String, oneshot::Sender<Outcome>)>>>,
        calls: Arc<AtomicUsize>,
        unhealthy: Arc<AtomicBool>,
    }

    impl ScriptedBackend {
        fn parked(&self) -> usize {
            self.parked.lock().unwrap().len()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn wait_for_parked(&self, n: usize) {
            for _ in 0..1000 {
                if self.parked() >= n {
                    return;
                }
                tokio::task::yield_now().await;
            }
            panic!("等待 {} 个请求超时，当前 {}", n, self.parked());
        }

        fn resolve(&self, name: &str, outcome: Outcome) {
            let mut parked = self.parked.lock().unwrap();
            let pos = parked
                .iter()
                .position(|(n, _)| n == name)
                .unwrap_or_else(|| panic!("没有 {} 的请求", name));
            let (_, tx) = parked.remove(pos);
            tx.send(outcome).ok();
        }
    }

    impl BackendClient for ScriptedBackend {
        async fn extract(&self, file: FileHandle) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            self.parked
                .lock()
                .unwrap()
                .push((file.name().to_string(), tx));
            rx.await
                .unwrap_or_else(|_| Err(ExtractError::Transport("dropped".into())))
        }

        async fn health(&self) -> Result<(), ExtractError> {
            if self.unhealthy.load(Ordering::SeqCst) {
                Err(ExtractError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    /// 文件名以 broken 开头时预览失败
    struct FakePreview;

    impl PreviewGenerator for FakePreview {
        async fn generate_preview(&self, file: FileHandle) -> Result<PreviewUrl, PreviewError> {
            if file.name().starts_with("broken") {
                Err(PreviewError::Empty {
                    name: file.name().to_string(),
                })
            } else {
                Ok(PreviewUrl(format!("preview:{}", file.name())))
            }
        }
    }

    fn orchestrator(max: usize) -> (UploadOrchestrator<ScriptedBackend, FakePreview>, ScriptedBackend) {
        let backend = ScriptedBackend::default();
        (UploadOrchestrator::new(backend.clone(), FakePreview, max), backend)
    }

    fn files(names: &[&str]) -> Vec<FileHandle> {
        names
            .iter()
            .map(|n| FileHandle::new(*n, n.as_bytes().to_vec()))
            .collect()
    }

    fn record(name: &str) -> Outcome {
        Ok(ExtractionResponse::single(ExtractedFields {
            name: Some(name.to_string()),
            ..Default::default()
        }))
    }

    fn rejected(detail: &str) -> Outcome {
        Err(ExtractError::Rejected {
            status: 400,
            detail: Some(detail.to_string()),
        })
    }

    fn statuses<B: BackendClient, P: PreviewGenerator>(
        orch: &UploadOrchestrator<B, P>,
    ) -> Vec<UploadStatus> {
        orch.items().iter().map(|i| i.status()).collect()
    }

    fn id_of<B: BackendClient, P: PreviewGenerator>(
        orch: &UploadOrchestrator<B, P>,
        name: &str,
    ) -> ItemId {
        orch.items()
            .iter()
            .find(|i| i.file().name() == name)
            .map(|i| i.id())
            .unwrap()
    }

    /// 处理事件直到指定条目被写回
    async fn pump_until_applied<B: BackendClient, P: PreviewGenerator>(
        orch: &mut UploadOrchestrator<B, P>,
        target: ItemId,
    ) {
        while let Some(resolution) = orch.next_event().await {
            if resolution == (Resolution::Applied { item_id: target })
                && orch.item(target).map(|i| i.status()) != Some(UploadStatus::Uploading)
            {
                return;
            }
        }
        panic!("条目 {} 没有收到结果", target);
    }

    #[test]
    fn test_from_config_validates_first() {
        let config = Config {
            max_concurrent_uploads: 0,
            ..Config::default()
        };
        let result = UploadOrchestrator::from_config(&config);
        assert!(matches!(result, Err(AppError::Config(_))));

        let orch = UploadOrchestrator::from_config(&Config::default()).unwrap();
        assert_eq!(orch.max_concurrent(), 4);
        assert_eq!(orch.backend().extract_url(), "http://localhost:8082/extract");
    }

    #[tokio::test]
    async fn test_select_then_submit_mixed_outcomes() {
        let (mut orch, backend) = orchestrator(4);

        assert_eq!(orch.select_files(files(&["a.png", "b.png"])), 2);
        assert_eq!(statuses(&orch), vec![UploadStatus::Pending; 2]);
        orch.settle().await;
        assert_eq!(
            orch.items()[0].preview_url().map(PreviewUrl::as_str),
            Some("preview:a.png")
        );
        assert_eq!(
            orch.items()[1].preview_url().map(PreviewUrl::as_str),
            Some("preview:b.png")
        );
        assert_eq!(statuses(&orch), vec![UploadStatus::Pending; 2]);

        assert_eq!(orch.submit_batch(), 2);
        assert_eq!(statuses(&orch), vec![UploadStatus::Uploading; 2]);
        assert!(orch.is_processing());

        backend.wait_for_parked(2).await;
        let a = id_of(&orch, "a.png");
        let b = id_of(&orch, "b.png");

        backend.resolve("a.png", record("Ali"));
        pump_until_applied(&mut orch, a).await;
        assert_eq!(orch.item(a).unwrap().status(), UploadStatus::Completed);
        assert_eq!(
            orch.item(a).unwrap().data().unwrap().name.as_deref(),
            Some("Ali")
        );
        assert_eq!(orch.item(b).unwrap().status(), UploadStatus::Uploading);
        assert!(orch.is_processing());

        backend.resolve("b.png", rejected("Invalid file"));
        pump_until_applied(&mut orch, b).await;
        assert_eq!(orch.item(b).unwrap().status(), UploadStatus::Error);
        assert_eq!(orch.item(b).unwrap().error(), Some("Invalid file"));
        assert!(!orch.is_processing());
        assert!(orch.batch_error().is_none());
    }

    #[tokio::test]
    async fn test_empty_selection_and_empty_submit_are_noops() {
        let (mut orch, backend) = orchestrator(4);
        let token = orch.session_token();

        assert_eq!(orch.select_files(Vec::new()), 0);
        assert_eq!(orch.submit_batch(), 0);
        assert!(orch.items().is_empty());
        assert!(!orch.is_processing());
        assert_eq!(orch.session_token(), token);
        assert_eq!(orch.outstanding(), 0);
        assert!(orch.next_event().await.is_none());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_selection_keeps_current_batch() {
        let (mut orch, _backend) = orchestrator(4);
        orch.select_files(files(&["a.png"]));
        let token = orch.session_token();

        orch.select_files(Vec::new());
        assert_eq!(orch.session_token(), token);
        assert_eq!(orch.items().len(), 1);
    }

    #[tokio::test]
    async fn test_error_item_is_retried_to_completion() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["a.png"]));
        let a = id_of(&orch, "a.png");

        orch.submit_batch();
        backend.wait_for_parked(1).await;
        backend.resolve("a.png", Ok(ExtractionResponse::default()));
        pump_until_applied(&mut orch, a).await;
        assert_eq!(orch.item(a).unwrap().status(), UploadStatus::Error);
        assert_eq!(orch.item(a).unwrap().error(), Some(NO_DATA_MESSAGE));

        assert_eq!(orch.submit_batch(), 1);
        assert_eq!(orch.item(a).unwrap().status(), UploadStatus::Uploading);
        assert!(orch.item(a).unwrap().error().is_none());

        backend.wait_for_parked(1).await;
        backend.resolve("a.png", record("Sara"));
        pump_until_applied(&mut orch, a).await;
        assert_eq!(orch.item(a).unwrap().status(), UploadStatus::Completed);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_completed_items_are_never_resubmitted() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["ok.png", "bad.png"]));
        orch.submit_batch();
        backend.wait_for_parked(2).await;
        backend.resolve("ok.png", record("Ali"));
        backend.resolve("bad.png", Err(ExtractError::Transport("timeout".into())));
        orch.settle().await;

        let bad = id_of(&orch, "bad.png");
        assert_eq!(orch.item(bad).unwrap().error(), Some(DEFAULT_FAILURE_MESSAGE));

        assert_eq!(orch.submit_batch(), 1);
        backend.wait_for_parked(1).await;
        assert_eq!(backend.calls(), 3);
        assert_eq!(
            statuses(&orch),
            vec![UploadStatus::Completed, UploadStatus::Uploading]
        );
    }

    #[tokio::test]
    async fn test_submit_with_nothing_retryable_changes_nothing() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["a.png"]));
        orch.submit_batch();
        backend.wait_for_parked(1).await;
        backend.resolve("a.png", record("Ali"));
        orch.settle().await;

        backend.unhealthy.store(true, Ordering::SeqCst);
        assert!(!orch.check_backend().await);
        let before = orch.reports();

        assert_eq!(orch.submit_batch(), 0);
        assert!(!orch.is_processing());
        assert!(orch.batch_error().is_some());
        let after = orch.reports();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].status, after[0].status);
        assert_eq!(before[0].data, after[0].data);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_completions_touch_only_their_items() {
        let (mut orch, backend) = orchestrator(8);
        let names = ["1.png", "2.png", "3.png", "4.png"];
        orch.select_files(files(&names));
        orch.settle().await;
        orch.submit_batch();
        backend.wait_for_parked(4).await;

        backend.resolve("3.png", record("three"));
        let three = id_of(&orch, "3.png");
        pump_until_applied(&mut orch, three).await;
        assert_eq!(
            statuses(&orch),
            vec![
                UploadStatus::Uploading,
                UploadStatus::Uploading,
                UploadStatus::Completed,
                UploadStatus::Uploading
            ]
        );
        assert!(orch.is_processing());

        backend.resolve("1.png", rejected("blurry"));
        let one = id_of(&orch, "1.png");
        pump_until_applied(&mut orch, one).await;
        assert_eq!(orch.summary().uploading, 2);
        assert!(orch.is_processing());

        backend.resolve("4.png", record("four"));
        backend.resolve("2.png", record("two"));
        orch.settle().await;
        assert!(!orch.is_processing());

        let data: HashMap<&str, Option<String>> = orch
            .items()
            .iter()
            .map(|i| (i.file().name(), i.data().and_then(|d| d.name.clone())))
            .collect();
        assert_eq!(data["1.png"], None);
        assert_eq!(data["2.png"].as_deref(), Some("two"));
        assert_eq!(data["3.png"].as_deref(), Some("three"));
        assert_eq!(data["4.png"].as_deref(), Some("four"));
    }

    #[tokio::test]
    async fn test_drain_ready_applies_queued_results_without_waiting() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["a.png", "b.png"]));
        orch.settle().await;
        assert_eq!(orch.drain_ready(), 0);

        orch.submit_batch();
        backend.wait_for_parked(2).await;
        assert_eq!(orch.drain_ready(), 0);
        assert_eq!(statuses(&orch), vec![UploadStatus::Uploading; 2]);

        backend.resolve("a.png", record("Ali"));
        backend.resolve("b.png", rejected("blurry"));

        let mut handled = 0;
        for _ in 0..1000 {
            handled += orch.drain_ready();
            if handled == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(handled, 2);
        assert_eq!(orch.outstanding(), 0);
        assert_eq!(
            statuses(&orch),
            vec![UploadStatus::Completed, UploadStatus::Error]
        );
        assert_eq!(orch.items()[1].error(), Some("blurry"));
        assert!(!orch.is_processing());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (mut orch, backend) = orchestrator(2);
        orch.select_files(files(&["a.png", "b.png", "c.png"]));
        assert_eq!(orch.submit_batch(), 3);
        assert_eq!(statuses(&orch), vec![UploadStatus::Uploading; 3]);

        backend.wait_for_parked(2).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.calls(), 2);

        let first = backend.parked.lock().unwrap()[0].0.clone();
        backend.resolve(&first, record("x"));
        backend.wait_for_parked(2).await;
        assert_eq!(backend.calls(), 3);

        let remaining: Vec<String> = backend
            .parked
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        for name in remaining {
            backend.resolve(&name, record("x"));
        }
        orch.settle().await;
        assert_eq!(orch.summary().completed, 3);
    }

    #[tokio::test]
    async fn test_reset_mid_flight_discards_late_results() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["a.png", "b.png", "c.png"]));
        orch.submit_batch();
        backend.wait_for_parked(3).await;

        let abandoned: Vec<ItemId> = orch.items().iter().map(|i| i.id()).collect();
        orch.reset_batch();
        assert!(orch.items().is_empty());
        assert!(!orch.is_processing());
        assert!(orch.batch_error().is_none());

        backend.resolve("a.png", record("late"));
        backend.resolve("b.png", rejected("late"));
        backend.resolve("c.png", Ok(ExtractionResponse::default()));

        let mut stale = Vec::new();
        while let Some(resolution) = orch.next_event().await {
            assert!(!resolution.is_applied());
            stale.push(resolution.item_id());
        }
        // 3 个预览 + 3 个提取结果
        assert_eq!(stale.len(), 6);
        for id in &abandoned {
            assert_eq!(stale.iter().filter(|s| *s == id).count(), 2);
        }
        assert!(orch.items().is_empty());
        assert!(!orch.is_processing());
    }

    #[tokio::test]
    async fn test_late_results_do_not_leak_into_new_batch() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["a.png"]));
        orch.submit_batch();
        backend.wait_for_parked(1).await;

        // 同名文件的新批次
        orch.select_files(files(&["a.png"]));
        orch.settle().await;
        let fresh = orch.items()[0].id();

        backend.resolve("a.png", record("old"));
        while orch.next_event().await.is_some() {}

        let item = orch.item(fresh).unwrap();
        assert_eq!(item.status(), UploadStatus::Pending);
        assert!(item.data().is_none());
        assert_eq!(item.preview_url().map(PreviewUrl::as_str), Some("preview:a.png"));
    }

    #[tokio::test]
    async fn test_reset_is_unconditional() {
        let (mut orch, _backend) = orchestrator(4);
        orch.reset_batch();
        assert!(orch.items().is_empty());
        assert!(!orch.is_processing());

        orch.select_files(files(&["a.png"]));
        let before = orch.session_token();
        orch.reset_batch();
        assert!(orch.session_token() > before);
        assert!(orch.items().is_empty());
    }

    #[tokio::test]
    async fn test_preview_failure_is_ignored() {
        let (mut orch, backend) = orchestrator(4);
        orch.select_files(files(&["broken.png", "fine.png"]));
        orch.settle().await;

        assert!(orch.items()[0].preview_url().is_none());
        assert!(orch.items()[1].preview_url().is_some());
        assert_eq!(statuses(&orch), vec![UploadStatus::Pending; 2]);

        assert_eq!(orch.submit_batch(), 2);
        backend.wait_for_parked(2).await;
        backend.resolve("broken.png", record("ok"));
        backend.resolve("fine.png", record("ok"));
        orch.settle().await;
        assert_eq!(orch.summary().completed, 2);
    }

    #[tokio::test]
    async fn test_batch_error_tracks_backend_health() {
        let (mut orch, backend) = orchestrator(4);
        backend.unhealthy.store(true, Ordering::SeqCst);

        assert!(!orch.check_backend().await);
        assert!(matches!(
            orch.batch_error(),
            Some(BatchError::BackendUnavailable(_))
        ));

        backend.unhealthy.store(false, Ordering::SeqCst);
        assert!(orch.check_backend().await);
        assert!(orch.batch_error().is_none());

        backend.unhealthy.store(true, Ordering::SeqCst);
        orch.check_backend().await;
        orch.select_files(files(&["a.png"]));
        assert!(orch.batch_error().is_none());

        backend.unhealthy.store(true, Ordering::SeqCst);
        orch.check_backend().await;
        assert_eq!(orch.submit_batch(), 1);
        assert!(orch.batch_error().is_none());

        orch.check_backend().await;
        orch.reset_batch();
        assert!(orch.batch_error().is_none());
    }

    #[tokio::test]
    async fn test_processing_flag_matches_items_at_every_step() {
        let (mut orch, backend) = orchestrator(3);
        orch.select_files(files(&["a.png", "b.png", "c.png"]));
        orch.submit_batch();
        backend.wait_for_parked(3).await;

        let check = |orch: &UploadOrchestrator<ScriptedBackend, FakePreview>| {
            let any_uploading = orch
                .items()
                .iter()
                .any(|i| i.status() == UploadStatus::Uploading);
            assert_eq!(orch.is_processing(), any_uploading);
        };

        check(&orch);
        for name in ["c.png", "a.png", "b.png"] {
            backend.resolve(name, record(name));
            let id = id_of(&orch, name);
            pump_until_applied(&mut orch, id).await;
            check(&orch);
        }
        assert!(!orch.is_processing());
    }
}

//! 基于 awc 的 HTTP 传输层
//!
//! awc 的客户端不是 `Send` 的，所有请求都跑在一个专用 Arbiter 上。
//! `Transport` 的方法只负责投递任务并立即返回句柄，结果全部以
//! [`TransportEvent`] 的形式送回管理器。

use actix::Arbiter;
use async_trait::async_trait;
use awc::http::{header, StatusCode};
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::core::error::{TransferError, TransferResult};
use crate::core::transport::{
    Challenge, ChallengeDisposition, ChallengeResponder, Checkpoint, Credential, Transport,
    TransportEvent, TransportHandle,
};
use crate::transport::retry::RetryStrategy;

const WRITE_BUFFER: usize = 1024 * 1024;

/// 断点内容，序列化为 JSON 存进 [`Checkpoint`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeData {
    pub url: String,
    pub temp_path: PathBuf,
    pub offset: u64,
    #[serde(default)]
    pub etag: Option<String>,
}

impl ResumeData {
    pub fn encode(&self) -> Option<Checkpoint> {
        serde_json::to_vec(self).ok().map(Checkpoint::from)
    }

    pub fn decode(checkpoint: &Checkpoint) -> TransferResult<Self> {
        serde_json::from_slice(checkpoint.as_bytes())
            .map_err(|e| TransferError::Resume(format!("无法解析断点: {}", e)))
    }
}

enum StopRequest {
    Abort,
    Capture(oneshot::Sender<Option<Checkpoint>>),
}

enum Plan {
    Fresh(String),
    Resume(ResumeData),
    Invalid(TransferError),
}

enum Outcome {
    Finished,
    Failed(TransferError),
    Stopped(StopRequest),
}

enum Fetched {
    Complete,
    Unauthorized(String),
}

struct Settings {
    user_agent: String,
    timeout: Duration,
    temp_dir: PathBuf,
    progress_interval: Duration,
    retry: RetryStrategy,
}

struct Shared {
    settings: Settings,
    events: UnboundedSender<TransportEvent>,
    next_handle: AtomicU64,
    // 句柄 -> 停止信号；信号被取走后条目保留到任务结束
    operations: Mutex<HashMap<TransportHandle, Option<oneshot::Sender<StopRequest>>>>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            log::debug!("传输事件接收端已关闭");
        }
    }

    fn operations(&self) -> MutexGuard<'_, HashMap<TransportHandle, Option<oneshot::Sender<StopRequest>>>> {
        self.operations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_stopper(&self, handle: TransportHandle) -> Option<oneshot::Sender<StopRequest>> {
        self.operations().get_mut(&handle).and_then(Option::take)
    }

    /// 任务结束；最后一个结束的任务负责发出 Drained
    fn retire(&self, handle: TransportHandle) {
        let drained = {
            let mut operations = self.operations();
            operations.remove(&handle);
            operations.is_empty()
        };
        if drained {
            self.emit(TransportEvent::Drained);
        }
    }
}

pub struct HttpTransport {
    shared: Arc<Shared>,
    arbiter: Arbiter,
}

impl HttpTransport {
    /// 需要在 actix System 内创建
    pub fn new(config: &Config, events: UnboundedSender<TransportEvent>) -> Self {
        let settings = Settings {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            temp_dir: config.temp_path(),
            progress_interval: config.progress_interval(),
            retry: RetryStrategy::from_config(config),
        };
        Self {
            shared: Arc::new(Shared {
                settings,
                events,
                next_handle: AtomicU64::new(0),
                operations: Mutex::new(HashMap::new()),
            }),
            arbiter: Arbiter::new(),
        }
    }

    /// 仍在进行中的操作数
    pub fn active_operations(&self) -> usize {
        self.shared.operations().len()
    }

    fn launch(&self, plan: Plan) -> TransportHandle {
        let handle = TransportHandle(self.shared.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.shared.operations().insert(handle, Some(stop_tx));

        let shared = Arc::clone(&self.shared);
        let spawned = self.arbiter.spawn_fn(move || {
            actix_rt::spawn(run(shared, handle, plan, stop_rx));
        });
        if !spawned {
            log::error!("传输线程已退出，无法启动 {}", handle);
            self.shared.emit(TransportEvent::Failed {
                handle,
                error: TransferError::Unknown("传输线程已退出".to_string()),
            });
            self.shared.retire(handle);
        }
        handle
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.arbiter.stop();
        self.shared.emit(TransportEvent::SessionInvalidated { error: None });
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn start_fresh(&self, identity: &str) -> TransportHandle {
        let handle = self.launch(Plan::Fresh(identity.to_string()));
        log::debug!("开始下载 {} -> {}", identity, handle);
        handle
    }

    fn start_from_checkpoint(&self, checkpoint: &Checkpoint) -> TransportHandle {
        let plan = match ResumeData::decode(checkpoint) {
            Ok(data) => Plan::Resume(data),
            Err(error) => Plan::Invalid(error),
        };
        self.launch(plan)
    }

    async fn cancel_and_capture(&self, handle: TransportHandle) -> Option<Checkpoint> {
        let stopper = self.shared.take_stopper(handle)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        if stopper.send(StopRequest::Capture(reply_tx)).is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    fn abort(&self, handle: TransportHandle) {
        if let Some(stopper) = self.shared.take_stopper(handle) {
            let _ = stopper.send(StopRequest::Abort);
        }
    }
}

/// 单个下载操作的磁盘状态
struct Download {
    url: String,
    temp_path: PathBuf,
    offset: u64,
    expected: u64,
    etag: Option<String>,
    accepts_ranges: bool,
}

impl Download {
    fn fresh(url: String, temp_dir: &std::path::Path) -> Self {
        Self {
            url,
            temp_path: temp_dir.join(format!("{}.part", Uuid::new_v4())),
            offset: 0,
            expected: 0,
            etag: None,
            accepts_ranges: false,
        }
    }

    /// 以磁盘上实际的长度为准；文件比断点长时截断
    fn resume(data: ResumeData) -> Self {
        let on_disk = fs::metadata(&data.temp_path).map(|m| m.len()).unwrap_or(0);
        let mut offset = data.offset.min(on_disk);
        if on_disk > offset {
            let truncated = OpenOptions::new()
                .write(true)
                .open(&data.temp_path)
                .and_then(|file| file.set_len(offset));
            if let Err(e) = truncated {
                log::warn!("无法截断临时文件 {}: {}", data.temp_path.display(), e);
                offset = 0;
            }
        }
        Self {
            url: data.url,
            temp_path: data.temp_path,
            offset,
            expected: 0,
            etag: data.etag,
            accepts_ranges: true,
        }
    }

    fn open(&self, append: bool) -> TransferResult<BufWriter<File>> {
        if let Some(parent) = self.temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = if append {
            OpenOptions::new().create(true).append(true).open(&self.temp_path)?
        } else {
            File::create(&self.temp_path)?
        };
        Ok(BufWriter::with_capacity(WRITE_BUFFER, file))
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("无法删除临时文件 {}: {}", self.temp_path.display(), e);
            }
        }
    }

    /// 还没收到响应时也可以续传（从零开始）
    fn capture(&self) -> Option<Checkpoint> {
        if !self.accepts_ranges && self.offset > 0 {
            self.discard();
            return None;
        }
        ResumeData {
            url: self.url.clone(),
            temp_path: self.temp_path.clone(),
            offset: self.offset,
            etag: self.etag.clone(),
        }
        .encode()
    }

    fn prepare_retry(&mut self) {
        if !self.accepts_ranges {
            self.offset = 0;
        }
    }

    async fn fetch(
        &mut self,
        shared: &Shared,
        handle: TransportHandle,
        credential: Option<&Credential>,
    ) -> TransferResult<Fetched> {
        let settings = &shared.settings;
        let client = awc::Client::builder()
            .disable_timeout()
            .add_default_header((header::USER_AGENT, settings.user_agent.clone()))
            .finish();

        let resuming = self.offset > 0;
        let mut request = client.get(self.url.as_str());
        if resuming {
            request = request.insert_header((header::RANGE, format!("bytes={}-", self.offset)));
            if let Some(etag) = &self.etag {
                request = request.insert_header((header::IF_RANGE, etag.clone()));
            }
        }
        if let Some(credential) = credential {
            request = request.basic_auth(&credential.user, &credential.password);
        }

        let mut response = tokio::time::timeout(settings.timeout, request.send())
            .await
            .map_err(|_| TransferError::Timeout)?
            .map_err(|e| match e {
                // 协议或地址本身不可用，重试没有意义
                awc::error::SendRequestError::Url(e) => TransferError::InvalidUrl(format!("{}: {}", self.url, e)),
                e => TransferError::Network(e.to_string()),
            })?;

        let status = response.status();
        if resuming && status == StatusCode::RANGE_NOT_SATISFIABLE {
            let content_range = header_value(response.headers(), header::CONTENT_RANGE);
            if range_already_complete(self.offset, content_range) {
                log::info!("暂停前已收齐全部字节: {}", self.url);
                self.expected = self.offset;
                shared.emit(TransportEvent::BytesWritten {
                    handle,
                    written: self.offset,
                    expected: self.expected,
                });
                return Ok(Fetched::Complete);
            }
        }
        if status == StatusCode::UNAUTHORIZED {
            let authenticate = header_value(response.headers(), header::WWW_AUTHENTICATE)
                .unwrap_or("Basic")
                .to_string();
            return Ok(Fetched::Unauthorized(authenticate));
        }
        let append = match status {
            StatusCode::PARTIAL_CONTENT if resuming => true,
            s if s.is_success() => false,
            s => return Err(TransferError::Server { status: s.as_u16() }),
        };
        if resuming && !append {
            log::info!("服务器未接受 Range，从头下载: {}", self.url);
            self.offset = 0;
        }

        let headers = response.headers();
        let content_length = header_value(headers, header::CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
        let content_range = header_value(headers, header::CONTENT_RANGE).map(str::to_string);
        self.etag = header_value(headers, header::ETAG)
            .or_else(|| header_value(headers, header::LAST_MODIFIED))
            .map(str::to_string)
            .or_else(|| self.etag.take());
        self.accepts_ranges = append
            || header_value(headers, header::ACCEPT_RANGES)
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false);
        self.expected = expected_total(self.offset, content_length, content_range.as_deref());

        let mut writer = self.open(append)?;
        if resuming {
            shared.emit(TransportEvent::ResumedAtOffset {
                handle,
                offset: self.offset,
                expected: self.expected,
            });
        }

        let mut last_emit = Instant::now();
        loop {
            let chunk = tokio::time::timeout(settings.timeout, response.next())
                .await
                .map_err(|_| TransferError::Timeout)?;
            let Some(chunk) = chunk else { break };
            let bytes = chunk.map_err(|e| TransferError::Network(format!("网络流错误: {}", e)))?;
            writer.write_all(&bytes)?;
            self.offset += bytes.len() as u64;

            if last_emit.elapsed() >= settings.progress_interval {
                shared.emit(TransportEvent::BytesWritten {
                    handle,
                    written: self.offset,
                    expected: self.expected,
                });
                last_emit = Instant::now();
            }
        }
        writer.flush()?;
        shared.emit(TransportEvent::BytesWritten {
            handle,
            written: self.offset,
            expected: self.expected,
        });

        if self.expected > 0 && self.offset < self.expected {
            return Err(TransferError::Network(format!(
                "连接提前关闭: {}/{} 字节",
                self.offset, self.expected
            )));
        }
        Ok(Fetched::Complete)
    }
}

async fn run(
    shared: Arc<Shared>,
    handle: TransportHandle,
    plan: Plan,
    mut stop: oneshot::Receiver<StopRequest>,
) {
    let mut download = match plan {
        Plan::Fresh(url) => Download::fresh(url, &shared.settings.temp_dir),
        Plan::Resume(data) => Download::resume(data),
        Plan::Invalid(error) => {
            log::warn!("{} 无法从断点恢复: {}", handle, error);
            shared.emit(TransportEvent::Failed { handle, error });
            shared.retire(handle);
            return;
        }
    };

    match drive(&shared, handle, &mut download, &mut stop).await {
        Outcome::Finished => {
            log::info!("{} 下载完成: {} 字节", handle, download.offset);
            shared.emit(TransportEvent::Finished {
                handle,
                location: download.temp_path.clone(),
            });
        }
        Outcome::Failed(error) => {
            log::error!("{} 下载失败: {}", handle, error);
            download.discard();
            shared.emit(TransportEvent::Failed { handle, error });
        }
        Outcome::Stopped(StopRequest::Abort) => {
            log::debug!("{} 已终止", handle);
            download.discard();
        }
        Outcome::Stopped(StopRequest::Capture(reply)) => {
            let checkpoint = download.capture();
            log::debug!("{} 已暂停，断点: {:?}", handle, checkpoint);
            let _ = reply.send(checkpoint);
        }
    }
    shared.retire(handle);
}

async fn drive(
    shared: &Shared,
    handle: TransportHandle,
    download: &mut Download,
    stop: &mut oneshot::Receiver<StopRequest>,
) -> Outcome {
    let mut attempt = 0;
    let mut credential: Option<Credential> = None;
    let mut auth_failures = 0;

    loop {
        let result = match until_stopped(stop, download.fetch(shared, handle, credential.as_ref())).await {
            Ok(result) => result,
            Err(request) => return Outcome::Stopped(request),
        };

        match result {
            Ok(Fetched::Complete) => return Outcome::Finished,
            Ok(Fetched::Unauthorized(authenticate)) => {
                if credential.is_some() {
                    auth_failures += 1;
                }
                let (scheme, realm) = parse_authenticate(&authenticate);
                let host = Url::parse(&download.url)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .unwrap_or_default();
                let challenge = Challenge {
                    host: host.clone(),
                    scheme,
                    realm,
                    previous_failures: auth_failures,
                };
                let (responder, reply) = ChallengeResponder::new();
                shared.emit(TransportEvent::Challenge { handle, challenge, responder });

                let disposition = match until_stopped(stop, reply).await {
                    Ok(disposition) => disposition.unwrap_or(ChallengeDisposition::Cancel),
                    Err(request) => return Outcome::Stopped(request),
                };
                match disposition {
                    ChallengeDisposition::UseCredential(given) => credential = Some(given),
                    ChallengeDisposition::PerformDefaultHandling | ChallengeDisposition::Cancel => {
                        return Outcome::Failed(TransferError::Authentication(format!("{} 需要认证", host)));
                    }
                }
            }
            Err(error) if shared.settings.retry.should_retry(&error, attempt) => {
                let delay = shared.settings.retry.delay(attempt);
                attempt += 1;
                log::warn!(
                    "{} 出错: {}，{:.1} 秒后重试 ({}/{})",
                    handle,
                    error,
                    delay.as_secs_f64(),
                    attempt,
                    shared.settings.retry.max_retries
                );
                if let Err(request) = until_stopped(stop, tokio::time::sleep(delay)).await {
                    return Outcome::Stopped(request);
                }
                download.prepare_retry();
            }
            Err(error) => return Outcome::Failed(error),
        }
    }
}

/// 在停止信号到来前等待 `fut`
async fn until_stopped<F: Future>(
    stop: &mut oneshot::Receiver<StopRequest>,
    fut: F,
) -> Result<F::Output, StopRequest> {
    tokio::select! {
        biased;
        request = stop => Err(request.unwrap_or(StopRequest::Abort)),
        output = fut => Ok(output),
    }
}

fn header_value(headers: &header::HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Content-Range: bytes 100-199/1000` 中的总长度
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.trim().parse().ok())
}

fn expected_total(offset: u64, content_length: Option<u64>, content_range: Option<&str>) -> u64 {
    content_range
        .and_then(parse_content_range)
        .or_else(|| content_length.map(|length| offset + length))
        .unwrap_or(0)
}

/// 416 的 `Content-Range: bytes */N` 与已有长度一致时，说明文件早已收齐
fn range_already_complete(offset: u64, content_range: Option<&str>) -> bool {
    offset > 0 && content_range.and_then(parse_content_range) == Some(offset)
}

/// 解析 `WWW-Authenticate`，返回认证方式和 realm
fn parse_authenticate(value: &str) -> (String, Option<String>) {
    static REALM: OnceLock<Regex> = OnceLock::new();
    let realm = REALM.get_or_init(|| Regex::new(r#"(?i)realm="([^"]*)""#).expect("静态正则"));

    let scheme = value.split_whitespace().next().unwrap_or("Basic").to_string();
    let realm = realm.captures(value).map(|c| c[1].to_string());
    (scheme, realm)
}

//! 传输层协作者契约
//!
//! 核心不负责真正的字节传输，只通过 [`Transport`] 发起、取消和续传操作，
//! 传输层再以 [`TransportEvent`] 消息的形式把进度与结果异步送回管理器。

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::core::error::TransferError;

/// 传输层活动操作的句柄，每次启动或续传都会分配新的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 暂停时由传输层产生的不透明断点数据
#[derive(Clone, PartialEq, Eq)]
pub struct Checkpoint(Bytes);

impl Checkpoint {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checkpoint({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Checkpoint {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

/// 服务器发起的身份验证质询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub host: String,
    pub scheme: String,
    pub realm: Option<String>,
    /// 同一操作上此前失败的次数
    pub previous_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

/// 对质询的处理决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDisposition {
    UseCredential(Credential),
    PerformDefaultHandling,
    Cancel,
}

/// 质询应答，只能使用一次；未应答即被丢弃时传输层按取消处理
#[derive(Debug)]
pub struct ChallengeResponder {
    tx: oneshot::Sender<ChallengeDisposition>,
}

impl ChallengeResponder {
    pub fn new() -> (Self, oneshot::Receiver<ChallengeDisposition>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn respond(self, disposition: ChallengeDisposition) {
        if self.tx.send(disposition).is_err() {
            log::debug!("质询应答无人接收，传输操作可能已结束");
        }
    }
}

/// 传输层送回管理器的事件
#[derive(Debug)]
pub enum TransportEvent {
    BytesWritten { handle: TransportHandle, written: u64, expected: u64 },
    ResumedAtOffset { handle: TransportHandle, offset: u64, expected: u64 },
    Finished { handle: TransportHandle, location: PathBuf },
    Failed { handle: TransportHandle, error: TransferError },
    Challenge { handle: TransportHandle, challenge: Challenge, responder: ChallengeResponder },
    SessionInvalidated { error: Option<TransferError> },
    Drained,
}

/// 传输层操作工厂
///
/// `start_fresh` / `start_from_checkpoint` / `abort` 必须立即返回；
/// `cancel_and_capture` 的结果异步产生，恰好一次。
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn start_fresh(&self, identity: &str) -> TransportHandle;

    fn start_from_checkpoint(&self, checkpoint: &Checkpoint) -> TransportHandle;

    /// 取消操作并尽量保留断点；服务器不支持续传时返回 `None`
    async fn cancel_and_capture(&self, handle: TransportHandle) -> Option<Checkpoint>;

    fn abort(&self, handle: TransportHandle);
}

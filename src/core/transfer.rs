//! 单个传输：身份、状态机、字节计数和断点
//!
//! 所有可变状态放在同一把锁后面，读取方总能看到一致的
//! `(written, expected, fraction)` 组合。通知在锁外发出，
//! 观察者可以在回调里安全地读取传输。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::notify::{ListenerId, NotificationHub, TransferListener};
use crate::core::state::TransferState;
use crate::core::transport::{Checkpoint, Transport, TransportHandle};

/// 暂停结果回调，参数为得到的断点（可能为空）
pub type CheckpointCallback = Box<dyn FnOnce(Option<Checkpoint>) + Send>;

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub written: u64,
    /// 0 表示总大小未知
    pub expected: u64,
    pub fraction: f32,
}

impl Progress {
    pub fn new(written: u64, expected: u64) -> Self {
        // 已知总大小时保证 written <= expected
        let expected = if expected > 0 { expected.max(written) } else { 0 };
        let fraction = if expected > 0 {
            (written as f64 / expected as f64) as f32
        } else {
            0.0
        };
        Self { written, expected, fraction }
    }
}

/// 可序列化的传输视图，供外部存储或报告使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub identity: String,
    pub state: TransferState,
    pub last_state: TransferState,
    pub written: u64,
    pub expected: u64,
    pub fraction: f32,
    pub has_checkpoint: bool,
}

#[derive(Default)]
struct TransferInner {
    state: TransferState,
    last_state: TransferState,
    progress: Progress,
    checkpoint: Option<Checkpoint>,
    handle: Option<TransportHandle>,
}

impl TransferInner {
    fn set_state(&mut self, to: TransferState) -> Notice {
        self.last_state = self.state;
        self.state = to;
        Notice::State(self.last_state, to)
    }
}

enum Notice {
    State(TransferState, TransferState),
    Progress(Progress),
}

pub struct Transfer {
    identity: String,
    inner: Mutex<TransferInner>,
    listeners: Mutex<Vec<(ListenerId, TransferListener)>>,
    next_listener: AtomicU64,
    transport: Arc<dyn Transport>,
    hub: Arc<NotificationHub>,
}

impl Transfer {
    pub(crate) fn new(identity: String, transport: Arc<dyn Transport>, hub: Arc<NotificationHub>) -> Self {
        Self {
            identity,
            inner: Mutex::new(TransferInner::default()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            transport,
            hub,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> TransferState {
        self.lock_inner().state
    }

    pub fn last_state(&self) -> TransferState {
        self.lock_inner().last_state
    }

    pub fn progress(&self) -> Progress {
        self.lock_inner().progress
    }

    pub fn fraction_completed(&self) -> f32 {
        self.lock_inner().progress.fraction
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.lock_inner().checkpoint.clone()
    }

    pub fn handle(&self) -> Option<TransportHandle> {
        self.lock_inner().handle
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let inner = self.lock_inner();
        TransferSnapshot {
            identity: self.identity.clone(),
            state: inner.state,
            last_state: inner.last_state,
            written: inner.progress.written,
            expected: inner.progress.expected,
            fraction: inner.progress.fraction,
            has_checkpoint: inner.checkpoint.is_some(),
        }
    }

    pub fn add_listener(&self, listener: TransferListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// 开始或续传。有断点时从断点续传并清除断点，否则新建传输操作。
    /// 只在未开始或已暂停时生效，返回是否真的启动了。
    ///
    /// 调用传输层时不持有状态锁，句柄在调用返回后才发布；
    /// 期间若已被取消，新建的操作会立即终止。
    pub fn start(&self) -> bool {
        let (notice, checkpoint) = {
            let mut inner = self.lock_inner();
            if !inner.state.can_transition_to(TransferState::Waiting) {
                log::debug!("忽略启动请求: {} 当前状态 {:?}", self.identity, inner.state);
                return false;
            }
            let checkpoint = inner.checkpoint.take();
            (inner.set_state(TransferState::Waiting), checkpoint)
        };
        self.dispatch(vec![notice]);

        let handle = match &checkpoint {
            Some(checkpoint) => {
                log::info!("从断点续传: {} ({} 字节断点)", self.identity, checkpoint.len());
                self.transport.start_from_checkpoint(checkpoint)
            }
            None => self.transport.start_fresh(&self.identity),
        };

        let published = {
            let mut inner = self.lock_inner();
            if inner.state == TransferState::Waiting && inner.handle.is_none() {
                inner.handle = Some(handle);
                true
            } else {
                false
            }
        };
        if !published {
            log::debug!("启动期间状态已变化，终止 {}: {}", handle, self.identity);
            self.transport.abort(handle);
        }
        true
    }

    /// 请求暂停。传输层返回断点后进入已暂停；没有断点则退回为已取消。
    /// 立即返回，结果通过状态通知和可选回调送达。
    pub fn pause(self: &Arc<Self>, on_checkpoint: Option<CheckpointCallback>) -> bool {
        let (notice, handle) = {
            let mut inner = self.lock_inner();
            if !inner.state.can_transition_to(TransferState::Pausing) {
                drop(inner);
                if let Some(callback) = on_checkpoint {
                    callback(None);
                }
                return false;
            }
            let handle = inner.handle;
            (inner.set_state(TransferState::Pausing), handle)
        };
        self.dispatch(vec![notice]);

        let Some(handle) = handle else {
            log::warn!("暂停时没有活动操作: {}", self.identity);
            self.finish_pause(None, None);
            if let Some(callback) = on_checkpoint {
                callback(None);
            }
            return true;
        };

        let this = Arc::clone(self);
        let transport = Arc::clone(&self.transport);
        let task = async move {
            let checkpoint = transport
                .cancel_and_capture(handle)
                .await
                .filter(|checkpoint| !checkpoint.is_empty());
            this.finish_pause(Some(handle), checkpoint.clone());
            if let Some(callback) = on_checkpoint {
                callback(checkpoint);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
            }
            Err(_) => {
                std::thread::spawn(move || futures::executor::block_on(task));
            }
        }
        true
    }

    fn finish_pause(&self, handle: Option<TransportHandle>, checkpoint: Option<Checkpoint>) {
        let notice = {
            let mut inner = self.lock_inner();
            if inner.state != TransferState::Pausing || inner.handle != handle {
                log::debug!("暂停结果已过期: {} 当前状态 {:?}", self.identity, inner.state);
                return;
            }
            inner.handle = None;
            match checkpoint {
                Some(checkpoint) => {
                    inner.checkpoint = Some(checkpoint);
                    inner.set_state(TransferState::Paused)
                }
                None => {
                    log::warn!("服务器不支持续传，改为取消: {}", self.identity);
                    inner.set_state(TransferState::Cancelled)
                }
            }
        };
        self.dispatch(vec![notice]);
    }

    /// 取消传输，终止状态，重复调用无操作
    pub fn cancel(&self) -> bool {
        let (notice, handle) = {
            let mut inner = self.lock_inner();
            if !inner.state.can_transition_to(TransferState::Cancelled) {
                return false;
            }
            let handle = inner.handle.take();
            inner.checkpoint = None;
            (inner.set_state(TransferState::Cancelled), handle)
        };
        if let Some(handle) = handle {
            self.transport.abort(handle);
        }
        self.dispatch(vec![notice]);
        true
    }

    pub(crate) fn matches_handle(&self, handle: TransportHandle) -> bool {
        self.lock_inner().handle == Some(handle)
    }

    pub(crate) fn on_bytes_written(&self, written: u64, expected: u64) -> bool {
        let mut notices = Vec::with_capacity(2);
        {
            let mut inner = self.lock_inner();
            match inner.state {
                TransferState::Waiting => notices.push(inner.set_state(TransferState::Transferring)),
                TransferState::Transferring | TransferState::Pausing => {}
                _ => return false,
            }
            inner.progress = Progress::new(written, expected);
            notices.push(Notice::Progress(inner.progress));
        }
        self.dispatch(notices);
        true
    }

    pub(crate) fn on_finished(&self) -> bool {
        let notice = {
            let mut inner = self.lock_inner();
            if !inner.state.can_transition_to(TransferState::Completed) {
                return false;
            }
            inner.handle = None;
            inner.set_state(TransferState::Completed)
        };
        self.dispatch(vec![notice]);
        true
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        let observer = self.hub.observer();
        let listeners: Vec<TransferListener> =
            self.lock_listeners().iter().map(|(_, listener)| listener.clone()).collect();
        for notice in notices {
            match notice {
                Notice::State(from, to) => {
                    log::debug!("{}: {:?} -> {:?}", self.identity, from, to);
                    if let Some(observer) = &observer {
                        observer.state_changed(self, from, to);
                    }
                    for listener in &listeners {
                        listener.emit_state(self, from, to);
                    }
                }
                Notice::Progress(progress) => {
                    if let Some(observer) = &observer {
                        observer.progress_changed(self, progress);
                    }
                    for listener in &listeners {
                        listener.emit_progress(self, progress);
                    }
                }
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, TransferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, TransferListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn detached(identity: &str) -> Arc<Self> {
        use crate::core::transport::testing::ScriptedTransport;
        Arc::new(Self::new(
            identity.to_string(),
            Arc::new(ScriptedTransport::new()),
            Arc::new(NotificationHub::new()),
        ))
    }
}

impl PartialEq for Transfer {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Transfer {}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("Transfer")
            .field("identity", &self.identity)
            .field("state", &inner.state)
            .field("progress", &inner.progress)
            .field("handle", &inner.handle)
            .finish()
    }
}

//! 通知契约：单个传输的监听者与管理器级观察者
//!
//! 监听者和观察者都通过显式注册/注销管理生命周期，核心不持有弱引用。

use std::sync::{Arc, PoisonError, RwLock};

use crate::core::error::TransferError;
use crate::core::state::TransferState;
use crate::core::transfer::{Progress, Transfer};
use crate::core::transport::{Challenge, ChallengeDisposition, ChallengeResponder};

/// 单个传输的观察者
pub trait TransferObserver: Send + Sync {
    fn state_changed(&self, _transfer: &Transfer, _from: TransferState, _to: TransferState) {}

    fn progress_changed(&self, _transfer: &Transfer, _progress: Progress) {}
}

pub type StateCallback = Arc<dyn Fn(TransferState, TransferState) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// 监听者注册号，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// 监听者既可以实现观察者 trait，也可以只提供闭包
#[derive(Clone, Default)]
pub struct TransferListener {
    observer: Option<Arc<dyn TransferObserver>>,
    on_state: Option<StateCallback>,
    on_progress: Option<ProgressCallback>,
}

impl TransferListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn on_state_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(TransferState, TransferState) + Send + Sync + 'static,
    {
        self.on_state = Some(Arc::new(callback));
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn emit_state(&self, transfer: &Transfer, from: TransferState, to: TransferState) {
        if let Some(observer) = &self.observer {
            observer.state_changed(transfer, from, to);
        }
        if let Some(callback) = &self.on_state {
            callback(from, to);
        }
    }

    pub(crate) fn emit_progress(&self, transfer: &Transfer, progress: Progress) {
        if let Some(observer) = &self.observer {
            observer.progress_changed(transfer, progress);
        }
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

/// 管理器级观察者，除了所有传输的状态和进度之外还接收管理器范围的事件
pub trait ManagerObserver: Send + Sync {
    fn state_changed(&self, _transfer: &Transfer, _from: TransferState, _to: TransferState) {}

    fn progress_changed(&self, _transfer: &Transfer, _progress: Progress) {}

    /// 传输结束；`error` 为传输层报告的失败
    fn completed(&self, _transfer: &Transfer, _error: Option<&TransferError>) {}

    /// 字节已全部收到，但移动到目标位置失败；传输仍然是已完成
    fn placement_failed(&self, _transfer: &Transfer, _error: &TransferError) {}

    /// 默认交给传输层的默认处理
    fn challenge(&self, _transfer: &Transfer, _challenge: &Challenge, responder: ChallengeResponder) {
        responder.respond(ChallengeDisposition::PerformDefaultHandling);
    }

    fn session_invalidated(&self, _error: Option<&TransferError>) {}

    fn drained(&self) {}
}

/// 管理器观察者的注册点，由管理器和它创建的所有传输共享
#[derive(Default)]
pub struct NotificationHub {
    observer: RwLock<Option<Arc<dyn ManagerObserver>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&self, observer: Arc<dyn ManagerObserver>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// 取出当前观察者的副本，调用期间不持有锁
    pub fn observer(&self) -> Option<Arc<dyn ManagerObserver>> {
        self.observer.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

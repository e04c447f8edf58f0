use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::error::TransferError;
use crate::core::notify::ManagerObserver;
use crate::core::placement::file_name_for;
use crate::core::state::TransferState;
use crate::core::transfer::{Progress, Transfer};

const BAR_TEMPLATE: &str = "{prefix:20!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}";

// 结构体：ProgressManager
// 每个传输一根进度条，同时作为管理器的观察者接收通知
pub struct ProgressManager {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    failures: Mutex<HashSet<String>>,
    unhandled_failures: Mutex<Vec<String>>,
    drained: AtomicBool,
    started: Instant,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// 不输出到终端，测试用
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
            unhandled_failures: Mutex::new(Vec::new()),
            drained: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failures(&self) -> MutexGuard<'_, HashSet<String>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // 取得某个传输的进度条，没有则新建
    pub fn track(&self, identity: &str) -> ProgressBar {
        self.bars()
            .entry(identity.to_string())
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new(0));
                if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb.set_prefix(file_name_for(identity));
                pb.set_message(TransferState::Unknown.to_string());
                pb
            })
            .clone()
    }

    /// 在进度条上方打印一行，不打乱绘制
    pub fn println(&self, message: &str) {
        if self.multi.println(message).is_err() {
            println!("{}", message);
        }
    }

    /// 取出尚未处理的失败传输
    pub fn take_failures(&self) -> Vec<String> {
        std::mem::take(&mut *self.unhandled_failures.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().len()
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    pub fn elapsed_time(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(&self) {
        for pb in self.bars().values() {
            if !pb.is_finished() {
                pb.abandon();
            }
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerObserver for ProgressManager {
    fn state_changed(&self, transfer: &Transfer, _from: TransferState, to: TransferState) {
        if to == TransferState::Waiting {
            // 新的传输层操作开始
            self.drained.store(false, Ordering::SeqCst);
        }
        if self.failures().contains(transfer.identity()) {
            return;
        }
        let pb = self.track(transfer.identity());
        match to {
            TransferState::Completed => pb.finish_with_message(to.to_string()),
            TransferState::Cancelled => pb.abandon_with_message(to.to_string()),
            _ => pb.set_message(to.to_string()),
        }
    }

    fn progress_changed(&self, transfer: &Transfer, progress: Progress) {
        let pb = self.track(transfer.identity());
        if progress.expected > 0 {
            pb.set_length(progress.expected);
        }
        pb.set_position(progress.written);
    }

    fn completed(&self, transfer: &Transfer, error: Option<&TransferError>) {
        if let Some(error) = error {
            log::error!("下载失败: {} - {}", transfer.identity(), error);
            self.failures().insert(transfer.identity().to_string());
            self.unhandled_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(transfer.identity().to_string());
            self.track(transfer.identity()).abandon_with_message(format!("失败: {}", error));
        }
    }

    fn placement_failed(&self, transfer: &Transfer, error: &TransferError) {
        self.println(&format!("✗ {}: {}", transfer.identity(), error));
    }

    fn session_invalidated(&self, error: Option<&TransferError>) {
        if let Some(error) = error {
            self.println(&format!("✗ 传输会话失效: {}", error));
        }
    }

    fn drained(&self) {
        self.drained.store(true, Ordering::SeqCst);
    }
}

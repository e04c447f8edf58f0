//! 传输管理器：持有注册表，对外提供生命周期操作，
//! 把传输层事件路由回对应的传输，并向观察者分发通知。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::Config;
use crate::core::error::{TransferError, TransferResult};
use crate::core::notify::{ManagerObserver, NotificationHub, TransferListener};
use crate::core::placement::{move_file, PlacementPolicy};
use crate::core::registry::TransferRegistry;
use crate::core::state::TransferState;
use crate::core::transfer::Transfer;
use crate::core::transport::{
    Challenge, ChallengeDisposition, ChallengeResponder, Transport, TransportEvent, TransportHandle,
};

/// 一次性的“全部传输已清空”回调
pub type DrainHandler = Box<dyn FnOnce() + Send>;

/// 管理器统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub total: usize,
    pub pending: usize,
    pub transferring: usize,
    pub paused: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub written_bytes: u64,
    pub expected_bytes: u64,
}

pub struct TransferManager {
    config: Config,
    registry: TransferRegistry,
    transport: Arc<dyn Transport>,
    placement: Option<Arc<dyn PlacementPolicy>>,
    hub: Arc<NotificationHub>,
    drain_handler: Mutex<Option<DrainHandler>>,
}

impl TransferManager {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            registry: TransferRegistry::new(),
            transport,
            placement: None,
            hub: Arc::new(NotificationHub::new()),
            drain_handler: Mutex::new(None),
        }
    }

    pub fn with_placement(mut self, placement: Arc<dyn PlacementPolicy>) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_observer(&self, observer: Arc<dyn ManagerObserver>) {
        self.hub.set_observer(observer);
    }

    pub fn clear_observer(&self) {
        self.hub.clear_observer();
    }

    /// 注册一次性的清空回调，触发后即被清除
    pub fn set_drain_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.drain_handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// 获取或创建某个资源的传输。同一标识重复调用返回同一个传输；
    /// 新建的传输在 `auto_start` 打开时立即启动。
    pub fn download(&self, identity: &str) -> TransferResult<Arc<Transfer>> {
        self.download_inner(identity, None)
    }

    /// 同 [`download`](Self::download)，并在启动前挂上监听者
    pub fn download_with_listener(
        &self,
        identity: &str,
        listener: TransferListener,
    ) -> TransferResult<Arc<Transfer>> {
        self.download_inner(identity, Some(listener))
    }

    fn download_inner(
        &self,
        identity: &str,
        listener: Option<TransferListener>,
    ) -> TransferResult<Arc<Transfer>> {
        if !crate::utils::validator::is_valid_url(identity) {
            return Err(TransferError::InvalidUrl(identity.to_string()));
        }
        let (transfer, created) = self.registry.find_or_create(identity, || {
            Transfer::new(identity.to_string(), Arc::clone(&self.transport), Arc::clone(&self.hub))
        });
        if let Some(listener) = listener {
            transfer.add_listener(listener);
        }
        if created {
            log::info!("新建传输: {}", identity);
            if self.config.auto_start {
                transfer.start();
            }
        } else {
            log::debug!("复用已有传输: {} ({:?})", identity, transfer.state());
        }
        Ok(transfer)
    }

    pub fn transfer(&self, identity: &str) -> Option<Arc<Transfer>> {
        self.registry.find_by_identity(identity)
    }

    pub fn transfers(&self) -> Vec<Arc<Transfer>> {
        self.registry.snapshot()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// 尚未完成也未取消的传输数
    pub fn pending_count(&self) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|transfer| !transfer.state().is_terminal())
            .count()
    }

    pub fn stats(&self) -> ManagerStats {
        let mut stats = ManagerStats::default();
        for transfer in self.registry.snapshot() {
            let snapshot = transfer.snapshot();
            stats.total += 1;
            stats.written_bytes += snapshot.written;
            stats.expected_bytes += snapshot.expected;
            match snapshot.state {
                TransferState::Unknown | TransferState::Waiting => stats.pending += 1,
                TransferState::Transferring | TransferState::Pausing => stats.transferring += 1,
                TransferState::Paused => stats.paused += 1,
                TransferState::Completed => stats.completed += 1,
                TransferState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn start(&self, identity: &str) -> bool {
        match self.registry.find_by_identity(identity) {
            Some(transfer) => {
                transfer.start();
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, identity: &str) -> bool {
        match self.registry.find_by_identity(identity) {
            Some(transfer) => {
                transfer.pause(None);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, identity: &str) -> bool {
        match self.registry.find_by_identity(identity) {
            Some(transfer) => {
                transfer.cancel();
                true
            }
            None => false,
        }
    }

    /// 先取消再移出注册表；不存在时无操作
    pub fn remove(&self, identity: &str) -> bool {
        match self.registry.remove(identity) {
            Some(transfer) => {
                transfer.cancel();
                log::info!("移除传输: {}", identity);
                true
            }
            None => false,
        }
    }

    /// 移除所有处于指定状态的传输，返回移除数量
    pub fn remove_in_state(&self, state: TransferState) -> usize {
        let mut removed = 0;
        for transfer in self.registry.in_state(state) {
            if self.remove(transfer.identity()) {
                removed += 1;
            }
        }
        removed
    }

    pub fn resume_all(&self) {
        self.registry.for_each(|transfer| {
            transfer.start();
        });
    }

    pub fn pause_all(&self) {
        self.registry.for_each(|transfer| {
            transfer.pause(None);
        });
    }

    pub fn cancel_all(&self) {
        self.registry.for_each(|transfer| {
            transfer.cancel();
        });
    }

    pub fn remove_all(&self) {
        self.cancel_all();
        let removed = self.registry.drain();
        for transfer in &removed {
            // 清空期间新加入的传输也要先取消
            transfer.cancel();
        }
        log::info!("已移除全部 {} 个传输", removed.len());
    }

    /// 处理传输层事件。找不到句柄对应的传输时丢弃事件。
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::BytesWritten { handle, written, expected }
            | TransportEvent::ResumedAtOffset { handle, offset: written, expected } => {
                if let Some(transfer) = self.resolve(handle) {
                    transfer.on_bytes_written(written, expected);
                }
            }
            TransportEvent::Finished { handle, location } => {
                if let Some(transfer) = self.resolve(handle) {
                    self.finish(&transfer, &location);
                }
            }
            TransportEvent::Failed { handle, error } => {
                if let Some(transfer) = self.resolve(handle) {
                    log::warn!("传输失败: {} - {}", transfer.identity(), error);
                    if let Some(observer) = self.hub.observer() {
                        observer.completed(&transfer, Some(&error));
                    }
                }
            }
            TransportEvent::Challenge { handle, challenge, responder } => {
                self.forward_challenge(handle, challenge, responder);
            }
            TransportEvent::SessionInvalidated { error } => {
                log::warn!("传输会话失效: {:?}", error);
                if let Some(observer) = self.hub.observer() {
                    observer.session_invalidated(error.as_ref());
                }
            }
            TransportEvent::Drained => self.drained(),
        }
    }

    fn resolve(&self, handle: TransportHandle) -> Option<Arc<Transfer>> {
        let transfer = self.registry.find_by_handle(handle);
        if transfer.is_none() {
            log::debug!("丢弃未知句柄 {} 的事件", handle);
        }
        transfer
    }

    fn finish(&self, transfer: &Arc<Transfer>, location: &Path) {
        if !transfer.on_finished() {
            return;
        }
        log::info!("传输完成: {}", transfer.identity());
        let observer = self.hub.observer();
        if let Some(placement) = &self.placement {
            if let Some(destination) = placement.decide_placement(transfer, location) {
                match move_file(location, &destination) {
                    Ok(()) => log::info!("文件已移动到 {}", destination.display()),
                    Err(error) => {
                        log::warn!("{}", error);
                        if let Some(observer) = &observer {
                            observer.placement_failed(transfer, &error);
                        }
                    }
                }
            }
        }
        if let Some(observer) = &observer {
            observer.completed(transfer, None);
        }
    }

    fn forward_challenge(&self, handle: TransportHandle, challenge: Challenge, responder: ChallengeResponder) {
        let transfer = self.resolve(handle);
        match (transfer, self.hub.observer()) {
            (Some(transfer), Some(observer)) => observer.challenge(&transfer, &challenge, responder),
            (Some(_), None) => responder.respond(ChallengeDisposition::PerformDefaultHandling),
            (None, _) => responder.respond(ChallengeDisposition::Cancel),
        }
    }

    fn drained(&self) {
        let handler = self.drain_handler.lock().unwrap_or_else(PoisonError::into_inner).take();
        log::debug!("传输层已无活动操作");
        if let Some(observer) = self.hub.observer() {
            observer.drained();
        }
        if let Some(handler) = handler {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transfer::Progress;
    use crate::core::transport::testing::{Call, ScriptedTransport};
    use crate::core::transport::{Checkpoint, Credential};
    use std::fs;
    use std::path::PathBuf;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    const URL: &str = "https://x/file";

    fn setup(auto_start: bool) -> (TransferManager, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let config = Config { auto_start, ..Config::default() };
        (TransferManager::new(config, transport.clone()), transport)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ManagerObserver for Recorder {
        fn state_changed(&self, transfer: &Transfer, from: TransferState, to: TransferState) {
            self.push(format!("state {} {:?}->{:?}", transfer.identity(), from, to));
        }

        fn progress_changed(&self, _transfer: &Transfer, progress: Progress) {
            self.push(format!("progress {}/{}", progress.written, progress.expected));
        }

        fn completed(&self, _transfer: &Transfer, error: Option<&TransferError>) {
            self.push(format!("completed error={}", error.is_some()));
        }

        fn placement_failed(&self, _transfer: &Transfer, _error: &TransferError) {
            self.push("placement_failed".to_string());
        }

        fn challenge(&self, _transfer: &Transfer, challenge: &Challenge, responder: ChallengeResponder) {
            self.push(format!("challenge {}", challenge.host));
            responder.respond(ChallengeDisposition::UseCredential(Credential {
                user: "u".to_string(),
                password: "p".to_string(),
            }));
        }

        fn session_invalidated(&self, _error: Option<&TransferError>) {
            self.push("invalidated".to_string());
        }

        fn drained(&self) {
            self.push("drained".to_string());
        }
    }

    struct FixedPlacement(Option<PathBuf>);

    impl PlacementPolicy for FixedPlacement {
        fn decide_placement(&self, _transfer: &Transfer, _location: &Path) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    #[test]
    fn test_download_deduplicates_identity() {
        let (manager, transport) = setup(true);
        let first = manager.download(URL).unwrap();
        let second = manager.download(URL).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.identity(), second.identity());
        assert_eq!(manager.len(), 1);
        // 重复调用不会再次启动
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_download_after_remove_is_new_transfer() {
        let (manager, _) = setup(false);
        let first = manager.download(URL).unwrap();
        first.start();
        assert!(manager.remove(URL));
        assert_eq!(first.state(), TransferState::Cancelled);

        let third = manager.download(URL).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.state(), TransferState::Unknown);
    }

    #[test]
    fn test_auto_start_policy() {
        let (manager, _) = setup(true);
        assert_eq!(manager.download(URL).unwrap().state(), TransferState::Waiting);

        let (manager, transport) = setup(false);
        let transfer = manager.download(URL).unwrap();
        assert_eq!(transfer.state(), TransferState::Unknown);
        assert!(transport.calls().is_empty());
        assert!(manager.start(URL));
        assert_eq!(transfer.state(), TransferState::Waiting);
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let (manager, _) = setup(true);
        assert!(matches!(manager.download("not a url"), Err(TransferError::InvalidUrl(_))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_operations_on_unknown_identity_are_noops() {
        let (manager, _) = setup(true);
        assert!(!manager.start(URL));
        assert!(!manager.pause(URL));
        assert!(!manager.cancel(URL));
        assert!(!manager.remove(URL));
    }

    #[test]
    fn test_events_route_by_handle() {
        let (manager, _) = setup(true);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());

        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        manager.handle_event(TransportEvent::BytesWritten { handle, written: 50, expected: 100 });

        assert_eq!(transfer.state(), TransferState::Transferring);
        assert_eq!(transfer.fraction_completed(), 0.5);
        assert_eq!(
            recorder.events(),
            vec![
                format!("state {} Unknown->Waiting", URL),
                format!("state {} Waiting->Transferring", URL),
                "progress 50/100".to_string(),
            ]
        );
    }

    #[test]
    fn test_resumed_offset_reports_progress() {
        let (manager, _) = setup(true);
        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        manager.handle_event(TransportEvent::ResumedAtOffset { handle, offset: 30, expected: 120 });
        assert_eq!(transfer.state(), TransferState::Transferring);
        assert_eq!(transfer.progress().written, 30);
        assert_eq!(transfer.fraction_completed(), 0.25);
    }

    #[test]
    fn test_unknown_handle_events_dropped() {
        let (manager, _) = setup(true);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());

        manager.handle_event(TransportEvent::BytesWritten {
            handle: TransportHandle(42),
            written: 1,
            expected: 2,
        });
        manager.handle_event(TransportEvent::Failed {
            handle: TransportHandle(42),
            error: TransferError::Timeout,
        });
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_late_event_after_remove_dropped() {
        let (manager, _) = setup(true);
        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        manager.remove(URL);
        manager.handle_event(TransportEvent::Finished { handle, location: PathBuf::from("/nowhere") });
        assert_eq!(transfer.state(), TransferState::Cancelled);
    }

    #[test]
    fn test_failure_reported_without_state_change() {
        let (manager, _) = setup(true);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());
        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();

        manager.handle_event(TransportEvent::Failed {
            handle,
            error: TransferError::Network("reset".to_string()),
        });
        assert_eq!(transfer.state(), TransferState::Waiting);
        assert_eq!(recorder.events().last().unwrap(), "completed error=true");
    }

    #[test]
    fn test_finish_moves_file() {
        let dir = std::env::temp_dir().join(format!("hawker-manager-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let location = dir.join("payload.part");
        fs::write(&location, b"data").unwrap();
        let destination = dir.join("out/payload.bin");

        let transport = Arc::new(ScriptedTransport::new());
        let manager = TransferManager::new(Config::default(), transport)
            .with_placement(Arc::new(FixedPlacement(Some(destination.clone()))));
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());

        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        manager.handle_event(TransportEvent::Finished { handle, location: location.clone() });

        assert_eq!(transfer.state(), TransferState::Completed);
        assert_eq!(fs::read(&destination).unwrap(), b"data");
        assert!(!location.exists());
        assert_eq!(recorder.events().last().unwrap(), "completed error=false");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_placement_failure_keeps_completed() {
        let transport = Arc::new(ScriptedTransport::new());
        let manager = TransferManager::new(Config::default(), transport).with_placement(Arc::new(
            FixedPlacement(Some(std::env::temp_dir().join(format!("hawker-{}/x", Uuid::new_v4())))),
        ));
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());

        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        let missing = std::env::temp_dir().join(format!("hawker-missing-{}", Uuid::new_v4()));
        manager.handle_event(TransportEvent::Finished { handle, location: missing });

        assert_eq!(transfer.state(), TransferState::Completed);
        assert!(recorder.events().contains(&"placement_failed".to_string()));
    }

    #[test]
    fn test_declined_placement_leaves_file() {
        let dir = std::env::temp_dir().join(format!("hawker-declined-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let location = dir.join("payload.part");
        fs::write(&location, b"data").unwrap();

        let manager = TransferManager::new(Config::default(), Arc::new(ScriptedTransport::new()))
            .with_placement(Arc::new(FixedPlacement(None)));
        let transfer = manager.download(URL).unwrap();
        let handle = transfer.handle().unwrap();
        manager.handle_event(TransportEvent::Finished { handle, location: location.clone() });

        assert_eq!(transfer.state(), TransferState::Completed);
        assert!(location.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_challenge_forwarded_to_observer() {
        let (manager, _) = setup(true);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());
        let transfer = manager.download(URL).unwrap();

        let (responder, rx) = ChallengeResponder::new();
        manager.handle_event(TransportEvent::Challenge {
            handle: transfer.handle().unwrap(),
            challenge: Challenge {
                host: "x".to_string(),
                scheme: "Basic".to_string(),
                realm: Some("files".to_string()),
                previous_failures: 0,
            },
            responder,
        });
        assert!(matches!(rx.await.unwrap(), ChallengeDisposition::UseCredential(_)));
        assert!(recorder.events().contains(&"challenge x".to_string()));
    }

    #[tokio::test]
    async fn test_challenge_without_observer_uses_default() {
        let (manager, _) = setup(true);
        let transfer = manager.download(URL).unwrap();
        let (responder, rx) = ChallengeResponder::new();
        manager.handle_event(TransportEvent::Challenge {
            handle: transfer.handle().unwrap(),
            challenge: Challenge {
                host: "x".to_string(),
                scheme: "Basic".to_string(),
                realm: None,
                previous_failures: 0,
            },
            responder,
        });
        assert_eq!(rx.await.unwrap(), ChallengeDisposition::PerformDefaultHandling);
    }

    #[test]
    fn test_session_invalidated_forwarded() {
        let (manager, _) = setup(true);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());
        manager.handle_event(TransportEvent::SessionInvalidated { error: None });
        assert_eq!(recorder.events(), vec!["invalidated".to_string()]);
    }

    #[test]
    fn test_drain_handler_fires_once() {
        let (manager, _) = setup(true);
        let (tx, mut rx) = oneshot::channel();
        manager.set_drain_handler(move || {
            let _ = tx.send(());
        });

        manager.handle_event(TransportEvent::Drained);
        assert!(rx.try_recv().is_ok());
        // 第二次清空事件没有处理器可调用
        manager.handle_event(TransportEvent::Drained);
    }

    #[tokio::test]
    async fn test_pause_all_and_resume_all() {
        let (manager, transport) = setup(true);
        transport.reply_with(Some(Checkpoint::from(vec![1])));
        let a = manager.download("https://x/a").unwrap();
        let b = manager.download("https://x/b").unwrap();

        manager.pause_all();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(a.state(), TransferState::Paused);
        assert_eq!(b.state(), TransferState::Paused);
        assert_eq!(manager.stats().paused, 2);

        manager.resume_all();
        assert_eq!(a.state(), TransferState::Waiting);
        assert_eq!(b.state(), TransferState::Waiting);
        let resumed = transport
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::StartFromCheckpoint(..)))
            .count();
        assert_eq!(resumed, 2);
    }

    #[test]
    fn test_cancel_all() {
        let (manager, _) = setup(false);
        let idle = manager.download("https://x/idle").unwrap();
        let running = manager.download("https://x/running").unwrap();
        running.start();

        manager.cancel_all();
        assert_eq!(idle.state(), TransferState::Cancelled);
        assert_eq!(running.state(), TransferState::Cancelled);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_cancel_all_leaves_completed() {
        let (manager, _) = setup(true);
        let done = manager.download("https://x/done").unwrap();
        manager.handle_event(TransportEvent::Finished {
            handle: done.handle().unwrap(),
            location: PathBuf::from("/unused"),
        });
        manager.cancel_all();
        assert_eq!(done.state(), TransferState::Completed);
    }

    #[test]
    fn test_remove_all_cancels_then_clears() {
        let (manager, _) = setup(true);
        let transfers: Vec<_> = ["https://x/1", "https://x/2", "https://x/3"]
            .iter()
            .map(|url| manager.download(url).unwrap())
            .collect();

        manager.remove_all();
        assert!(manager.is_empty());
        for transfer in transfers {
            assert_eq!(transfer.state(), TransferState::Cancelled);
        }
    }

    #[test]
    fn test_remove_in_state() {
        let (manager, _) = setup(true);
        manager.download("https://x/keep").unwrap();
        let gone = manager.download("https://x/gone").unwrap();
        gone.cancel();

        assert_eq!(manager.remove_in_state(TransferState::Cancelled), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.transfer("https://x/keep").is_some());
    }

    #[test]
    fn test_download_with_listener_sees_first_transition() {
        let (manager, _) = setup(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager
            .download_with_listener(
                URL,
                TransferListener::new().on_state_changed(move |from, to| sink.lock().unwrap().push((from, to))),
            )
            .unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [(TransferState::Unknown, TransferState::Waiting)]
        );
    }

    #[test]
    fn test_stats_counts_states() {
        let (manager, _) = setup(true);
        let a = manager.download("https://x/a").unwrap();
        manager.download("https://x/b").unwrap();
        manager.handle_event(TransportEvent::BytesWritten {
            handle: a.handle().unwrap(),
            written: 10,
            expected: 40,
        });

        let stats = manager.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.transferring, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.written_bytes, 10);
        assert_eq!(stats.expected_bytes, 40);
    }

    #[test]
    fn test_cleared_observer_stops_receiving() {
        let (manager, _) = setup(false);
        let recorder = Arc::new(Recorder::default());
        manager.set_observer(recorder.clone());
        manager.clear_observer();
        manager.download(URL).unwrap().start();
        assert!(recorder.events().is_empty());
    }
}

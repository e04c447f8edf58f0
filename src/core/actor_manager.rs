use actix::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::error::TransferError;
use crate::core::manager::{ManagerStats, TransferManager};
use crate::core::transfer::{Transfer, TransferSnapshot};
use crate::core::transport::TransportEvent;

/// 传输层事件作为消息投递给管理器 Actor
impl Message for TransportEvent {
    type Result = ();
}

/// 添加下载（已存在则返回原有传输）
pub struct AddTransfer {
    pub identity: String,
}
impl Message for AddTransfer { type Result = Result<Arc<Transfer>, TransferError>; }
impl Handler<AddTransfer> for TransferManagerActor {
    type Result = Result<Arc<Transfer>, TransferError>;
    fn handle(&mut self, msg: AddTransfer, _ctx: &mut Self::Context) -> Self::Result {
        self.manager.download(&msg.identity)
    }
}

/// 启动或恢复指定传输
pub struct StartTransfer(pub String);
impl Message for StartTransfer { type Result = bool; }
impl Handler<StartTransfer> for TransferManagerActor {
    type Result = bool;
    fn handle(&mut self, msg: StartTransfer, _ctx: &mut Self::Context) -> bool {
        self.manager.start(&msg.0)
    }
}

/// 暂停指定传输
pub struct PauseTransfer(pub String);
impl Message for PauseTransfer { type Result = bool; }
impl Handler<PauseTransfer> for TransferManagerActor {
    type Result = bool;
    fn handle(&mut self, msg: PauseTransfer, _ctx: &mut Self::Context) -> bool {
        self.manager.pause(&msg.0)
    }
}

/// 取消指定传输
pub struct CancelTransfer(pub String);
impl Message for CancelTransfer { type Result = bool; }
impl Handler<CancelTransfer> for TransferManagerActor {
    type Result = bool;
    fn handle(&mut self, msg: CancelTransfer, _ctx: &mut Self::Context) -> bool {
        self.manager.cancel(&msg.0)
    }
}

/// 取消并移除指定传输
pub struct RemoveTransfer(pub String);
impl Message for RemoveTransfer { type Result = bool; }
impl Handler<RemoveTransfer> for TransferManagerActor {
    type Result = bool;
    fn handle(&mut self, msg: RemoveTransfer, _ctx: &mut Self::Context) -> bool {
        self.manager.remove(&msg.0)
    }
}

pub struct PauseAll;
impl Message for PauseAll { type Result = (); }
impl Handler<PauseAll> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, _msg: PauseAll, _ctx: &mut Self::Context) {
        self.manager.pause_all();
    }
}

pub struct ResumeAll;
impl Message for ResumeAll { type Result = (); }
impl Handler<ResumeAll> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, _msg: ResumeAll, _ctx: &mut Self::Context) {
        self.manager.resume_all();
    }
}

pub struct CancelAll;
impl Message for CancelAll { type Result = (); }
impl Handler<CancelAll> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, _msg: CancelAll, _ctx: &mut Self::Context) {
        self.manager.cancel_all();
    }
}

pub struct RemoveAll;
impl Message for RemoveAll { type Result = (); }
impl Handler<RemoveAll> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, _msg: RemoveAll, _ctx: &mut Self::Context) {
        self.manager.remove_all();
    }
}

/// 查询所有传输的快照
pub struct ListTransfers;
impl Message for ListTransfers { type Result = Vec<TransferSnapshot>; }
impl Handler<ListTransfers> for TransferManagerActor {
    type Result = MessageResult<ListTransfers>;
    fn handle(&mut self, _msg: ListTransfers, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.manager.transfers().iter().map(|t| t.snapshot()).collect())
    }
}

/// 查询统计信息
pub struct GetStats;
impl Message for GetStats { type Result = ManagerStats; }
impl Handler<GetStats> for TransferManagerActor {
    type Result = MessageResult<GetStats>;
    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.manager.stats())
    }
}

impl Handler<TransportEvent> for TransferManagerActor {
    type Result = ();
    fn handle(&mut self, event: TransportEvent, _ctx: &mut Self::Context) {
        self.manager.handle_event(event);
    }
}

impl StreamHandler<TransportEvent> for TransferManagerActor {
    fn handle(&mut self, event: TransportEvent, _ctx: &mut Self::Context) {
        self.manager.handle_event(event);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // 事件通道关闭不代表管理器结束，Actor 继续处理命令
        log::debug!("传输层事件流已关闭");
    }
}

/// 全局传输管理器 Actor，把命令和传输层事件串行化到同一个上下文
pub struct TransferManagerActor {
    manager: Arc<TransferManager>,
    events: Option<UnboundedReceiver<TransportEvent>>,
}

impl TransferManagerActor {
    pub fn new(manager: Arc<TransferManager>) -> Self {
        Self { manager, events: None }
    }

    /// 启动时把接收端挂成事件流
    pub fn with_events(mut self, events: UnboundedReceiver<TransportEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn manager(&self) -> &Arc<TransferManager> {
        &self.manager
    }
}

impl Actor for TransferManagerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.events.take() {
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            });
            ctx.add_stream(stream);
        }
        log::info!("传输管理器已启动");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::state::TransferState;
    use crate::core::transport::testing::ScriptedTransport;
    use crate::core::transport::{Checkpoint, TransportHandle};
    use tokio::sync::mpsc;

    fn start_actor(auto_start: bool) -> (Addr<TransferManagerActor>, mpsc::UnboundedSender<TransportEvent>) {
        let (addr, tx, _) = start_actor_with(auto_start);
        (addr, tx)
    }

    fn start_actor_with(
        auto_start: bool,
    ) -> (Addr<TransferManagerActor>, mpsc::UnboundedSender<TransportEvent>, Arc<ScriptedTransport>) {
        let config = Config { auto_start, ..Config::default() };
        let transport = Arc::new(ScriptedTransport::new());
        let manager = Arc::new(TransferManager::new(config, transport.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = TransferManagerActor::new(manager).with_events(rx).start();
        (addr, tx, transport)
    }

    #[actix_rt::test]
    async fn test_add_and_list() {
        let (addr, _tx) = start_actor(false);
        let transfer = addr
            .send(AddTransfer { identity: "https://example.com/a.zip".to_string() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transfer.state(), TransferState::Unknown);

        let again = addr
            .send(AddTransfer { identity: "https://example.com/a.zip".to_string() })
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&transfer, &again));

        let list = addr.send(ListTransfers).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].identity, "https://example.com/a.zip");
    }

    #[actix_rt::test]
    async fn test_invalid_url_rejected() {
        let (addr, _tx) = start_actor(true);
        let result = addr.send(AddTransfer { identity: "nope".to_string() }).await.unwrap();
        assert!(matches!(result, Err(TransferError::InvalidUrl(_))));
    }

    #[actix_rt::test]
    async fn test_commands_by_identity() {
        let (addr, _tx) = start_actor(false);
        let url = "https://example.com/b.bin".to_string();
        addr.send(AddTransfer { identity: url.clone() }).await.unwrap().unwrap();

        assert!(addr.send(StartTransfer(url.clone())).await.unwrap());
        assert!(addr.send(CancelTransfer(url.clone())).await.unwrap());
        assert!(!addr.send(StartTransfer("https://example.com/missing".to_string())).await.unwrap());

        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.cancelled, 1);

        assert!(addr.send(RemoveTransfer(url.clone())).await.unwrap());
        assert!(!addr.send(RemoveTransfer(url)).await.unwrap());
        assert_eq!(addr.send(GetStats).await.unwrap().total, 0);
    }

    #[actix_rt::test]
    async fn test_events_from_stream_reach_manager() {
        let (addr, tx) = start_actor(true);
        let transfer = addr
            .send(AddTransfer { identity: "https://example.com/c.iso".to_string() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transfer.state(), TransferState::Waiting);

        tx.send(TransportEvent::BytesWritten { handle: TransportHandle(1), written: 50, expected: 100 })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let stats = addr.send(GetStats).await.unwrap();
        assert_eq!(stats.transferring, 1);
        assert_eq!(stats.written_bytes, 50);
        assert_eq!(transfer.state(), TransferState::Transferring);
    }

    #[actix_rt::test]
    async fn test_bulk_operations() {
        let (addr, _tx) = start_actor(false);
        for name in ["a", "b", "c"] {
            addr.send(AddTransfer { identity: format!("https://example.com/{}", name) })
                .await
                .unwrap()
                .unwrap();
        }
        addr.send(ResumeAll).await.unwrap();
        assert_eq!(addr.send(GetStats).await.unwrap().pending, 3);

        addr.send(CancelAll).await.unwrap();
        assert_eq!(addr.send(GetStats).await.unwrap().cancelled, 3);

        addr.send(RemoveAll).await.unwrap();
        assert!(addr.send(ListTransfers).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_pause_all_reaches_transfers() {
        let (addr, _tx, transport) = start_actor_with(true);
        transport.reply_with(Some(Checkpoint::from(vec![7, 7])));
        let transfer = addr
            .send(AddTransfer { identity: "https://example.com/d".to_string() })
            .await
            .unwrap()
            .unwrap();
        addr.send(PauseAll).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(transfer.state(), TransferState::Paused);
        assert_eq!(transfer.checkpoint(), Some(Checkpoint::from(vec![7, 7])));
    }
}

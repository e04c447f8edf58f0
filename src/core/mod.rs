//! Core: 传输的状态机、注册表、管理器和通知
//!
//! - `transfer`：单个资源的传输及其状态机
//! - `registry`：按标识去重的传输集合
//! - `manager`：生命周期操作、事件路由和通知分发
//! - `actor_manager`：管理器的 actix 包装
//! - `transport`：传输层接口，具体实现见 `crate::transport`

pub mod actor_manager;
pub mod error;
pub mod manager;
pub mod notify;
pub mod placement;
pub mod registry;
pub mod state;
pub mod transfer;
pub mod transport;

// 只导出主流程和其它模块实际用到的类型
pub use actor_manager::{
    AddTransfer, CancelAll, CancelTransfer, GetStats, ListTransfers, PauseAll, PauseTransfer,
    RemoveAll, RemoveTransfer, ResumeAll, StartTransfer, TransferManagerActor,
};
pub use error::{TransferError, TransferResult};
pub use manager::{ManagerStats, TransferManager};
pub use notify::{ManagerObserver, TransferListener, TransferObserver};
pub use placement::{DirectoryPlacement, PlacementPolicy};
pub use state::TransferState;
pub use transfer::{Progress, Transfer, TransferSnapshot};
pub use transport::{Checkpoint, Transport, TransportEvent, TransportHandle};

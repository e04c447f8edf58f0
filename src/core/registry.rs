use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::state::TransferState;
use crate::core::transfer::Transfer;
use crate::core::transport::TransportHandle;

/// 传输注册表：资源标识到传输的映射
///
/// 所有结构性操作共用一把锁，锁只在查找/插入/删除期间持有，
/// 从不跨越对传输层的调用。传输自身调用传输层时也不持有状态锁，
/// 所以按句柄查找只会短暂等待。
#[derive(Default)]
pub struct TransferRegistry {
    transfers: Mutex<HashMap<String, Arc<Transfer>>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地查找或创建，返回传输以及是否为新建
    pub fn find_or_create<F>(&self, identity: &str, factory: F) -> (Arc<Transfer>, bool)
    where
        F: FnOnce() -> Transfer,
    {
        let mut transfers = self.lock();
        if let Some(existing) = transfers.get(identity) {
            return (Arc::clone(existing), false);
        }
        let created = Arc::new(factory());
        transfers.insert(identity.to_string(), Arc::clone(&created));
        (created, true)
    }

    pub fn find_by_identity(&self, identity: &str) -> Option<Arc<Transfer>> {
        self.lock().get(identity).cloned()
    }

    /// 按传输层句柄反查，用于只携带句柄的回调
    pub fn find_by_handle(&self, handle: TransportHandle) -> Option<Arc<Transfer>> {
        self.lock()
            .values()
            .find(|transfer| transfer.matches_handle(handle))
            .cloned()
    }

    pub fn remove(&self, identity: &str) -> Option<Arc<Transfer>> {
        self.lock().remove(identity)
    }

    /// 对快照逐个执行操作；操作执行时不持有注册表锁
    pub fn for_each<F>(&self, mut action: F)
    where
        F: FnMut(&Arc<Transfer>),
    {
        for transfer in self.snapshot() {
            action(&transfer);
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<Transfer>> {
        self.lock().values().cloned().collect()
    }

    pub fn in_state(&self, state: TransferState) -> Vec<Arc<Transfer>> {
        self.lock()
            .values()
            .filter(|transfer| transfer.state() == state)
            .cloned()
            .collect()
    }

    /// 清空注册表并交出所有传输
    pub fn drain(&self) -> Vec<Arc<Transfer>> {
        self.lock().drain().map(|(_, transfer)| transfer).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Transfer>>> {
        self.transfers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

use serde::{Serialize, Deserialize};
use std::fmt;

/// 传输状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransferState {
    #[default]
    Unknown,
    Waiting,
    Transferring,
    Pausing,
    Paused,
    Completed,
    Cancelled,
}

impl TransferState {
    /// 终止状态之后不再有任何转换
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Cancelled)
    }

    /// 传输层是否持有一个活动操作
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransferState::Waiting | TransferState::Transferring | TransferState::Pausing
        )
    }

    /// 状态转换表，未列出的转换一律视为无操作
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        match (self, next) {
            (Unknown, Waiting) | (Paused, Waiting) => true,
            (Waiting, Transferring) => true,
            (Waiting, Pausing) | (Transferring, Pausing) => true,
            (Pausing, Paused) => true,
            (Waiting, Completed) | (Transferring, Completed) | (Pausing, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferState::Unknown => "未开始",
            TransferState::Waiting => "等待中",
            TransferState::Transferring => "下载中",
            TransferState::Pausing => "暂停中",
            TransferState::Paused => "已暂停",
            TransferState::Completed => "已完成",
            TransferState::Cancelled => "已取消",
        };
        f.write_str(label)
    }
}

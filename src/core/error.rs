use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 传输与管理过程中的错误
///
/// 所有错误都只作用于单个传输，由管理器上报给观察者，不会越过管理器边界抛出。
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("服务器错误: HTTP {status}")]
    Server { status: u16 },

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("无法移动已完成的文件 {from} -> {to}: {source}")]
    Placement {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("身份验证失败: {0}")]
    Authentication(String),

    #[error("断点数据无效: {0}")]
    Resume(String),

    #[error("下载超时")]
    Timeout,

    #[error("配置无效: {0}")]
    Config(String),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl TransferError {
    /// 是否值得由传输层重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Network(_) | TransferError::Timeout => true,
            TransferError::Server { status } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::InvalidUrl(_) | TransferError::Config(_) | TransferError::Authentication(_)
        )
    }
}

impl From<String> for TransferError {
    fn from(error: String) -> Self {
        TransferError::Unknown(error)
    }
}

impl From<&str> for TransferError {
    fn from(error: &str) -> Self {
        TransferError::Unknown(error.to_string())
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

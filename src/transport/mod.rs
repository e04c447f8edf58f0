//! 传输层实现：把 `core::transport::Transport` 落到真实的 HTTP 上

pub mod http;
pub mod retry;

pub use http::{HttpTransport, ResumeData};
pub use retry::RetryStrategy;

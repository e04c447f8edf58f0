//! 完成文件的落盘位置
//!
//! 管理器只问“这个文件该放哪儿”，并负责移动；存储策略属于协作者。

use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

use crate::core::error::{TransferError, TransferResult};
use crate::core::transfer::Transfer;

pub trait PlacementPolicy: Send + Sync {
    /// 返回 `None` 表示调用方自行处理文件
    fn decide_placement(&self, transfer: &Transfer, finished_location: &Path) -> Option<PathBuf>;
}

/// 把完成的文件放进固定目录，文件名取自 URL 路径
#[derive(Debug, Clone)]
pub struct DirectoryPlacement {
    dir: PathBuf,
}

impl DirectoryPlacement {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PlacementPolicy for DirectoryPlacement {
    fn decide_placement(&self, transfer: &Transfer, _finished_location: &Path) -> Option<PathBuf> {
        let name = file_name_for(transfer.identity());
        Some(unique_path(&self.dir, &name))
    }
}

/// 从 URL 中推断文件名
pub fn file_name_for(identity: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("静态正则"));

    let candidate = Url::parse(identity)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty());

    match candidate {
        Some(segment) => {
            let decoded = percent_decode(&segment);
            let cleaned = invalid.replace_all(decoded.trim(), "_").to_string();
            if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
                fallback_name()
            } else {
                cleaned
            }
        }
        None => fallback_name(),
    }
}

fn fallback_name() -> String {
    format!("download_{}", chrono::Utc::now().timestamp())
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// 目标已存在时追加 ` (n)`
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|s| s.to_str());
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// 移动文件；跨设备时退回为复制后删除
pub fn move_file(from: &Path, to: &Path) -> TransferResult<()> {
    let wrap = |source: io::Error| TransferError::Placement {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if from.exists() && e.kind() != io::ErrorKind::PermissionDenied => {
            fs::copy(from, to).map_err(wrap)?;
            fs::remove_file(from).map_err(wrap)
        }
        Err(e) => Err(wrap(e)),
    }
}

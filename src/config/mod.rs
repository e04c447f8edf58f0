use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{TransferError, TransferResult};

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 完成文件的存放目录
    pub download_dir: String,
    /// 下载中的临时文件目录
    pub temp_dir: String,
    /// 新建的传输是否立即开始
    pub auto_start: bool,
    /// User-Agent
    pub user_agent: String,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// 进度事件的最小间隔（毫秒）
    pub progress_interval_ms: u64,
    /// 连接失败时的重试次数
    pub retry_count: u32,
    /// 重试延迟（秒）
    pub retry_delay: u64,
    /// 最大重试延迟（秒）
    pub retry_max_delay: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            temp_dir: std::env::temp_dir().join("hawker").display().to_string(),
            auto_start: true,
            user_agent: format!("Hawker/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30,
            progress_interval_ms: 200,
            retry_count: 3,
            retry_delay: 1,
            retry_max_delay: 30,
        }
    }
}

impl Config {
    /// 加载配置文件；文件不存在或格式错误时写入默认配置
    pub fn load(path: &str) -> TransferResult<Self> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    let config = Config::default();
                    config.save_with_tutorial(path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带说明的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> TransferResult<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| TransferError::Config(format!("无法序列化配置: {}", e)))?;
        fs::write(path, format!("{}\n{}", TUTORIAL, config_content))?;
        Ok(())
    }

    /// 校验配置合法性
    pub fn validate(&self) -> TransferResult<()> {
        if self.timeout == 0 {
            return Err(TransferError::Config("超时时间必须大于0".to_string()));
        }
        if self.progress_interval_ms == 0 {
            return Err(TransferError::Config("进度间隔必须大于0".to_string()));
        }
        if self.download_dir.is_empty() {
            return Err(TransferError::Config("下载目录不能为空".to_string()));
        }
        if self.temp_dir.is_empty() {
            return Err(TransferError::Config("临时目录不能为空".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(TransferError::Config("User-Agent 不能为空".to_string()));
        }
        if self.retry_delay > self.retry_max_delay {
            return Err(TransferError::Config("重试延迟不能大于最大重试延迟".to_string()));
        }
        Ok(())
    }

    /// 合并命令行参数到配置，命令行优先
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if args.no_auto_start {
            self.auto_start = false;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn temp_path(&self) -> PathBuf {
        PathBuf::from(&self.temp_dir)
    }

    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 临时目录: {}\n\
            - 自动开始: {}\n\
            - 超时时间: {} 秒\n\
            - 重试次数: {}",
            self.download_dir,
            self.temp_dir,
            if self.auto_start { "启用" } else { "禁用" },
            self.timeout,
            self.retry_count,
        )
    }
}

const TUTORIAL: &str = r#"# Hawker 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# download_dir          完成文件的存放目录（-d 覆盖）
# temp_dir              下载过程中的临时文件目录，暂停的断点也指向这里
# auto_start            新加入的下载是否立即开始（--no-auto-start 关闭）
# user_agent            请求使用的 User-Agent
# timeout               网络超时时间（秒）
# progress_interval_ms  进度刷新的最小间隔（毫秒）
# retry_count           连接失败时的重试次数
# retry_delay           第一次重试前的等待时间（秒），之后指数退避
# retry_max_delay       重试等待的上限（秒）
#
# 使用示例：
#   hawker https://example.com/file.zip
#   hawker -f urls.txt
#   hawker -d /path/to/downloads https://example.com/file.zip
#   hawker -e
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_config_path() -> String {
        std::env::temp_dir()
            .join(format!("hawker-config-{}.toml", Uuid::new_v4()))
            .display()
            .to_string()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.auto_start);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.timeout = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.progress_interval_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry_delay = 60;
        config.retry_max_delay = 10;
        assert!(config.validate().is_err());

        config = Config::default();
        config.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let path = temp_config_path();
        let mut config = Config::default();
        config.auto_start = false;
        config.download_dir = "/srv/files".to_string();

        config.save_with_tutorial(&path).expect("保存配置失败");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Hawker 配置文件"));

        let loaded = Config::load(&path).expect("加载配置失败");
        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_written_with_defaults() {
        let path = temp_config_path();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(Path::new(&path).exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_file_replaced_by_defaults() {
        let path = temp_config_path();
        fs::write(&path, "timeout = \"not a number\"").unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_config_path();
        fs::write(&path, "auto_start = false\n").unwrap();
        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.auto_start);
        assert_eq!(loaded.timeout, Config::default().timeout);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_config_summary() {
        let summary = Config::default().get_summary();
        assert!(summary.contains("配置摘要"));
        assert!(summary.contains("下载目录"));
        assert!(summary.contains("自动开始: 启用"));
    }
}

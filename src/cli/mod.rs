//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`hawker <url>`
//! - 批量下载：`hawker -f urls.txt`
//! - 编辑配置：`hawker -e`
//! - 指定配置：`hawker -c hawker.toml <url>`
//! - 手动开始：`hawker --no-auto-start <url>`，之后按 `r` 开始
//! - 输出报告：`hawker --report report.json <url>`
//!
//! ## 默认配置路径
//!
//! - Windows: `%APPDATA%/hawker/hawker.toml`
//! - macOS: `~/Library/Application Support/hawker/hawker.toml`
//! - Linux: `~/.config/hawker/hawker.toml`

use clap::Parser;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::error::{TransferError, TransferResult};

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/hawker/hawker.toml", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/hawker/hawker.toml", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/hawker/hawker.toml", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，其次 xdg-open，最后 nano
        let editor = env::var("EDITOR").ok();
        let opened = match editor {
            Some(editor) => std::process::Command::new(editor).arg(config_path).status().is_ok(),
            None => std::process::Command::new("xdg-open").arg(config_path).status().is_ok(),
        };
        if !opened {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// Hawker 命令行参数
///
/// 示例用法：
///   hawker https://example.com/file.zip
///   hawker -e  # 编辑配置文件
///   hawker -c /path/to/hawker.toml https://example.com/file.zip
///
/// 更多用法请加 --help 查看
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hawker",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    about = "一个用 Rust 编写的可暂停、可续传的下载管理器",
    long_about = "按 URL 去重管理下载，支持暂停/恢复（断点续传）、取消和实时进度显示。\n\n运行中按键：p 暂停全部，r 恢复全部，c 取消全部，q 退出。\n\n示例：\n  hawker https://example.com/file.zip\n  hawker -e\n  hawker -d /path/to/downloads -f urls.txt\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    /// 包含URL列表的文件路径
    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL，# 开头为注释。")]
    pub file: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 指定下载目录
    #[arg(long, short = 'd', help = "指定完成文件的存放目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 不自动开始
    #[arg(long = "no-auto-start", help = "新加入的下载保持未开始状态，按 r 后才开始。")]
    pub no_auto_start: bool,

    /// 结束时写出 JSON 报告
    #[arg(long, help = "结束时把所有传输的状态写成 JSON 报告。")]
    pub report: Option<String>,
}

impl Args {
    /// 解析命令行参数并加载配置；`-e` 时打开编辑器后退出
    pub fn parse_args() -> TransferResult<(Self, Config)> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> TransferResult<Config> {
        let mut config = Config::load(&self.config)
            .map_err(|e| TransferError::Config(format!("无法读取配置文件 {}: {}", self.config, e)))?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    /// 合并命令行和文件中的URL，保持顺序并去掉重复项
    pub fn get_urls(&self) -> TransferResult<Vec<String>> {
        let mut urls: Vec<String> = Vec::new();
        let mut push = |url: &str| {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        };

        for url in &self.urls {
            if !crate::utils::validator::is_valid_url(url) {
                return Err(TransferError::InvalidUrl(url.clone()));
            }
            push(url);
        }

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| TransferError::Config(format!("无法读取URL文件 {}: {}", file_path, e)))?;

            // 按行读取URL，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    if !crate::utils::validator::is_valid_url(line) {
                        return Err(TransferError::InvalidUrl(line.to_string()));
                    }
                    push(line);
                }
            }
        }

        if urls.is_empty() {
            return Err(TransferError::InvalidUrl(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。".to_string(),
            ));
        }

        Ok(urls)
    }
}

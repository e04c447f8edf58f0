use actix::prelude::*;
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode},
};
use log::LevelFilter;
use std::sync::Arc;
use tokio::sync::mpsc;

use hawker::cli;
use hawker::core::{
    AddTransfer, CancelAll, DirectoryPlacement, GetStats, ListTransfers, PauseAll, ResumeAll,
    TransferManager, TransferManagerActor,
};
use hawker::transport::HttpTransport;
use hawker::ui::{self, DownloadSummary, ProgressManager};
use hawker::utils::logger::{self, FlushLog, LoggerActor, LoggerExt};

const PROGRESS_UPDATE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
const KEYBOARD_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);
const LOG_FILE: &str = "logs/hawker.log";
const LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    let log_addr = logger::init(LOG_FILE, LevelFilter::Info, LOG_MAX_SIZE)?;
    log::info!(
        "程序启动 v{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    );

    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            log_addr.error(&format!("参数解析失败: {}", e));
            ui::print_error(&format!("参数解析失败: {}", e));
            std::process::exit(1);
        }
    };

    let urls = match args.get_urls() {
        Ok(urls) => urls,
        Err(e) => {
            log_addr.error(&format!("获取URL列表失败: {}", e));
            ui::print_error(&format!("获取URL列表失败: {}", e));
            std::process::exit(1);
        }
    };

    log::info!("解析到的URLs: {:?}", urls);
    log::info!("配置文件路径: {}", args.config);
    println!("{}", config.get_summary());

    // 组装传输层、管理器和 Actor
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(HttpTransport::new(&config, event_tx));
    let manager = Arc::new(
        TransferManager::new(config.clone(), transport.clone())
            .with_placement(Arc::new(DirectoryPlacement::new(&config.download_dir))),
    );
    let progress = Arc::new(ProgressManager::new());
    manager.set_observer(progress.clone());
    let manager_addr = TransferManagerActor::new(Arc::clone(&manager))
        .with_events(event_rx)
        .start();

    let mut added = 0;
    for url in &urls {
        match manager_addr.send(AddTransfer { identity: url.clone() }).await? {
            Ok(transfer) => {
                progress.track(transfer.identity());
                added += 1;
            }
            Err(e) => {
                log::error!("添加下载失败: {} - {}", url, e);
                ui::print_error(&format!("添加下载失败: {} - {}", url, e));
            }
        }
    }

    if added == 0 {
        ui::print_error("没有可下载的任务");
        return Ok(());
    }

    if config.auto_start {
        println!("\n开始下载... (按 'p' 暂停, 'r' 恢复, 'c' 取消, 'q' 退出)");
    } else {
        println!("\n已添加 {} 个下载，按 'r' 开始 ('q' 退出)", added);
    }

    run_download_loop(&manager_addr, &manager, &transport, &progress, &log_addr).await?;

    // 显示最终统计
    let final_stats = manager_addr.send(GetStats).await?;
    let completed_bytes: u64 = manager_addr
        .send(ListTransfers)
        .await?
        .iter()
        .filter(|snapshot| snapshot.state == hawker::core::TransferState::Completed)
        .map(|snapshot| snapshot.written)
        .sum();
    let failed = progress.failed_count();
    let summary = DownloadSummary {
        total_files: final_stats.total,
        total_size: completed_bytes,
        elapsed_time: progress.elapsed_time(),
        success_count: final_stats.completed,
        failed_count: failed,
        cancelled_count: final_stats.cancelled.saturating_sub(failed),
        paused_count: final_stats.paused,
    };
    println!("{}", summary);
    log::info!(
        "下载结束 - 成功: {}, 失败: {}, 取消: {}",
        summary.success_count,
        summary.failed_count,
        summary.cancelled_count
    );

    if let Some(path) = &args.report {
        let report = manager_addr.send(ListTransfers).await?;
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        ui::print_success(&format!("报告已写入 {}", path));
    }

    log_addr.send(FlushLog).await?;
    Ok(())
}

/// 运行下载主循环
async fn run_download_loop(
    manager_addr: &Addr<TransferManagerActor>,
    manager: &TransferManager,
    transport: &HttpTransport,
    progress: &ProgressManager,
    log_addr: &Addr<LoggerActor>,
) -> anyhow::Result<()> {
    let mut last_update = std::time::Instant::now();

    // 设置终端
    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), cursor::Hide)?;

    let result = async {
        loop {
            // 处理键盘输入
            if let Ok(true) = event::poll(KEYBOARD_POLL_INTERVAL) {
                if let Ok(Event::Key(key_event)) = event::read() {
                    match key_event.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => {
                            progress.println("用户退出");
                            log_addr.info("用户主动退出");
                            manager_addr.send(CancelAll).await?;
                            break;
                        }
                        KeyCode::Char('p') | KeyCode::Char('P') => {
                            manager_addr.send(PauseAll).await?;
                            progress.println("已暂停所有下载");
                            log::info!("用户暂停所有下载");
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            manager_addr.send(ResumeAll).await?;
                            progress.println("已恢复所有下载");
                            log::info!("用户恢复所有下载");
                        }
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            manager_addr.send(CancelAll).await?;
                            progress.println("已取消所有下载");
                            log::info!("用户取消所有下载");
                        }
                        _ => {}
                    }
                }
            }

            if last_update.elapsed() >= PROGRESS_UPDATE_INTERVAL {
                // 失败的传输不会再有进展，取消后计入结束
                for identity in progress.take_failures() {
                    manager.cancel(&identity);
                }

                // 全部结束且传输层已清空；从未启动过操作时不会收到清空通知
                let idle = progress.is_drained() || transport.active_operations() == 0;
                if idle && manager.pending_count() == 0 {
                    break;
                }
                last_update = std::time::Instant::now();
            }

            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    // 恢复终端
    execute!(std::io::stdout(), cursor::Show)?;
    terminal::disable_raw_mode()?;
    progress.finish();

    result
}

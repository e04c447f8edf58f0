use actix::prelude::*;
use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// 日志消息
pub struct LogMsg {
    pub level: Level,
    pub target: String,
    pub message: String,
}
impl Message for LogMsg { type Result = (); }

/// 刷新缓冲区，退出前使用
pub struct FlushLog;
impl Message for FlushLog { type Result = (); }

/// 日志Actor，写文件并按大小轮转
pub struct LoggerActor {
    writer: BufWriter<File>,
    file_path: String,
    max_size: u64,
    current_size: u64,
}

impl LoggerActor {
    pub fn new(file_path: &str, max_size: u64) -> Result<Self, std::io::Error> {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            writer: BufWriter::new(file),
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    /// 超过上限时把当前文件改名为 `.backup` 并重新打开
    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size > self.max_size {
            self.writer.flush()?;
            let backup_path = format!("{}.backup", self.file_path);
            if Path::new(&backup_path).exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;

            let file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
            self.writer = BufWriter::new(file);
            self.current_size = 0;
        }
        Ok(())
    }

    fn write_log(&mut self, msg: &LogMsg) -> Result<(), std::io::Error> {
        let log_entry = format!(
            "{} [{}] {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            msg.level,
            msg.target,
            msg.message
        );
        self.check_rotation()?;
        self.writer.write_all(log_entry.as_bytes())?;
        self.current_size += log_entry.len() as u64;
        if msg.level <= Level::Warn {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let _ = self.writer.flush();
    }
}

impl Handler<LogMsg> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: LogMsg, _ctx: &mut Self::Context) {
        if let Err(e) = self.write_log(&msg) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

impl Handler<FlushLog> for LoggerActor {
    type Result = ();
    fn handle(&mut self, _msg: FlushLog, _ctx: &mut Self::Context) {
        if let Err(e) = self.writer.flush() {
            eprintln!("日志刷新失败: {}", e);
        }
    }
}

/// `log` 门面的实现，把记录转发给 LoggerActor
pub struct ActorLogger {
    addr: Addr<LoggerActor>,
    level: LevelFilter,
}

impl Log for ActorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.addr.do_send(LogMsg {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {
        self.addr.do_send(FlushLog);
    }
}

/// 启动日志 Actor 并注册为全局 logger，需要在 actix System 内调用
pub fn init(file_path: &str, level: LevelFilter, max_size: u64) -> Result<Addr<LoggerActor>, std::io::Error> {
    let addr = LoggerActor::new(file_path, max_size)?.start();
    let logger = ActorLogger { addr: addr.clone(), level };
    let logger: &'static ActorLogger = Box::leak(Box::new(logger));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
    Ok(addr)
}

// 便捷的日志方法 - 为Addr<LoggerActor>提供扩展方法
pub trait LoggerExt {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
}

impl LoggerExt for Addr<LoggerActor> {
    fn info(&self, message: &str) {
        self.do_send(LogMsg { level: Level::Info, target: "hawker".to_string(), message: message.to_string() });
    }

    fn error(&self, message: &str) {
        self.do_send(LogMsg { level: Level::Error, target: "hawker".to_string(), message: message.to_string() });
    }

    fn warn(&self, message: &str) {
        self.do_send(LogMsg { level: Level::Warn, target: "hawker".to_string(), message: message.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_log_path() -> String {
        std::env::temp_dir()
            .join(format!("hawker-log-{}/app.log", Uuid::new_v4()))
            .display()
            .to_string()
    }

    #[test]
    fn test_write_and_rotate() {
        let path = temp_log_path();
        let mut logger = LoggerActor::new(&path, 64).unwrap();
        let msg = LogMsg {
            level: Level::Warn,
            target: "test".to_string(),
            message: "x".repeat(80),
        };
        logger.write_log(&msg).unwrap();
        logger.write_log(&msg).unwrap();
        logger.writer.flush().unwrap();

        assert!(Path::new(&format!("{}.backup", path)).exists());
        let current = std::fs::read_to_string(&path).unwrap();
        assert!(current.contains("[WARN] test"));
        let _ = std::fs::remove_dir_all(Path::new(&path).parent().unwrap());
    }

    #[actix_rt::test]
    async fn test_actor_accepts_messages() {
        let path = temp_log_path();
        let addr = LoggerActor::new(&path, 1024 * 1024).unwrap().start();
        addr.info("启动");
        addr.send(FlushLog).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("启动"));
        let _ = std::fs::remove_dir_all(Path::new(&path).parent().unwrap());
    }
}

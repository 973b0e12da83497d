//! 带超时的外部命令执行。
//!
//! 实现策略：
//! - stdout/stderr 由独立线程读取，避免输出较多（例如 pip）时管道写满导致子进程阻塞
//! - 超时后杀掉子进程并返回 [`RunError::TimedOut`]；读取线程不再等待（孙进程可能仍持有管道）
//! - 子进程退出后读取线程最多再等到截止时间（且不超过 [`DRAIN_MAX`]），之后取走已读到的部分输出
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// 子进程退出后等待管道读完的时间下限/上限。
const DRAIN_MIN: Duration = Duration::from_millis(200);
pub const DRAIN_MAX: Duration = Duration::from_secs(5);

/// 命令输出。
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("启动命令失败: {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("命令执行超时（{timeout:?}）: {program}")]
    TimedOut { program: String, timeout: Duration },
    #[error("等待命令失败: {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// 执行命令并在超时后终止。
///
/// 参数：
/// - `cmd`：已设置好参数/工作目录的命令（stdin 会被置空）
/// - `timeout`：最长执行时间
///
/// 返回值：
/// - 子进程已退出：返回退出状态与输出（不论退出码是否为 0）
///
/// 异常处理：
/// - 启动失败、等待失败或超时返回 [`RunError`]
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput, RunError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    debug!("执行命令: {cmd:?}");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!("命令超时，终止进程: {program}");
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunError::TimedOut { program, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                return Err(RunError::Wait { program, source });
            }
        }
    };

    let drain = deadline
        .saturating_duration_since(Instant::now())
        .clamp(DRAIN_MIN, DRAIN_MAX);
    let drain_deadline = Instant::now() + drain;
    Ok(CommandOutput {
        status,
        stdout: collect_reader(stdout_reader, drain_deadline),
        stderr: collect_reader(stderr_reader, drain_deadline),
    })
}

/// 后台读取的管道：已读到的字节与读到 EOF 的通知。
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let shared = buf.clone();
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => match shared.lock() {
                    Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                },
            }
        }
        let _ = tx.send(());
    });
    PipeReader { buf, done }
}

/// 等待读取线程结束（最晚到 `deadline`），返回已读到的内容。
///
/// 说明：
/// - 孙进程继承管道时 EOF 可能迟迟不来，到期后不再等待，读取线程随管道关闭自行退出
fn collect_reader(reader: Option<PipeReader>, deadline: Instant) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let wait = deadline.saturating_duration_since(Instant::now());
    if reader.done.recv_timeout(wait).is_err() {
        debug!("管道在子进程退出后仍未关闭，返回已读取的部分输出");
    }
    reader
        .buf
        .lock()
        .map(|b| String::from_utf8_lossy(&b).to_string())
        .unwrap_or_default()
}

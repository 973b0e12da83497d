//! 跨进程更新锁（`flock(LOCK_EX | LOCK_NB)`）。
//!
//! 说明：
//! - 代理的定时更新与 CLI 的手动更新是两个进程，需要文件锁互斥
//! - 进程异常退出时内核自动释放 flock，不会留下死锁文件
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rvm_core::lock::{RunGuard, RunLock};
use rvm_core::paths;

#[derive(Debug, Clone)]
pub struct FileRunLock {
    path: PathBuf,
}

impl FileRunLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RunLock for FileRunLock {
    fn try_acquire(&self) -> Result<Option<RunGuard>> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("打开锁文件失败: {}", self.path.display()))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Ok(None);
            }
            return Err(err).with_context(|| format!("加锁失败: {}", self.path.display()));
        }
        Ok(Some(RunGuard::new(move || unlock(file))))
    }
}

fn unlock(file: File) {
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
    drop(file);
}

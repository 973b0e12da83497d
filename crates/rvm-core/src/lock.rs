//! 更新运行锁（单次飞行：同一时刻只允许一次更新执行）。
//!
//! 说明：
//! - 锁被占用时调用方直接放弃，不排队
//! - [`RunGuard`] 在析构时释放锁，保证所有分支（成功/失败/panic）都会释放
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

/// 运行锁的持有凭证，析构即释放。
pub struct RunGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RunGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// 单持有者锁。
pub trait RunLock: Send + Sync {
    /// 尝试获取锁。
    ///
    /// 返回值：
    /// - `Ok(Some(guard))`：获取成功
    /// - `Ok(None)`：锁已被其他执行持有
    ///
    /// 异常处理：
    /// - 锁本身的 IO 错误返回 `Err`（调用方不得在无锁状态下继续执行）
    fn try_acquire(&self) -> Result<Option<RunGuard>>;
}

/// 进程内锁（原子标志）。
#[derive(Debug, Clone, Default)]
pub struct ProcessRunLock {
    held: Arc<AtomicBool>,
}

impl ProcessRunLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl RunLock for ProcessRunLock {
    fn try_acquire(&self) -> Result<Option<RunGuard>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let held = self.held.clone();
        Ok(Some(RunGuard::new(move || held.store(false, Ordering::SeqCst))))
    }
}

/// 组合锁：依次获取全部子锁，任一失败则释放已获取的部分。
///
/// 典型用法：进程内原子标志 + 跨进程文件锁（代理与 CLI 同时触发更新时互斥）。
pub struct LockChain {
    locks: Vec<Arc<dyn RunLock>>,
}

impl LockChain {
    pub fn new(locks: Vec<Arc<dyn RunLock>>) -> Self {
        Self { locks }
    }
}

impl RunLock for LockChain {
    fn try_acquire(&self) -> Result<Option<RunGuard>> {
        let mut guards = Vec::with_capacity(self.locks.len());
        for lock in &self.locks {
            match lock.try_acquire()? {
                Some(g) => guards.push(g),
                None => return Ok(None),
            }
        }
        // 按获取的逆序释放。
        Ok(Some(RunGuard::new(move || {
            while let Some(g) = guards.pop() {
                drop(g);
            }
        })))
    }
}

//! 基于 `git` 的源码拉取（更新编排器的版本控制协作者）。
//!
//! 行为：
//! - 记录拉取前的 HEAD，执行 `git pull --ff-only <remote> <branch>`，再读取新的 HEAD
//! - 只允许快进合并：本地存在分叉提交时拉取失败，工作区保持原状
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rvm_core::update::{FetchReport, SourceFetcher};
use tracing::info;

use crate::process::run_with_timeout;

/// `git rev-parse` 等本地操作的超时。
const LOCAL_GIT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GitFetcher {
    pub repo_dir: PathBuf,
    pub remote: String,
    pub branch: String,
    pub timeout: Duration,
}

impl GitFetcher {
    pub fn new(repo_dir: PathBuf, remote: &str, branch: &str, timeout: Duration) -> Self {
        Self {
            repo_dir,
            remote: remote.to_string(),
            branch: branch.to_string(),
            timeout,
        }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo_dir);
        // 以 root 运行时仓库属主通常是普通用户，显式放行该目录。
        cmd.arg("-c")
            .arg(format!("safe.directory={}", self.repo_dir.display()));
        cmd
    }

    fn head(&self) -> Result<String> {
        let mut cmd = self.git();
        cmd.args(["rev-parse", "HEAD"]);
        let out = run_with_timeout(&mut cmd, LOCAL_GIT_TIMEOUT).context("读取 HEAD 失败")?;
        if !out.success() {
            return Err(anyhow!("git rev-parse HEAD 失败: {}", out.stderr.trim()));
        }
        Ok(out.stdout.trim().to_string())
    }
}

impl SourceFetcher for GitFetcher {
    fn fetch(&self) -> Result<FetchReport> {
        let previous = self.head()?;
        info!("git pull {} {}（当前 {previous}）", self.remote, self.branch);

        let mut cmd = self.git();
        cmd.args(["pull", "--ff-only", &self.remote, &self.branch]);
        let out = run_with_timeout(&mut cmd, self.timeout).context("git pull 失败")?;
        if !out.success() {
            return Err(anyhow!(
                "git pull 退出码异常 ({}): {}",
                out.code(),
                out.stderr.trim()
            ));
        }

        let current = self.head()?;
        Ok(FetchReport { previous, current })
    }
}

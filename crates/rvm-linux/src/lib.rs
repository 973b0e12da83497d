//! Linux 平台能力封装（systemd、权限、git、pip、文件锁、单元安装）。
//!
//! 目标：
//! - 将 systemctl/git/pip 等系统命令集中封装，避免上层业务代码直接拼接命令行
//! - 以 `rvm-core` 中的 trait 形式对外提供能力，便于测试时替换
//! - 统一错误处理风格（以 `anyhow::Result` 形式向上返回，在 trait 边界转换为核心错误类型）
//!
//! 安全注意：
//! - 服务控制、单元安装、依赖安装通常需要 root 权限
//! - 所有外部命令都带超时，避免卡住心跳周期
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod elevation;
pub mod git;
pub mod lock;
pub mod pip;
pub mod process;
pub mod runtime;
pub mod systemd;
pub mod units;

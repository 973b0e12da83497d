//! MyRVM Edge 边缘代理核心库（与操作系统解耦）。
//!
//! 功能：
//! - 定义受管服务注册表与服务管理器能力接口（[`service::ServiceManager`]）
//! - 服务控制器、状态探测器、更新编排器、远程命令处理器、Day-0 重置
//! - 配置文件模型（agent-config.json）、版本记录、目录约定
//! - 本机 IPC 请求/响应协议（供外部心跳上报进程调用）
//!
//! 约定：
//! - 本 crate 不直接调用 systemctl/git/pip 等系统命令，全部经由 trait 注入，便于测试替身
//! - 组件返回结构化结果，由顶层 CLI/代理决定如何输出或重试
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod command;
pub mod config;
pub mod controller;
pub mod ipc;
pub mod lock;
pub mod paths;
pub mod privilege;
pub mod prober;
pub mod reset;
pub mod service;
pub mod unit;
pub mod update;
pub mod version;

//! 边缘代理守护进程（systemd 服务形态）。
//!
//! 职责：
//! - 定时执行自动更新（拉取源码、按需重装依赖、重启主服务）
//! - 在本机 Unix socket 上接收外部心跳上报进程转发的远程命令，返回执行结果与当前版本号
//!
//! 并发模型：
//! - 定时器与 IPC 各自一条逻辑执行线；阻塞的系统调用放在 `spawn_blocking` 中
//! - 两者可能同时触发更新，由更新锁保证同一时刻只有一次更新执行
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rvm_core::config::AgentConfig;
use rvm_core::ipc::{self, IpcEndpoint, IpcRequest, IpcResponse};
use rvm_core::paths;
use rvm_core::update::{UpdateOrchestrator, UpdateTrigger};
use rvm_core::version::VersionInfo;
use rvm_linux::elevation;
use rvm_linux::runtime::EdgeRuntime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 运行参数。
///
/// 说明：
/// - `--config`：配置文件路径（不存在时使用默认配置）
/// - `--once`：执行一次更新后退出（用于调试与 systemd timer 场景）
#[derive(Debug, Parser)]
#[command(name = "rvm-agent", version)]
struct Args {
    #[arg(long, default_value = "agent-config.json")]
    config: PathBuf,

    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = AgentConfig::load(&args.config)?;
    let runtime = EdgeRuntime::build(config, elevation::current_privilege())?;
    if !runtime.controller.privilege().is_elevated() {
        warn!("当前未以 root 运行：服务控制与自动更新将被拒绝");
    }
    info!(
        "rvm-agent 启动，项目目录 {}，版本 {}",
        runtime.layout.root().display(),
        VersionInfo::current_or_unknown(runtime.layout.root())
    );

    if args.once {
        let orchestrator = runtime.orchestrator.clone();
        let run =
            tokio::task::spawn_blocking(move || orchestrator.run_update(UpdateTrigger::Timer))
                .await?;
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    let socket_path = runtime.config.ipc.socket_path.clone();
    let timer = tokio::spawn(update_timer(
        runtime.orchestrator.clone(),
        runtime.config.update_interval(),
    ));
    let mut server = tokio::spawn(serve_ipc(
        runtime.ipc_endpoint(),
        socket_path.clone(),
        runtime.config.command_timeout(),
    ));

    let result = tokio::select! {
        _ = shutdown_signal() => {
            info!("收到停止信号，退出");
            Ok(())
        }
        res = &mut server => match res {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Ok(()),
            Err(e) => Err(e.into()),
        },
    };

    timer.abort();
    server.abort();
    let _ = std::fs::remove_file(&socket_path);
    result
}

/// 等待 Ctrl-C 或 SIGTERM（systemd stop）。
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("注册 SIGTERM 失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// 定时更新循环：首次在一个周期后触发，错过的周期直接跳过。
async fn update_timer(orchestrator: Arc<UpdateOrchestrator>, period: Duration) {
    info!("自动更新周期: {period:?}");
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let orchestrator = orchestrator.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || orchestrator.run_update(UpdateTrigger::Timer)).await
        {
            error!("定时更新任务异常退出: {e}");
        }
    }
}

/// 在 Unix socket 上提供 IPC 服务。
///
/// 异常处理：
/// - 创建目录/绑定 socket 失败返回错误（代理随之退出，由 systemd 拉起重试）
/// - 单个连接的错误只记录日志
async fn serve_ipc(endpoint: IpcEndpoint, socket_path: PathBuf, timeout: Duration) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        paths::ensure_dir(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("删除残留 socket 失败: {}", socket_path.display()))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("监听 socket 失败: {}", socket_path.display()))?;
    info!("IPC 监听: {}", socket_path.display());

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("接受 IPC 连接失败: {e}");
                continue;
            }
        };
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(endpoint, stream, timeout).await {
                warn!("IPC 连接异常: {e:#}");
            }
        });
    }
}

async fn handle_connection(endpoint: IpcEndpoint, stream: UnixStream, timeout: Duration) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match ipc::decode_line::<IpcRequest>(&line) {
            Ok(request) => respond(&endpoint, request, timeout).await,
            Err(e) => IpcResponse::Error {
                request_id: Uuid::nil(),
                message: e.to_string(),
            },
        };
        writer.write_all(ipc::encode_line(&response)?.as_bytes()).await?;
    }
    Ok(())
}

/// 在阻塞线程池中处理请求，并施加超时。
///
/// 超时后请求仍在后台执行完毕（处理器保持忙碌，期间到达的命令会被丢弃），结果随下一次心跳上报。
async fn respond(endpoint: &IpcEndpoint, request: IpcRequest, timeout: Duration) -> IpcResponse {
    let request_id = request.request_id();
    let endpoint = endpoint.clone();
    let task = tokio::task::spawn_blocking(move || endpoint.handle(request));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => IpcResponse::Error {
            request_id,
            message: format!("处理请求失败: {e}"),
        },
        Err(_) => IpcResponse::Error {
            request_id,
            message: format!("请求处理超时（{timeout:?}）"),
        },
    }
}

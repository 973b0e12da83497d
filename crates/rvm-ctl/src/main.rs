//! 运维命令行工具（rvm-ctl）。
//!
//! 职责：
//! - 对全部受管服务执行开启/关闭/重启/开机自启设置，并输出逐服务结果
//! - 查询服务状态、手动触发更新、Day-0 重置、安装 systemd 单元文件
//! - 通过本机 socket 向代理转发远程命令（或 `--local` 在本进程内执行）
//!
//! 权限要求：
//! - 除 `status`/`doctor`/`send` 外的子命令都需要 root 权限（sudo 运行）
//!
//! 退出码：
//! - 任一服务操作失败、更新失败、重置未完成时返回非 0
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rvm_core::command::{CommandOutcome, RemoteCommand};
use rvm_core::controller::TargetState;
use rvm_core::ipc::{self, IpcRequest, IpcResponse};
use rvm_core::reset::ResetOutcome;
use rvm_core::update::UpdateTrigger;
use rvm_core::version::VersionInfo;
use rvm_linux::elevation;
use rvm_linux::runtime::EdgeRuntime;
use rvm_linux::units;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// 命令行参数。
///
/// 说明：
/// - `config` 指向代理配置文件（默认 `agent-config.json`，不存在时使用默认配置）
#[derive(Debug, Parser)]
#[command(name = "rvm-ctl", version)]
struct Cli {
    #[arg(long, default_value = "agent-config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// rvm-ctl 支持的子命令。
#[derive(Debug, Subcommand)]
enum Commands {
    /// 启动全部受管服务。
    On,
    /// 停止全部受管服务。
    Off,
    /// 重启全部受管服务。
    Restart,
    /// 输出全部受管服务的状态（不做系统修改）。
    Status,
    /// 设置全部受管服务开机自启。
    Enable,
    /// 取消全部受管服务开机自启。
    Disable,
    /// 交互式菜单（开启/关闭/重启/状态/退出）。
    Menu,
    /// 手动执行一次更新。
    Update,
    /// Day-0 重置：删除设备凭据并重新进入配网流程。
    #[command(name = "reset-day0")]
    ResetDay0 {
        /// 跳过交互确认。
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// 渲染并安装 systemd 单元文件，然后按配置设置开机自启。
    InstallUnits,
    /// 分派一条远程命令（`GIT_PULL` / `RESTART` / 其他视为空操作）。
    Send {
        token: String,
        /// 不经过代理，在本进程内直接执行。
        #[arg(long, default_value_t = false)]
        local: bool,
    },
    /// 环境自检。
    Doctor,
}

/// 程序入口：解析参数、装配组件并分发子命令。
///
/// 异常处理：
/// - 子命令失败返回 `Err`，进程以非 0 退出码结束
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = rvm_core::config::AgentConfig::load(&cli.config)?;
    let runtime = EdgeRuntime::build(config, elevation::current_privilege())?;

    match cli.command {
        Commands::On => apply_all(&runtime, TargetState::Started),
        Commands::Off => apply_all(&runtime, TargetState::Stopped),
        Commands::Restart => apply_all(&runtime, TargetState::Restarted),
        Commands::Enable => apply_all(&runtime, TargetState::Enabled),
        Commands::Disable => apply_all(&runtime, TargetState::Disabled),
        Commands::Status => {
            print_status(&runtime);
            Ok(())
        }
        Commands::Menu => menu(&runtime),
        Commands::Update => update(&runtime),
        Commands::ResetDay0 { yes } => reset_day0(&runtime, yes),
        Commands::InstallUnits => install_units(&runtime),
        Commands::Send { token, local } => send(&runtime, &token, local),
        Commands::Doctor => doctor(&runtime),
    }
}

/// 对全部受管服务执行一次状态变更，逐服务输出结果。
///
/// 参数：
/// - `runtime`：已装配的组件
/// - `target`：目标状态
///
/// 异常处理：
/// - 无 root 权限：返回错误（未做任何系统调用）
/// - 任一服务结果为失败：输出全部结果后返回错误
fn apply_all(runtime: &EdgeRuntime, target: TargetState) -> Result<()> {
    let reports = runtime.controller.set_all(target)?;
    let mut failed = 0usize;
    for r in &reports {
        println!("{} {} = {}", target, r.service, r.outcome);
        if r.outcome.is_failure() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{target}: {failed} 个服务操作失败");
    }
    Ok(())
}

fn print_status(runtime: &EdgeRuntime) {
    for s in runtime.controller.status_all() {
        println!("{} ({}) = {}", s.service, s.unit, s.state);
    }
}

/// 交互式菜单。
///
/// 说明：
/// - 单项操作失败只输出错误，菜单继续
/// - 输入 `0`、`q` 或 stdin 结束时退出
fn menu(runtime: &EdgeRuntime) -> Result<()> {
    let stdin = std::io::stdin();
    loop {
        println!();
        println!("1) 开启服务");
        println!("2) 关闭服务");
        println!("3) 重启服务");
        println!("4) 查看状态");
        println!("0) 退出");
        print!("请选择: ");
        std::io::stdout().flush().context("刷新输出失败")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("读取输入失败")? == 0 {
            return Ok(());
        }
        let result = match line.trim() {
            "1" => apply_all(runtime, TargetState::Started),
            "2" => apply_all(runtime, TargetState::Stopped),
            "3" => apply_all(runtime, TargetState::Restarted),
            "4" => {
                print_status(runtime);
                Ok(())
            }
            "0" | "q" | "Q" => return Ok(()),
            other => {
                println!("无效选项: {other}");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("操作失败: {e:#}");
        }
    }
}

fn update(runtime: &EdgeRuntime) -> Result<()> {
    let run = runtime.orchestrator.run_update(UpdateTrigger::Manual);
    print_json(&run)?;
    if !run.outcome.is_success() {
        bail!("更新未成功: {}", run.outcome.as_str());
    }
    Ok(())
}

/// Day-0 重置（删除凭据后重新拉起主服务）。
///
/// 异常处理：
/// - 未确认/无 root 权限：返回错误，不做任何修改
/// - 停止失败中止、凭据未全部删除、重置后启动失败：输出报告后返回错误
fn reset_day0(runtime: &EdgeRuntime, yes: bool) -> Result<()> {
    let confirmed = yes || confirm_reset(runtime)?;
    let report = runtime.reset.reset_to_day0(confirmed)?;
    print_json(&report)?;
    if report.outcome != ResetOutcome::Completed {
        bail!("Day-0 重置未完成");
    }
    if let Some(restart) = report.restart.as_ref().filter(|o| o.is_failure()) {
        bail!("Day-0 重置后启动主服务失败: {restart}");
    }
    Ok(())
}

fn confirm_reset(runtime: &EdgeRuntime) -> Result<bool> {
    println!("该操作将删除以下设备凭据并重新进入配网流程：");
    for path in runtime.reset.secrets().files() {
        println!("  {}", path.display());
    }
    print!("输入 yes 确认: ");
    std::io::stdout().flush().context("刷新输出失败")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("读取输入失败")?;
    Ok(line.trim() == "yes")
}

fn install_units(runtime: &EdgeRuntime) -> Result<()> {
    let systemd = &runtime.config.systemd;
    let user = units::resolve_service_user(systemd.service_user.as_deref())?;
    let report = units::install_units(
        &runtime.controller,
        runtime.manager.as_ref(),
        runtime.layout.root(),
        &systemd.unit_dir,
        &user,
    )?;
    for path in &report.written {
        println!("written {}", path.display());
    }
    let mut failed = 0usize;
    for r in &report.boot_setting {
        println!("boot {} = {}", r.service, r.outcome);
        if r.outcome.is_failure() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} 个服务开机自启设置失败");
    }
    Ok(())
}

/// 分派一条远程命令。
///
/// 说明：
/// - 默认经代理 socket 转发（与心跳上报进程走同一通道，共享更新锁与忙碌状态）
/// - `--local` 在本进程内执行（代理未运行时使用）
fn send(runtime: &EdgeRuntime, token: &str, local: bool) -> Result<()> {
    let report = if local {
        runtime.processor.dispatch(RemoteCommand::parse(token))
    } else {
        match request_agent(runtime, token)? {
            IpcResponse::CommandResult { report, .. } => report,
            IpcResponse::Error { message, .. } => bail!("代理返回错误: {message}"),
            other => bail!("代理返回了意外的响应: {other:?}"),
        }
    };
    print_json(&report)?;
    if let CommandOutcome::Failed { reason } = &report.outcome {
        bail!("命令执行失败: {reason}");
    }
    Ok(())
}

fn request_agent(runtime: &EdgeRuntime, token: &str) -> Result<IpcResponse> {
    let socket_path = &runtime.config.ipc.socket_path;
    let mut stream = UnixStream::connect(socket_path)
        .with_context(|| format!("连接代理失败: {}（可使用 --local）", socket_path.display()))?;
    stream
        .set_read_timeout(Some(runtime.config.command_timeout() + Duration::from_secs(5)))
        .context("设置读取超时失败")?;

    let request = IpcRequest::Dispatch {
        request_id: Uuid::new_v4(),
        command: token.to_string(),
    };
    info!("发送命令到代理: {token}");
    stream
        .write_all(ipc::encode_line(&request)?.as_bytes())
        .context("发送请求失败")?;

    let mut line = String::new();
    BufReader::new(&stream)
        .read_line(&mut line)
        .context("读取响应失败")?;
    if line.trim().is_empty() {
        return Err(anyhow!("代理关闭了连接"));
    }
    Ok(ipc::decode_line(&line)?)
}

fn doctor(runtime: &EdgeRuntime) -> Result<()> {
    let root = runtime.layout.root();
    println!("root = {}", elevation::is_running_as_root());
    println!("project_root = {}", root.display());
    println!("version = {}", VersionInfo::current_or_unknown(root));
    println!("provisioned = {}", runtime.reset.secrets().is_provisioned());
    let requirements = runtime.config.requirements_file()?;
    println!(
        "requirements = {} ({})",
        requirements.display(),
        exists_label(requirements.exists())
    );
    let socket = &runtime.config.ipc.socket_path;
    println!(
        "agent_socket = {} ({})",
        socket.display(),
        exists_label(socket.exists())
    );
    if !socket.exists() {
        warn!("代理 socket 不存在，rvm-agent 可能未运行");
    }
    print_status(runtime);
    Ok(())
}

fn exists_label(exists: bool) -> &'static str {
    if exists {
        "present"
    } else {
        "missing"
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("序列化输出失败")?
    );
    Ok(())
}

//! 远程命令处理器：消费心跳下发的命令并分派到更新编排器或服务控制器。
//!
//! 状态机：`Idle -> Dispatching -> {ExecutingUpdate | ExecutingRestart} -> Idle`
//!
//! 约束：
//! - 每个心跳周期最多处理一条命令
//! - 上一条命令尚未执行完时到达的新命令直接丢弃（结果为 `Skipped`），不覆盖、不排队
//! - `NONE` 及无法识别的命令为空操作，不调用任何组件
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::controller::{ServiceController, TargetState};
use crate::update::{UpdateOrchestrator, UpdateOutcome, UpdateRun, UpdateTrigger};
use crate::version::VersionInfo;

/// 心跳下发的命令。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteCommand {
    Update,
    Restart,
    #[default]
    None,
}

impl RemoteCommand {
    /// 解析命令字符串（忽略大小写与首尾空白）。
    ///
    /// 映射：
    /// - `GIT_PULL` / `UPDATE`：`Update`
    /// - `RESTART`：`Restart`
    /// - 其他（含空串）：`None`
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "GIT_PULL" | "UPDATE" => RemoteCommand::Update,
            "RESTART" => RemoteCommand::Restart,
            _ => RemoteCommand::None,
        }
    }

    /// 从心跳响应的 `commands` 数组中取出本周期要执行的命令。
    ///
    /// 说明：
    /// - 元素可以是字符串，也可以是带 `command`/`action`/`type` 字段的对象
    /// - 取第一条可识别的命令，其余忽略（每周期至多一条）
    pub fn from_heartbeat(commands: &[Value]) -> Self {
        commands
            .iter()
            .map(Self::from_value)
            .find(|c| *c != RemoteCommand::None)
            .unwrap_or_default()
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Object(obj) => ["command", "action", "type"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(Self::parse)
                .unwrap_or_default(),
            _ => RemoteCommand::None,
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteCommand::Update => "UPDATE",
            RemoteCommand::Restart => "RESTART",
            RemoteCommand::None => "NONE",
        })
    }
}

/// 命令执行结果（随下一次心跳上报）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    Success,
    Failed { reason: String },
    Skipped { reason: String },
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: RemoteCommand,
    pub outcome: CommandOutcome,
    pub version: String,
    #[serde(default)]
    pub update: Option<UpdateRun>,
}

/// 处理器状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Dispatching,
    ExecutingUpdate,
    ExecutingRestart,
}

impl ProcessorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ProcessorState::Dispatching,
            2 => ProcessorState::ExecutingUpdate,
            3 => ProcessorState::ExecutingRestart,
            _ => ProcessorState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProcessorState::Idle => 0,
            ProcessorState::Dispatching => 1,
            ProcessorState::ExecutingUpdate => 2,
            ProcessorState::ExecutingRestart => 3,
        }
    }
}

/// 析构时把状态复位为 `Idle`。
struct IdleOnDrop<'a>(&'a AtomicU8);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(ProcessorState::Idle.as_u8(), Ordering::SeqCst);
    }
}

pub struct CommandProcessor {
    orchestrator: Arc<UpdateOrchestrator>,
    controller: ServiceController,
    project_root: PathBuf,
    state: AtomicU8,
    last_report: Mutex<Option<CommandReport>>,
}

impl CommandProcessor {
    pub fn new(
        orchestrator: Arc<UpdateOrchestrator>,
        controller: ServiceController,
        project_root: PathBuf,
    ) -> Self {
        Self {
            orchestrator,
            controller,
            project_root,
            state: AtomicU8::new(ProcessorState::Idle.as_u8()),
            last_report: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// 最近一次非空命令的执行结果（供下一次心跳上报）。
    pub fn last_report(&self) -> Option<CommandReport> {
        self.last_report
            .lock()
            .map(|r| (*r).clone())
            .unwrap_or_else(|poisoned| (*poisoned.into_inner()).clone())
    }

    /// 当前版本号（每次重新读取）。
    pub fn current_version(&self) -> String {
        VersionInfo::current_or_unknown(&self.project_root)
    }

    /// 分派一条命令并同步等待其完成。
    ///
    /// 返回值：
    /// - 命令结果与当前版本号；处理器忙时返回 `Skipped`
    pub fn dispatch(&self, command: RemoteCommand) -> CommandReport {
        if command == RemoteCommand::None {
            return self.report(command, CommandOutcome::Noop, None);
        }

        if self
            .state
            .compare_exchange(
                ProcessorState::Idle.as_u8(),
                ProcessorState::Dispatching.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            warn!("上一条命令仍在执行（{:?}），丢弃 {command}", self.state());
            return self.report(
                command,
                CommandOutcome::Skipped {
                    reason: "busy".to_string(),
                },
                None,
            );
        }
        let _idle = IdleOnDrop(&self.state);
        info!("开始执行远程命令 {command}");

        let report = match command {
            RemoteCommand::Update => self.execute_update(),
            RemoteCommand::Restart => self.execute_restart(),
            RemoteCommand::None => self.report(command, CommandOutcome::Noop, None),
        };
        info!("远程命令 {command} 结束: {:?}", report.outcome);

        match self.last_report.lock() {
            Ok(mut last) => *last = Some(report.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(report.clone()),
        }
        report
    }

    /// 解析心跳命令列表并分派。
    pub fn dispatch_heartbeat(&self, commands: &[Value]) -> CommandReport {
        self.dispatch(RemoteCommand::from_heartbeat(commands))
    }

    fn execute_update(&self) -> CommandReport {
        self.set_state(ProcessorState::ExecutingUpdate);
        let run = self.orchestrator.run_update(UpdateTrigger::RemoteCommand);
        let outcome = match run.outcome {
            UpdateOutcome::Success | UpdateOutcome::UpToDate => CommandOutcome::Success,
            UpdateOutcome::AlreadyRunning => CommandOutcome::Skipped {
                reason: run.outcome.to_string(),
            },
            other => CommandOutcome::Failed {
                reason: match &run.detail {
                    Some(d) => format!("{other}: {d}"),
                    None => other.to_string(),
                },
            },
        };
        self.report(RemoteCommand::Update, outcome, Some(run))
    }

    fn execute_restart(&self) -> CommandReport {
        self.set_state(ProcessorState::ExecutingRestart);
        let primary = self.controller.registry().primary().name.clone();
        let outcome = match self
            .controller
            .set_service_state(&[primary.as_str()], TargetState::Restarted)
        {
            Ok(reports) => match reports.into_iter().next() {
                Some(r) if r.outcome.is_applied() => CommandOutcome::Success,
                Some(r) => CommandOutcome::Failed {
                    reason: format!("{}: {}", r.service, r.outcome),
                },
                None => CommandOutcome::Failed {
                    reason: "no service".to_string(),
                },
            },
            Err(e) => CommandOutcome::Failed {
                reason: e.to_string(),
            },
        };
        self.report(RemoteCommand::Restart, outcome, None)
    }

    fn set_state(&self, state: ProcessorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn report(
        &self,
        command: RemoteCommand,
        outcome: CommandOutcome,
        update: Option<UpdateRun>,
    ) -> CommandReport {
        CommandReport {
            command,
            outcome,
            version: self.current_version(),
            update,
        }
    }
}

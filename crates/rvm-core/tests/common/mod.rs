#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use rvm_core::controller::ServiceController;
use rvm_core::lock::{ProcessRunLock, RunLock};
use rvm_core::privilege::PrivilegeContext;
use rvm_core::service::{
    ManagedService, ServiceManager, ServiceManagerError, ServiceRegistry, UnitQuery,
};
use rvm_core::update::{
    DependencyInstaller, FetchReport, SourceFetcher, UpdateOrchestrator, UpdateSettings,
};
use uuid::Uuid;

pub const EDGE: &str = "myrvm-edge";
pub const KIOSK: &str = "myrvm-kiosk";
pub const EDGE_UNIT: &str = "myrvm-edge.service";
pub const KIOSK_UNIT: &str = "myrvm-kiosk.service";

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content)
        .unwrap_or_else(|e| panic!("write {} failed: {e}", path.display()));
}

pub struct CleanupDir(pub PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[derive(Debug, Clone, Default)]
struct FakeUnit {
    active: bool,
    enabled: bool,
}

/// 内存中的服务管理器：记录每次变更调用，可按“操作 + 单元”注入错误。
#[derive(Default)]
pub struct FakeServiceManager {
    units: Mutex<HashMap<String, FakeUnit>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, ServiceManagerError>>,
    sticky_stopped: Mutex<Vec<String>>,
    queries: AtomicUsize,
}

impl FakeServiceManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 两个受管单元都已安装且处于运行状态。
    pub fn with_both_running() -> Arc<Self> {
        let m = Self::new();
        m.install(EDGE_UNIT, true);
        m.install(KIOSK_UNIT, true);
        m
    }

    pub fn install(&self, unit: &str, active: bool) {
        self.units.lock().unwrap().insert(
            unit.to_string(),
            FakeUnit {
                active,
                enabled: false,
            },
        );
    }

    pub fn fail(&self, op: &str, unit: &str, err: ServiceManagerError) {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{op} {unit}"), err);
    }

    pub fn clear_failure(&self, op: &str, unit: &str) {
        self.failures.lock().unwrap().remove(&format!("{op} {unit}"));
    }

    /// start/restart 之后单元仍保持停止（模拟启动即崩溃）。
    pub fn never_comes_up(&self, unit: &str) {
        self.sticky_stopped.lock().unwrap().push(unit.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.units
            .lock()
            .unwrap()
            .get(unit)
            .map(|u| u.active)
            .unwrap_or(false)
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.units
            .lock()
            .unwrap()
            .get(unit)
            .map(|u| u.enabled)
            .unwrap_or(false)
    }

    fn mutate(&self, op: &str, unit: &str, f: impl FnOnce(&mut FakeUnit)) -> Result<(), ServiceManagerError> {
        self.calls.lock().unwrap().push(format!("{op} {unit}"));
        if let Some(err) = self.failures.lock().unwrap().get(&format!("{op} {unit}")) {
            return Err(err.clone());
        }
        let mut units = self.units.lock().unwrap();
        let entry = units
            .get_mut(unit)
            .ok_or_else(|| ServiceManagerError::UnitNotFound(unit.to_string()))?;
        f(entry);
        if self.sticky_stopped.lock().unwrap().iter().any(|u| u == unit) {
            entry.active = false;
        }
        Ok(())
    }
}

impl ServiceManager for FakeServiceManager {
    fn enable(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.mutate("enable", unit, |u| u.enabled = true)
    }

    fn disable(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.mutate("disable", unit, |u| u.enabled = false)
    }

    fn start(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.mutate("start", unit, |u| u.active = true)
    }

    fn stop(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.mutate("stop", unit, |u| u.active = false)
    }

    fn restart(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.mutate("restart", unit, |u| u.active = true)
    }

    fn query(&self, unit: &str) -> Result<UnitQuery, ServiceManagerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().get(&format!("query {unit}")) {
            return Err(err.clone());
        }
        let units = self.units.lock().unwrap();
        Ok(match units.get(unit) {
            None => UnitQuery::new("not-found", "inactive"),
            Some(u) if u.active => UnitQuery::new("loaded", "active"),
            Some(_) => UnitQuery::new("loaded", "inactive"),
        })
    }

    fn daemon_reload(&self) -> Result<(), ServiceManagerError> {
        self.calls.lock().unwrap().push("daemon-reload".to_string());
        Ok(())
    }
}

/// fetch 被调用时通知测试线程，并阻塞到测试线程放行。
struct Gate {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub struct GateHandle {
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

pub struct FakeFetcher {
    result: Result<FetchReport, String>,
    calls: AtomicUsize,
    gate: Option<Gate>,
}

impl FakeFetcher {
    pub fn changed(previous: &str, current: &str) -> Arc<Self> {
        Arc::new(Self::with_result(Ok(FetchReport {
            previous: previous.to_string(),
            current: current.to_string(),
        })))
    }

    pub fn unchanged(rev: &str) -> Arc<Self> {
        Self::changed(rev, rev)
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self::with_result(Err(message.to_string())))
    }

    pub fn gated(previous: &str, current: &str) -> (Arc<Self>, GateHandle) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut fetcher = Self::with_result(Ok(FetchReport {
            previous: previous.to_string(),
            current: current.to_string(),
        }));
        fetcher.gate = Some(Gate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (
            Arc::new(fetcher),
            GateHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    fn with_result(result: Result<FetchReport, String>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch(&self) -> anyhow::Result<FetchReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.entered.lock().unwrap().send(());
            let _ = gate.release.lock().unwrap().recv();
        }
        self.result.clone().map_err(|m| anyhow!("{m}"))
    }
}

#[derive(Default)]
pub struct FakeInstaller {
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl FakeInstaller {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DependencyInstaller for FakeInstaller {
    fn install(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(m) => Err(anyhow!("{m}")),
            None => Ok(()),
        }
    }
}

pub fn registry() -> Arc<ServiceRegistry> {
    Arc::new(
        ServiceRegistry::new(
            vec![ManagedService::new(EDGE), ManagedService::new(KIOSK)],
            EDGE,
        )
        .expect("valid registry"),
    )
}

pub fn controller(manager: &Arc<FakeServiceManager>, elevated: bool) -> ServiceController {
    let manager: Arc<dyn ServiceManager> = manager.clone();
    let privilege = if elevated {
        PrivilegeContext::elevated()
    } else {
        PrivilegeContext::unprivileged()
    };
    ServiceController::new(manager, registry(), privilege)
}

/// 健康检查只轮询 3 次、间隔 1ms 的编排器参数。
pub fn fast_settings(root: &Path) -> UpdateSettings {
    let mut settings = UpdateSettings::for_root(root);
    settings.health_poll_attempts = 3;
    settings.health_poll_interval = Duration::from_millis(1);
    settings
}

pub fn orchestrator(
    controller: ServiceController,
    fetcher: Arc<FakeFetcher>,
    installer: Arc<FakeInstaller>,
    root: &Path,
) -> UpdateOrchestrator {
    let lock: Arc<dyn RunLock> = Arc::new(ProcessRunLock::new());
    UpdateOrchestrator::new(controller, fetcher, installer, lock, fast_settings(root))
}

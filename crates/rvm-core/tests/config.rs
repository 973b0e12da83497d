mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::*;
use rvm_core::config::{AgentConfig, ConfigError};
use rvm_core::paths::ProjectLayout;
use rvm_core::service::DesiredState;
use rvm_core::version::{VersionInfo, UNKNOWN_VERSION};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

#[test]
fn parse_real_agent_config_json() {
    let path = repo_root().join("agent-config.json");
    let config = AgentConfig::load(&path)
        .unwrap_or_else(|e| panic!("load {} failed: {e}", path.display()));

    assert_eq!(config.primary_service, "myrvm-edge");
    let registry = config.registry().expect("registry from agent-config.json");
    assert_eq!(registry.primary().unit_name(), EDGE_UNIT);
    assert!(registry.get(KIOSK).is_some());
    for service in registry.iter() {
        let template = service
            .template
            .as_deref()
            .expect("every service in agent-config.json has a template");
        assert!(
            repo_root().join(template).exists(),
            "missing unit template {template}"
        );
    }
    assert_eq!(config.update.branch, "main");
    assert_eq!(config.update_interval(), Duration::from_secs(900));
}

#[test]
fn missing_file_yields_defaults() {
    let dir = unique_temp_dir("rvm-config-missing");
    let _cleanup = CleanupDir(dir.clone());

    let config = AgentConfig::load(&dir.join("nope.json")).unwrap();
    assert_eq!(config.registry().unwrap().names(), vec![EDGE, KIOSK]);
    assert_eq!(config.systemd.systemctl, "systemctl");
    assert_eq!(config.ipc.command_timeout_secs, 300);
}

#[test]
fn partial_file_fills_defaults_and_anchors_relative_root() {
    let dir = unique_temp_dir("rvm-config-partial");
    let _cleanup = CleanupDir(dir.clone());
    let path = dir.join("agent-config.json");
    write_file(
        &path,
        r#"{
  "project_root": "app",
  "services": [
    { "name": "myrvm-edge" },
    { "name": "myrvm-kiosk", "desired": "disabled" }
  ],
  "update": { "interval_secs": 60, "requirements": "deps/requirements.txt" }
}"#,
    );

    let config = AgentConfig::load(&path).unwrap();
    assert_eq!(config.project_root, dir.join("app"));
    assert_eq!(config.update.interval_secs, 60);
    assert_eq!(config.update.remote, "origin");
    assert_eq!(
        config.requirements_file().unwrap(),
        dir.join("app").join("deps/requirements.txt")
    );
    assert_eq!(config.venv_dir().unwrap(), dir.join("app").join("venv"));

    let registry = config.registry().unwrap();
    assert_eq!(registry.get(KIOSK).unwrap().desired, DesiredState::Disabled);
    assert_eq!(registry.unit_for(EDGE), EDGE_UNIT);

    let settings = config.update_settings().unwrap();
    assert_eq!(
        settings.digest_file,
        ProjectLayout::new(dir.join("app")).requirements_digest_file()
    );
    assert_eq!(settings.health_poll_interval, Duration::from_millis(1000));
}

#[test]
fn invalid_json_and_unknown_primary_are_errors() {
    let dir = unique_temp_dir("rvm-config-invalid");
    let _cleanup = CleanupDir(dir.clone());

    let broken = dir.join("broken.json");
    write_file(&broken, "{ \"services\": [ ");
    assert!(matches!(
        AgentConfig::load(&broken),
        Err(ConfigError::Parse { .. })
    ));

    let orphan = dir.join("orphan.json");
    write_file(
        &orphan,
        r#"{ "primary_service": "ghost", "services": [ { "name": "myrvm-edge" } ] }"#,
    );
    let config = AgentConfig::load(&orphan).unwrap();
    assert!(matches!(config.registry(), Err(ConfigError::Registry(_))));

    let empty_path = dir.join("empty-path.json");
    write_file(&empty_path, r#"{ "update": { "venv_dir": "" } }"#);
    let config = AgentConfig::load(&empty_path).unwrap();
    assert!(matches!(config.venv_dir(), Err(ConfigError::Path(_))));
}

#[test]
fn version_is_reread_and_trimmed() {
    let dir = unique_temp_dir("rvm-version");
    let _cleanup = CleanupDir(dir.clone());
    let layout = ProjectLayout::new(&dir);

    assert!(VersionInfo::load(&dir).is_err());
    assert_eq!(VersionInfo::current_or_unknown(&dir), UNKNOWN_VERSION);

    write_file(&layout.version_file(), "  1.0.0\n");
    assert_eq!(VersionInfo::load(&dir).unwrap().as_str(), "1.0.0");

    write_file(&layout.version_file(), "1.0.1");
    assert_eq!(VersionInfo::current_or_unknown(&dir), "1.0.1");

    write_file(&layout.version_file(), "\n");
    assert_eq!(VersionInfo::current_or_unknown(&dir), UNKNOWN_VERSION);
}

mod common;

use common::*;

const EDGE_UNIT: &str = "myrvm-edge.service";
const HARDWARE_MAP: &str = "{ \"motor\": 17 }\n";
const LOCAL_ENV: &str = "CAMERA_INDEX=1\n";

#[test]
fn e2e_reset_day0_wipes_identity_and_restarts_primary() {
    let device = Device::new("rvm-ctl-reset");
    device.install_unit(EDGE_UNIT, true);
    let config_dir = device.root.join("config");
    let secrets = [
        config_dir.join("secrets.env"),
        config_dir.join("credentials.json"),
        config_dir.join(".maintenance_mode"),
    ];
    write_file(&secrets[0], "DEVICE_TOKEN=abc\n");
    write_file(&secrets[1], "{}");
    write_file(&secrets[2], "");
    write_file(&config_dir.join("hardware_map.json"), HARDWARE_MAP);
    write_file(&config_dir.join("local.env"), LOCAL_ENV);

    // 交互确认未输入 yes：不做任何修改。
    let out = device.ctl_with_stdin(&["reset-day0"], "no\n");
    assert!(!out.status.success(), "reset should be refused: {}", describe(&out));
    assert!(secrets.iter().all(|p| p.exists()));
    assert!(!device.calls().iter().any(|c| c.starts_with("stop")));

    let out = device.ctl(&["reset-day0", "--yes"]);
    assert!(out.status.success(), "reset failed: {}", describe(&out));
    assert!(stdout(&out).contains("\"kind\": \"completed\""), "{}", describe(&out));
    for p in &secrets {
        assert!(!p.exists(), "{} should be removed", p.display());
    }
    assert_eq!(
        std::fs::read_to_string(config_dir.join("hardware_map.json")).unwrap(),
        HARDWARE_MAP
    );
    assert_eq!(
        std::fs::read_to_string(config_dir.join("local.env")).unwrap(),
        LOCAL_ENV
    );

    let calls = device.calls();
    let stop = calls
        .iter()
        .position(|c| c == "stop myrvm-edge.service")
        .expect("primary stopped");
    let start = calls
        .iter()
        .position(|c| c == "start myrvm-edge.service")
        .expect("primary started again");
    assert!(stop < start, "calls: {calls:?}");
    assert!(device.is_active(EDGE_UNIT));

    // 停止失败时中止，不删除任何文件。
    write_file(&secrets[0], "DEVICE_TOKEN=def\n");
    device.fail_verb("stop");
    let out = device.ctl(&["reset-day0", "--yes"]);
    assert!(!out.status.success(), "reset should abort: {}", describe(&out));
    assert!(secrets[0].exists());
}

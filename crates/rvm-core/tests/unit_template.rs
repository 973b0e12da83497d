use rvm_core::unit::{render_unit_template, TemplateError, UnitVars};

fn vars() -> UnitVars {
    UnitVars {
        user: "pi".to_string(),
        working_dir: "/home/pi/myrvm-edge".to_string(),
    }
}

#[test]
fn substitutes_every_placeholder_occurrence() {
    let template = "[Service]\nUser={{USER}}\nWorkingDirectory={{WORKING_DIR}}\nExecStart={{WORKING_DIR}}/venv/bin/python main.py\n";
    let rendered = render_unit_template(template, &vars()).unwrap();
    assert_eq!(
        rendered,
        "[Service]\nUser=pi\nWorkingDirectory=/home/pi/myrvm-edge\nExecStart=/home/pi/myrvm-edge/venv/bin/python main.py\n"
    );
}

#[test]
fn leftover_placeholder_is_rejected() {
    let err = render_unit_template("Environment=TOKEN={{DEVICE_TOKEN}}\n", &vars()).unwrap_err();
    assert_eq!(
        err,
        TemplateError::UnknownPlaceholder("{{DEVICE_TOKEN}}".to_string())
    );
}

#[test]
fn empty_variables_are_rejected() {
    let mut v = vars();
    v.user = " ".to_string();
    assert_eq!(
        render_unit_template("User={{USER}}", &v).unwrap_err(),
        TemplateError::EmptyVar("USER")
    );
}

#[test]
fn shipped_templates_render_cleanly() {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    for name in ["myrvm-edge", "myrvm-kiosk"] {
        let path = root.join(format!("systemd/{name}.service.template"));
        let text = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {} failed: {e}", path.display()));
        let rendered = render_unit_template(&text, &vars())
            .unwrap_or_else(|e| panic!("render {} failed: {e}", path.display()));
        assert!(rendered.contains("User=pi"), "{name}: {rendered}");
        assert!(rendered.contains("[Install]"), "{name}: {rendered}");
    }
}

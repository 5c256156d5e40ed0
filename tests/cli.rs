use assert_cmd::Command;

mod common;

fn gtbot() -> Command {
    let mut cmd = Command::cargo_bin("gtbot").unwrap();
    cmd.env_remove("GTBOT_CONFIG")
        .env_remove("GTBOT_TOKEN")
        .env_remove("GTBOT_WEBHOOK");
    cmd
}

#[test]
fn runs() {
    gtbot().assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = gtbot();
    cmd.arg("-V");
    cmd.assert().success().stdout("gtbot 0.1.0\n");
}

#[test]
fn link_prints_inline_payload() {
    let url = common::inline_url(
        "https://viewer.example",
        r#"{"layers": [{"type": "image", "name": "img", "source": "precomputed://gs://b/img"}]}"#,
    );
    let mut cmd = gtbot();
    cmd.args(["link", &url]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"name\": \"img\""))
        .stdout(predicates::str::contains("precomputed://gs://b/img"));
}

#[test]
fn link_rejects_stateless_url() {
    let mut cmd = gtbot();
    cmd.args(["link", "https://viewer.example/"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::starts_with("Error:"));
}

#[test]
fn handle_unknown_message_fails() {
    let mut cmd = gtbot();
    cmd.args(["handle", "<@U1> tell me a joke", "--bot-id", "<@U1>"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("do not understand the message"));
}

#[test]
fn bbox_without_labels_prints_link_json() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = temp.path().join("gtbot.yaml");
    std::fs::write(&config, "viewer:\n  state_server: null\n").expect("write config");

    let url = common::inline_url(
        "https://viewer.example",
        r#"{"layers": [{"type": "annotation", "name": "pts", "voxelSize": [4, 4, 40],
            "annotations": [{"type": "point", "id": "p", "point": [100, 100, 10]}]}]}"#,
    );
    let mut cmd = gtbot();
    cmd.args([
        "--config",
        config.to_str().unwrap(),
        "--seed",
        "1",
        "bbox",
        &url,
        "--labels",
        "off",
        "--span",
        "40,40,4",
        "--output",
        "json",
    ]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("\"command\": \"bboxes\""))
        .stdout(predicates::str::contains("\"boxes_added\": 1"))
        .stdout(predicates::str::contains("memory://state/1"));
}

#[test]
fn bad_config_is_reported() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let config = temp.path().join("gtbot.yaml");
    std::fs::write(&config, "cutout: [not, a, map]\n").expect("write config");

    let mut cmd = gtbot();
    cmd.args(["--config", config.to_str().unwrap(), "link", "https://viewer.example/#!%7B%7D"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("gtbot.yaml"));
}

use std::fs;
use std::io::Read;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tempfile::tempdir;

const LAYOUT: &str = r#"[
  {"point": [0.0, 0.0, 0.0]},
  {"point": [1.0, 2.0, 0.5]},
  {"point": [-1.0, 0.5, 3.0]}
]"#;

fn write_layout(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("leds.json");
    fs::write(&path, LAYOUT).expect("layout should write");
    path
}

fn run_amcp(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_amcp"))
        .current_dir(cwd)
        .env_remove("OPC_SERVER")
        .args(args)
        .output()
        .expect("amcp command should run")
}

#[test]
fn check_reports_point_count_and_bounds() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());

    let output = run_amcp(dir.path(), &["check", "--layout", "leds.json"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 points"), "unexpected output: {stdout}");
}

#[test]
fn check_json_is_machine_readable() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());

    let output = run_amcp(dir.path(), &["check", "--layout", "leds.json", "--json"]);
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["ok"], Value::Bool(true));
    assert_eq!(report["points"], 3);
    assert_eq!(report["min"], serde_json::json!([-1.0, 0.0, 0.0]));
    assert_eq!(report["max"], serde_json::json!([1.0, 2.0, 3.0]));
}

#[test]
fn missing_layout_is_a_config_error() {
    let dir = tempdir().expect("tempdir should create");

    let output = run_amcp(dir.path(), &["check", "--layout", "nope.json", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "E_CONFIG");
    assert_eq!(envelope["error"]["kind"], "config");
}

#[test]
fn malformed_layout_reports_its_location() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("bad.json"), "[\n  {\"point\": [0, 0]}\n]").expect("write");

    let output = run_amcp(dir.path(), &["check", "--layout", "bad.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.json"), "stderr: {stderr}");
    assert!(stderr.contains("line 2"), "stderr: {stderr}");
}

#[test]
fn run_rejects_unknown_parameter_override() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());

    let output = run_amcp(
        dir.path(),
        &[
            "run",
            "--layout",
            "leds.json",
            "--server",
            "127.0.0.1:9",
            "--set",
            "sparkle=1",
        ],
    );
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sparkle"), "stderr: {stderr}");
}

#[test]
fn run_rejects_server_without_port() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());

    let output = run_amcp(
        dir.path(),
        &["run", "--layout", "leds.json", "--server", "localhost"],
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn run_fails_fast_when_no_server_is_listening() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let output = run_amcp(
        dir.path(),
        &["run", "--layout", "leds.json", "--server", &addr, "--json"],
    );
    assert_eq!(output.status.code(), Some(3));
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(envelope["error"]["code"], "E_TRANSPORT");
}

#[test]
fn run_streams_frames_to_the_server() {
    let dir = tempdir().expect("tempdir should create");
    write_layout(dir.path());
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    let mut child = Command::new(env!("CARGO_BIN_EXE_amcp"))
        .current_dir(dir.path())
        .args(["run", "--layout", "leds.json", "--server", &addr, "--seed", "5"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("amcp should start");

    let (mut stream, _) = listener.accept().expect("amcp should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    // Three points plus the three auxiliary bytes.
    let mut frame = [0u8; 4 + 9 + 3];
    let read = stream.read_exact(&mut frame);
    let _ = child.kill();
    let _ = child.wait();

    read.expect("one full frame");
    assert_eq!(&frame[..4], &[0, 0, 0, 12]);
    assert_eq!(&frame[13..], &[0, 0, 0]);
}

#[test]
fn bench_runs_without_a_server() {
    let dir = tempdir().expect("tempdir should create");

    let output = run_amcp(dir.path(), &["bench", "--frames", "3"]);
    assert!(output.status.success(), "bench should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 frames"), "stdout: {stdout}");
    assert!(stdout.contains("2560 points"), "stdout: {stdout}");
}

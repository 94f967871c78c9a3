#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/chcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket {} never appeared", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn chanmux() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_chanmux"));
    cmd.arg("--log-level").arg("error");
    cmd
}

/// Kills the server if an assertion fails first.
struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn send_reaches_listen_on_the_declared_channel() {
    let dir = unique_temp_dir("send-listen");
    let sock_path = dir.join("listen.sock");

    let listen = chanmux()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&sock_path)
        .arg("--channels")
        .arg("0,1:json")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let send = chanmux()
        .arg("send")
        .arg(&sock_path)
        .arg("--channels")
        .arg("0,1:json")
        .arg("--channel")
        .arg("1")
        .arg("--json")
        .arg(r#"{"hello":"world"}"#)
        .output()
        .expect("send should run");
    assert!(
        send.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&send.stderr)
    );

    let output = listen
        .wait_with_output()
        .expect("listen should exit after one message");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("listen should emit one json line");
    assert_eq!(line["channel"], 1);
    assert_eq!(line["encoding"], "json");
    assert_eq!(line["payload"]["hello"], "world");
    assert_eq!(line["peer_id"], "peer-1");
    assert!(!sock_path.exists(), "listen removes its socket on exit");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_wait_prints_the_echoed_reply() {
    let dir = unique_temp_dir("send-wait");
    let sock_path = dir.join("echo.sock");

    let _server = ServerGuard(
        chanmux()
            .arg("echo")
            .arg(&sock_path)
            .arg("--channels")
            .arg("7")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("echo command should start"),
    );
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = chanmux()
        .arg("--format")
        .arg("raw")
        .arg("send")
        .arg(&sock_path)
        .arg("-c")
        .arg("7")
        .arg("--data")
        .arg("marco")
        .arg("--wait")
        .arg("--wait-timeout")
        .arg("3s")
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(output.stdout, b"marco");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn raw_text_on_a_json_channel_is_a_data_error() {
    let dir = unique_temp_dir("send-invalid");
    let sock_path = dir.join("echo.sock");

    let _server = ServerGuard(
        chanmux()
            .arg("echo")
            .arg(&sock_path)
            .arg("--channels")
            .arg("1:json")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("echo command should start"),
    );
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = chanmux()
        .arg("send")
        .arg(&sock_path)
        .arg("--channels")
        .arg("1:json")
        .arg("--channel")
        .arg("1")
        .arg("--data")
        .arg("not json")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn undeclared_send_channel_is_a_usage_error() {
    let output = chanmux()
        .arg("send")
        .arg("/tmp/chcli-never-bound.sock")
        .arg("--channels")
        .arg("0,1")
        .arg("--channel")
        .arg("5")
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("channel 5"));
}

#[test]
fn duplicate_channel_ids_are_rejected_before_binding() {
    let dir = unique_temp_dir("dup");
    let sock_path = dir.join("dup.sock");

    let output = chanmux()
        .arg("listen")
        .arg(&sock_path)
        .arg("--channels")
        .arg("1,2,1")
        .output()
        .expect("listen should run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("duplicate channel id 1"));
    assert!(!sock_path.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_socket_fails() {
    let dir = unique_temp_dir("missing");
    let output = chanmux()
        .arg("send")
        .arg(dir.join("nobody.sock"))
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_chanmux"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("chanmux {}", env!("CARGO_PKG_VERSION"))
    );
}

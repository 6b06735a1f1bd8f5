#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fs_churn::churn::{Controller, ControllerOptions, RunSummary};
use tempfile::tempdir;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fs-churn"))
}

fn quick_tunables(dir: &Path) -> PathBuf {
    let path = dir.join("quick.json");
    std::fs::write(&path, r#"{"wait_ticks":2,"write_ticks":2}"#)
        .expect("tunables file should be written");
    path
}

#[test]
fn run_subcommand_prints_a_json_summary() {
    let tmp = tempdir().expect("tempdir should be created");
    let output = Command::new(binary())
        .arg("run")
        .arg(tmp.path())
        .args(["--waves", "40", "--seed", "7", "--workers", "2", "--json"])
        .env("RUST_LOG", "warn")
        .output()
        .expect("cli should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let summary: RunSummary =
        serde_json::from_slice(&output.stdout).expect("stdout should be a json summary");
    assert_eq!(summary.seed, 7);
    assert_eq!(summary.worker_count, 2);
    assert_eq!(summary.waves, 40);
}

#[test]
fn run_subcommand_loads_tunables_from_a_file() {
    let tmp = tempdir().expect("tempdir should be created");
    let target = tmp.path().join("target");
    std::fs::create_dir(&target).expect("target should be created");
    let config = tmp.path().join("tunables.json");
    std::fs::write(
        &config,
        r#"{"weights":{"wait":0,"add_file":1,"delete_file":0,"change_file":0,"add_directory":0,"delete_directory":0,"enter_directory":0,"exit_directory":0},"wave_interval_ms":0}"#,
    )
    .expect("config should be written");

    let status = Command::new(binary())
        .arg("run")
        .arg(&target)
        .args(["--waves", "5", "--seed", "1", "--workers", "1", "--config"])
        .arg(&config)
        .env("RUST_LOG", "warn")
        .status()
        .expect("cli should run");

    assert!(status.success());
    assert_eq!(std::fs::read_dir(&target).expect("target should list").count(), 5);
}

#[test]
fn run_subcommand_rejects_a_missing_target() {
    let tmp = tempdir().expect("tempdir should be created");
    let output = Command::new(binary())
        .arg("run")
        .arg(tmp.path().join("absent"))
        .args(["--waves", "1"])
        .output()
        .expect("cli should run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not find path"));
}

#[test]
fn engine_subcommand_answers_stop_with_stopped() {
    let tmp = tempdir().expect("tempdir should be created");
    let scratch = tempdir().expect("tempdir should be created");
    let mut child = Command::new(binary())
        .arg("engine")
        .arg("--config")
        .arg(quick_tunables(scratch.path()))
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("engine should spawn");
    let mut stdin = child.stdin.take().expect("stdin should be piped");
    let stdout = child.stdout.take().expect("stdout should be piped");

    let setup = serde_json::json!({
        "type": "Setup",
        "path": tmp.path(),
        "seed": 5,
        "workerCount": 1,
    });
    writeln!(stdin, "{setup}").expect("setup should write");
    writeln!(stdin, r#"{{"type":"Start"}}"#).expect("start should write");
    std::thread::sleep(Duration::from_millis(100));
    writeln!(stdin, r#"{{"type":"Stop"}}"#).expect("stop should write");
    stdin.flush().expect("stdin should flush");

    let mut saw_log = false;
    let mut saw_stopped = false;
    for line in BufReader::new(stdout).lines() {
        let line = line.expect("line should read");
        let value: serde_json::Value = serde_json::from_str(&line).expect("line should be json");
        match value["type"].as_str() {
            Some("Log") => {
                saw_log = true;
                assert!(value["msg"].as_str().is_some_and(|m| m.starts_with("worker0 ")));
            }
            Some("Stopped") => {
                saw_stopped = true;
                break;
            }
            other => panic!("unexpected message type {other:?}"),
        }
    }
    drop(stdin);

    assert!(saw_log);
    assert!(saw_stopped);
    assert!(child.wait().expect("engine should exit").success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controller_drives_an_engine_process() {
    let tmp = tempdir().expect("tempdir should be created");
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let options = ControllerOptions::default()
        .with_seed(9999)
        .with_worker_count(2)
        .with_log_sink(Arc::new(move |line: &str| {
            sink.lock().expect("lines mutex should lock").push(line.to_string());
        }));

    let scratch = tempdir().expect("tempdir should be created");
    let config = quick_tunables(scratch.path());
    let args = [
        std::ffi::OsString::from("engine"),
        std::ffi::OsString::from("--config"),
        config.into_os_string(),
    ];
    let controller = Controller::spawn_process(binary(), args, tmp.path(), options)
        .expect("engine process should spawn");
    controller.start().expect("start should send");
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.stop().await.expect("stop should be acknowledged");

    let lines = lines.lock().expect("lines mutex should lock");
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| l.starts_with("worker0 ") || l.starts_with("worker1 ")));
}

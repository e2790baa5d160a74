//! Integration tests for the remora-rpc binary.
//!
//! These tests start the real binary on an OS-assigned port, read the port it
//! reports on stdout and talk to it over TCP (and HTTP for the admin
//! endpoint).

use remora_core::{FailureKind, RemoteClient, RemotingError};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

struct ExporterProcess {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ExporterProcess {
    fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }

    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ExporterProcess {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start the binary with `serve --port 0` plus `extra` and wait for its port.
async fn start_exporter(extra: &[&str]) -> Result<ExporterProcess, String> {
    let binary = env!("CARGO_BIN_EXE_remora-rpc");

    let mut child = tokio::process::Command::new(binary)
        .arg("serve")
        .arg("--port")
        .arg("0")
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn remora-rpc: {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "failed to capture stdout".to_string())?;
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let mut discovered_port: Option<u16> = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(250), lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Some(value) = line.strip_prefix("REMORA_PORT=") {
                    let parsed = value
                        .trim()
                        .parse::<u16>()
                        .map_err(|e| format!("invalid REMORA_PORT value '{value}': {e}"))?;
                    discovered_port = Some(parsed);
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(format!("failed to read remora-rpc stdout: {err}")),
            Err(_) => continue,
        }
    }

    let port = discovered_port
        .ok_or_else(|| "REMORA_PORT line not emitted by remora-rpc".to_string())?;

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(ExporterProcess {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

/// Find a free local port for the admin endpoint.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_binary_serves_seeded_user() {
    let exporter = start_exporter(&["--seed-demo-users"]).await.unwrap();
    let client = RemoteClient::connect(exporter.addr()).await.unwrap();

    let user = client
        .call("userService", "findById", vec![json!(42)])
        .await
        .unwrap();
    assert_eq!(user["id"], 42);
    assert_eq!(user["name"], "Grace Hopper");

    exporter.stop().await;
}

#[tokio::test]
async fn test_binary_custom_service_name() {
    let exporter = start_exporter(&["--service-name", "accounts"]).await.unwrap();
    let client = RemoteClient::connect(exporter.addr()).await.unwrap();

    let users = client.call("accounts", "findAll", vec![]).await.unwrap();
    assert_eq!(users, json!([]));

    assert!(matches!(
        client.call("userService", "findAll", vec![]).await,
        Err(RemotingError::UnknownService { .. })
    ));

    exporter.stop().await;
}

#[tokio::test]
async fn test_binary_reports_structured_failures() {
    let exporter = start_exporter(&[]).await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(exporter.addr()).await.unwrap();
    let (mut reader, mut writer) = stream.split();

    remora_core::protocol::write_frame(&mut writer, b"{\"service\": 1}")
        .await
        .unwrap();
    let bytes = remora_core::protocol::read_frame(&mut reader, 1 << 20)
        .await
        .unwrap()
        .unwrap();
    let response = remora_core::protocol::decode_response(&bytes).unwrap();
    assert_eq!(response.failure_kind(), Some(FailureKind::Protocol));

    exporter.stop().await;
}

#[tokio::test]
async fn test_binary_admin_endpoint() {
    let admin_port = free_port();
    let exporter = start_exporter(&["--admin-port", &admin_port.to_string()])
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let health: Value = http
        .get(format!("http://127.0.0.1:{}/health", admin_port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let services: Value = http
        .get(format!("http://127.0.0.1:{}/services", admin_port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(services[0]["name"], "userService");
    assert_eq!(services[0]["methods"].as_array().unwrap().len(), 4);

    exporter.stop().await;
}

#[tokio::test]
async fn test_binary_call_subcommand() {
    let exporter = start_exporter(&["--seed-demo-users"]).await.unwrap();

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_remora-rpc"))
        .arg("call")
        .arg("--addr")
        .arg(exporter.addr().to_string())
        .arg("--method")
        .arg("findById")
        .arg("--args")
        .arg("[1]")
        .stderr(Stdio::null())
        .output()
        .await
        .unwrap();

    assert!(output.status.success());
    let user: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(user["email"], "ada@example.com");

    exporter.stop().await;
}

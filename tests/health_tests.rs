// tests/health_tests.rs
use agent_gateway::config::{Config, Settings};
use agent_gateway::health::{run_health_check, Aggregator, ReportStatus};
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Upstream whose `/health` never answers while every other path returns 200.
async fn spawn_upstream_with_hung_health() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                if head.starts_with(b"GET /health ") {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    return;
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            });
        }
    });
    port
}

fn settings_for(server: &mockito::ServerGuard) -> Settings {
    let addr = server.host_with_port();
    let (host, port) = addr.rsplit_once(':').unwrap();
    Settings {
        host: host.to_string(),
        health_port: Some(port.parse().unwrap()),
        probe_timeout_ms: 2_000,
        health_deadline_ms: 5_000,
        log_files: String::new(),
        ..Settings::default()
    }
}

#[cfg(unix)]
#[tokio::test]
async fn healthy_liveness_with_absent_process_is_healthy() {
    let mut server = mockito::Server::new_async().await;
    let _health = server.mock("GET", "/health").with_status(200).create_async().await;

    // An empty listing: the supervisor is up but never started the process.
    let settings = Settings {
        supervisor_command: "echo".to_string(),
        supervisor_args: "[]".to_string(),
        health_probes: "liveness,supervisor,logs".to_string(),
        ..settings_for(&server)
    };
    let config = Config::from_settings(settings).unwrap();
    config.validate().unwrap();

    let report = Aggregator::from_config(&config).unwrap().run().await;

    assert!(report.overall);
    assert_eq!(report.status, ReportStatus::Healthy);
    assert_eq!(report.checks["liveness"].payload["endpoint"], "/health");
    let supervisor = &report.checks["supervisor"];
    assert!(!supervisor.succeeded);
    assert_eq!(
        supervisor.error.as_deref(),
        Some("process 'elizaos' not found in supervisor listing")
    );
    assert!(report.checks["logs"].succeeded);
}

#[tokio::test]
async fn failing_liveness_is_unhealthy_even_if_others_pass() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let settings = Settings {
        host: "127.0.0.1".to_string(),
        health_port: Some(port),
        health_probes: "liveness,logs".to_string(),
        probe_timeout_ms: 1_000,
        ..Settings::default()
    };
    let config = Config::from_settings(settings).unwrap();

    let report = Aggregator::from_config(&config).unwrap().run().await;

    assert!(!report.overall);
    assert_eq!(report.status, ReportStatus::Unhealthy);
    assert_eq!(report.exit_code(), 1);
    assert!(report.checks["logs"].succeeded);
    let attempts = report.checks["liveness"].payload["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 3);
}

#[tokio::test]
async fn hung_first_endpoint_still_reaches_fallback() {
    let port = spawn_upstream_with_hung_health().await;
    let settings = Settings {
        host: "127.0.0.1".to_string(),
        health_port: Some(port),
        health_probes: "liveness".to_string(),
        probe_timeout_ms: 1_000,
        health_deadline_ms: 5_000,
        ..Settings::default()
    };
    let config = Config::from_settings(settings).unwrap();
    config.validate().unwrap();

    let report = Aggregator::from_config(&config).unwrap().run().await;

    assert!(report.overall);
    let liveness = &report.checks["liveness"];
    assert!(liveness.succeeded, "{:?}", liveness);
    assert_eq!(liveness.payload["endpoint"], "/api/health");
    assert_eq!(liveness.payload["failed_attempts"][0]["endpoint"], "/health");
    assert_eq!(liveness.payload["failed_attempts"][0]["error"], "timed out");
}

#[cfg(unix)]
#[tokio::test]
async fn hung_supervisor_is_reported_as_timeout() {
    let mut server = mockito::Server::new_async().await;
    let _health = server.mock("GET", "/health").with_status(204).create_async().await;

    let settings = Settings {
        supervisor_command: "sleep".to_string(),
        supervisor_args: "30".to_string(),
        health_probes: "liveness,supervisor".to_string(),
        probe_timeout_ms: 300,
        health_deadline_ms: 2_000,
        ..settings_for(&server)
    };
    let config = Config::from_settings(settings).unwrap();

    let start = Instant::now();
    let report = Aggregator::from_config(&config).unwrap().run().await;

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(report.overall);
    let supervisor = &report.checks["supervisor"];
    assert!(!supervisor.succeeded);
    assert!(supervisor.error.as_deref().unwrap().contains("timed out"));
}

#[cfg(unix)]
#[tokio::test]
async fn supervisor_can_be_made_critical() {
    let mut server = mockito::Server::new_async().await;
    let _health = server.mock("GET", "/health").with_status(200).create_async().await;

    let settings = Settings {
        supervisor_command: "false".to_string(),
        supervisor_args: String::new(),
        health_probes: "liveness,supervisor".to_string(),
        critical_probes: "liveness,supervisor".to_string(),
        ..settings_for(&server)
    };
    let config = Config::from_settings(settings).unwrap();
    config.validate().unwrap();

    let report = Aggregator::from_config(&config).unwrap().run().await;

    assert!(report.checks["liveness"].succeeded);
    assert!(!report.overall);
    assert_eq!(report.critical, vec!["liveness", "supervisor"]);
}

#[tokio::test]
async fn invalid_configuration_produces_error_report() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "critical_probes: \"database\"").unwrap();

    let report = run_health_check(Some(file.path())).await;

    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.exit_code(), 1);
    assert!(report.error.as_deref().unwrap().contains("unknown probe"));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "error");
}

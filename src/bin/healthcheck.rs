// src/bin/healthcheck.rs
// One-shot health check: JSON report on stdout, summary on stderr,
// exit status 0 when healthy.
use agent_gateway::health::run_health_check;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let report = run_health_check(config_path.as_deref()).await;

    eprintln!("{}", report.summary());

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize health report: {}", e);
            std::process::exit(1);
        }
    }

    std::process::exit(report.exit_code());
}

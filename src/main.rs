//! relaylog: Fire-and-forget HTTP log shipping
//!
//! Command-line companion to the `http_log` plugin: checks a configuration
//! and ships payloads to the configured collector through the same delivery
//! path the plugin uses.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, HttpLogConfig};
use delivery::{resolve, DeferredScheduler, DeliveryClient, DeliveryStats, DeliveryTask};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Extra time granted on top of the I/O timeouts before giving up on a delivery
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "relaylog")]
#[command(author, version, about = "Fire-and-forget HTTP log shipping")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration
    Validate {
        #[arg(short, long, default_value = "relaylog.toml")]
        config: PathBuf,
    },
    /// Deliver one payload file to the configured collector
    Send {
        #[arg(short, long, default_value = "relaylog.toml")]
        config: PathBuf,
        /// File whose contents become the request body
        #[arg(short, long)]
        payload: PathBuf,
        /// Label used in delivery log lines
        #[arg(long, default_value = "relaylog")]
        label: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Validate { config } => validate_config(&config),
        Commands::Send {
            config,
            payload,
            label,
        } => {
            let config = load_config(&config)?;
            let payload = std::fs::read(&payload)
                .with_context(|| format!("Failed to read payload from {:?}", payload))?;

            let rt = tokio::runtime::Runtime::new()?;
            let stats = rt.block_on(send_payload(&config.http_log, payload, &label))?;
            info!(delivered = stats.delivered, "Payload shipped");
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn validate_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let http_log = &config.http_log;
    let endpoint = resolve(&http_log.http_endpoint).context("Invalid http_endpoint")?;

    println!("Configuration is valid!");
    println!(
        "  Collector: {}://{}{}",
        endpoint.scheme,
        endpoint.target(),
        endpoint.request_target()
    );
    println!("  Method: {}", http_log.method);
    println!("  Timeout: {}  Keepalive: {}", http_log.timeout, http_log.keepalive);
    println!(
        "  Capture: request body {}, response body {}",
        on_off(http_log.log_request_body),
        on_off(http_log.log_response_body)
    );
    if let Some(limit) = http_log.body_limit() {
        println!("  Max body size: {} bytes", limit);
    }
    if !http_log.tls_verify {
        println!("  TLS verification: disabled");
    }

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Schedule one delivery and wait for it to finish
async fn send_payload(config: &HttpLogConfig, payload: Vec<u8>, label: &str) -> Result<DeliveryStats> {
    let timeout = config.timeout_duration()?;
    let client = DeliveryClient::new(config.tls_verify).context("Failed to build TLS config")?;
    let scheduler = DeferredScheduler::from_current(Arc::new(client))?;

    let task = DeliveryTask::new(config.http_endpoint.trim(), payload, label)
        .with_method(config.method.clone())
        .with_timeout(timeout)
        .with_keepalive(config.keepalive_duration()?);
    scheduler.schedule(task)?;

    // connect + handshake + write, each bounded by the timeout
    if !scheduler.wait_idle(timeout * 3 + DRAIN_GRACE).await {
        bail!("Delivery did not finish in time");
    }
    scheduler.close();

    let stats = scheduler.stats();
    if stats.delivered == 0 {
        bail!("Delivery to {} failed", config.http_endpoint);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = HttpLogConfig::new(format!("http://{}/bulk", listener.local_addr().unwrap()));

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.ends_with(b"[1,2,3]") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed early");
                received.extend_from_slice(&buf[..n]);
            }
            String::from_utf8(received).unwrap()
        });

        let stats = send_payload(&config, b"[1,2,3]".to_vec(), "test").await.unwrap();
        assert_eq!(stats.delivered, 1);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /bulk HTTP/1.1\r\n"));
        assert!(request.contains("Content-Length: 7\r\n"));
    }

    #[tokio::test]
    async fn test_send_payload_reports_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = HttpLogConfig::new(format!("http://{}/", listener.local_addr().unwrap()));
        config.timeout = "1s".to_string();
        drop(listener);

        assert!(send_payload(&config, b"{}".to_vec(), "test").await.is_err());
    }

    #[test]
    fn test_validate_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[http_log]\nhttp_endpoint = \"https://user:pw@logs.example.com/ingest\"\nmax_body_size = 512"
        )
        .unwrap();
        assert!(validate_config(file.path()).is_ok());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[http_log]\nhttp_endpoint = \"https://\"").unwrap();
        assert!(validate_config(bad.path()).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "relaylog",
            "send",
            "--payload",
            "entry.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Send { ref label, .. } if label == "relaylog"));
    }
}

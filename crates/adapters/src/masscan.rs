//! Fast-rate port scanner (masscan).
//!
//! Streams masscan's JSON-lines output, one object per host, and emits a
//! port record per open port. No L7 probing happens at this rate —
//! service is always reported as "unknown".

use argus_domain::results::PortRecord;
use argus_domain::scan::{LogLevel, Scan};
use argus_domain::target;
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use serde::Deserialize;

use crate::decode_config;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasscanConfig {
    /// Port range or comma list, masscan syntax.
    #[serde(default = "d_ports")]
    pub ports: String,
    /// Packets per second.
    #[serde(default = "d_rate")]
    pub rate: u32,
    /// Scan deadline in seconds (consumed by the manager).
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_ports() -> String {
    "1-65535".into()
}

fn d_rate() -> u32 {
    10_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output shape (one JSON object per line)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct HostLine {
    ip: String,
    #[serde(default)]
    ports: Vec<PortLine>,
}

#[derive(Debug, Deserialize)]
struct PortLine {
    port: u16,
    #[serde(default = "d_proto")]
    proto: String,
    #[serde(default)]
    status: Option<String>,
}

fn d_proto() -> String {
    "tcp".into()
}

/// Parse one output line into port records. masscan brackets its JSON
/// list with `[`/`]` lines and suffixes entries with commas — both are
/// stripped before parsing. Returns None for non-record lines.
fn parse_host_line(line: &str) -> Option<Vec<PortRecord>> {
    let trimmed = line.trim().trim_end_matches(',');
    if trimmed.is_empty() || trimmed == "[" || trimmed == "]" || !trimmed.starts_with('{') {
        return None;
    }
    let host: HostLine = serde_json::from_str(trimmed).ok()?;
    let records = host
        .ports
        .into_iter()
        .filter(|p| p.status.as_deref().unwrap_or("open") == "open")
        .map(|p| PortRecord {
            host: host.ip.clone(),
            hostname: None,
            port: p.port,
            protocol: p.proto,
            state: "open".into(),
            service: "unknown".into(),
            product: None,
            version: None,
            extra_info: None,
            mac_address: None,
            mac_vendor: None,
        })
        .collect();
    Some(records)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MasscanAdapter {
    binary: String,
}

impl MasscanAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ToolAdapter for MasscanAdapter {
    fn name(&self) -> &'static str {
        "masscan"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: MasscanConfig = decode_config(&scan.configuration)?;
        let host = target::normalize_host(&scan.target);

        let cmd = ToolCommand::new(&self.binary)
            .arg(&host)
            .arg("-p")
            .arg(&config.ports)
            .arg("--rate")
            .arg(config.rate.to_string())
            .arg("-oJ")
            .arg("-");

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(5).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut open_ports = 0usize;
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if let Some(records) = parse_host_line(&text) {
                        for record in records {
                            ctx.append(&record).await?;
                            open_ports += 1;
                            ctx.log(
                                LogLevel::Success,
                                format!(
                                    "open port {}/{} on {}",
                                    record.port, record.protocol, record.host
                                ),
                            )
                            .await;
                        }
                        ctx.progress((10 + open_ports * 2).min(90) as u8).await;
                    }
                }
                OutputLine::Stderr(text) => {
                    // masscan narrates progress on stderr; only surface
                    // real problems.
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        let code = run.finish().await?;
        if open_ports == 0 && code.unwrap_or(0) != 0 {
            return Err(ScanError::Tool(format!(
                "masscan produced no output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        ctx.log(
            LogLevel::Info,
            format!("masscan finished: {open_ports} open ports on {host}"),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: MasscanConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.ports, "1-65535");
        assert_eq!(config.rate, 10_000);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let err =
            decode_config::<MasscanConfig>(&serde_json::json!({ "aggression": 3 })).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn parses_host_line_with_open_ports() {
        let line = r#"{"ip": "127.0.0.1", "timestamp": "1700000000", "ports": [{"port": 22, "proto": "tcp", "status": "open", "reason": "syn-ack", "ttl": 64}]}"#;
        let records = parse_host_line(line).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "127.0.0.1");
        assert_eq!(records[0].port, 22);
        assert_eq!(records[0].protocol, "tcp");
        assert_eq!(records[0].state, "open");
        assert_eq!(records[0].service, "unknown");
        assert!(records[0].product.is_none());
    }

    #[test]
    fn strips_json_array_framing() {
        assert!(parse_host_line("[").is_none());
        assert!(parse_host_line("]").is_none());
        assert!(parse_host_line("").is_none());

        let with_comma = r#"{"ip": "10.0.0.1", "ports": [{"port": 80, "proto": "tcp"}]},"#;
        let records = parse_host_line(with_comma).unwrap();
        assert_eq!(records[0].port, 80);
    }

    #[test]
    fn skips_closed_ports() {
        let line = r#"{"ip": "10.0.0.1", "ports": [{"port": 443, "proto": "tcp", "status": "closed"}]}"#;
        let records = parse_host_line(line).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_host_line("rate: 9.98-kpps").is_none());
        assert!(parse_host_line("{not json").is_none());
    }
}

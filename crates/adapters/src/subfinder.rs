//! Subdomain enumeration (subfinder).
//!
//! Streams JSONL: one object per discovered subdomain with the source
//! that produced it, and the resolved IP when resolution is on.

use argus_domain::results::SubdomainRecord;
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumMode {
    /// Certificate logs, passive DNS, search engines.
    Passive,
    /// Also resolve candidates and report their addresses.
    Active,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubfinderConfig {
    #[serde(default = "d_mode")]
    pub mode: EnumMode,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_mode() -> EnumMode {
    EnumMode::Passive
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct SubdomainLine {
    host: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    ip: Option<String>,
}

pub fn parse_subdomain_line(line: &str) -> Option<SubdomainRecord> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let doc: SubdomainLine = serde_json::from_str(trimmed).ok()?;
    Some(SubdomainRecord {
        subdomain: doc.host,
        source: doc.source.unwrap_or_else(|| "subfinder".into()),
        ip_address: doc.ip.filter(|s| !s.is_empty()),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SubfinderAdapter {
    binary: String,
}

impl SubfinderAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ToolAdapter for SubfinderAdapter {
    fn name(&self) -> &'static str {
        "subfinder"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: SubfinderConfig = decode_config(&scan.configuration)?;
        let domain = target::normalize_host(&scan.target);

        let mut cmd = ToolCommand::new(&self.binary)
            .arg("-d")
            .arg(&domain)
            .arg("-oJ")
            .arg("-silent");
        if config.mode == EnumMode::Active {
            cmd = cmd.arg("-all").arg("-ip");
        }
        if config.recursive {
            cmd = cmd.arg("-recursive");
        }

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(5).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut found = 0usize;
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if let Some(record) = parse_subdomain_line(&text) {
                        ctx.append(&record).await?;
                        found += 1;
                        ctx.progress((10 + found).min(90) as u8).await;
                    }
                }
                OutputLine::Stderr(text) => {
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        let code = run.finish().await?;
        if found == 0 && code.unwrap_or(0) != 0 {
            return Err(ScanError::Tool(format!(
                "subfinder produced no output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        ctx.log(
            LogLevel::Info,
            format!("subfinder finished: {found} subdomains of {domain}"),
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
    fn parses_subdomain_line() {
        let line = r#"{"host": "mail.example.com", "input": "example.com", "source": "crtsh"}"#;
        let record = parse_subdomain_line(line).unwrap();
        assert_eq!(record.subdomain, "mail.example.com");
        assert_eq!(record.source, "crtsh");
        assert!(record.ip_address.is_none());
    }

    #[test]
    fn ip_field_carried_when_present() {
        let line = r#"{"host": "api.example.com", "source": "dnsdumpster", "ip": "203.0.113.9"}"#;
        let record = parse_subdomain_line(line).unwrap();
        assert_eq!(record.ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn non_json_lines_are_skipped() {
        assert!(parse_subdomain_line("mail.example.com").is_none());
        assert!(parse_subdomain_line("").is_none());
    }

    #[test]
    fn config_defaults() {
        let config: SubfinderConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.mode, EnumMode::Passive);
        assert!(!config.recursive);

        let config: SubfinderConfig =
            decode_config(&serde_json::json!({ "mode": "active", "recursive": true })).unwrap();
        assert_eq!(config.mode, EnumMode::Active);
        assert!(config.recursive);
    }
}

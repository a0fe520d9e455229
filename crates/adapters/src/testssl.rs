//! TLS/SSL analysis (testssl.sh).
//!
//! testssl renders its findings as one JSON array, so stdout is
//! accumulated (size-capped) and parsed at EOF. Severities stay
//! upper-case end to end — the UI keys on that.

use argus_domain::results::{FindingSeverity, TlsFinding};
use argus_domain::scan::{LogLevel, Scan};
use argus_domain::target;
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use serde::Deserialize;

use crate::decode_config;

const MAX_BUFFER: usize = 8 * 1024 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Full,
    Fast,
    Protocols,
    Ciphers,
    Vulnerabilities,
    Headers,
}

impl TlsMode {
    /// Flags selecting the sub-checks; `full` runs everything.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Full => &[],
            Self::Fast => &["--fast"],
            Self::Protocols => &["--protocols"],
            Self::Ciphers => &["--std"],
            Self::Vulnerabilities => &["--vulnerable"],
            Self::Headers => &["--headers"],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default = "d_mode")]
    pub mode: TlsMode,
    /// Port appended when the target carries none.
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_mode() -> TlsMode {
    TlsMode::Full
}

fn d_port() -> u16 {
    443
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FindingDoc {
    id: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    finding: Option<String>,
    #[serde(default)]
    cve: Option<String>,
    #[serde(default)]
    cwe: Option<String>,
}

/// Parse testssl's JSON array (`--jsonfile`) into findings. Entries
/// with an unknown severity are kept as INFO rather than dropped.
pub fn parse_testssl_output(buffer: &str) -> Result<Vec<TlsFinding>, String> {
    let docs: Vec<FindingDoc> =
        serde_json::from_str(buffer.trim()).map_err(|e| e.to_string())?;
    Ok(docs
        .into_iter()
        .map(|doc| TlsFinding {
            finding_id: doc.id,
            severity: doc
                .severity
                .as_deref()
                .and_then(FindingSeverity::parse)
                .unwrap_or(FindingSeverity::Info),
            finding: doc.finding.unwrap_or_default(),
            cve: doc.cve.filter(|s| !s.is_empty()),
            cwe: doc.cwe.filter(|s| !s.is_empty()),
        })
        .collect())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TestsslAdapter {
    binary: String,
}

impl TestsslAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ToolAdapter for TestsslAdapter {
    fn name(&self) -> &'static str {
        "testssl"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: TlsConfig = decode_config(&scan.configuration)?;
        let endpoint = target::host_port(&scan.target, config.port);

        let cmd = ToolCommand::new(&self.binary)
            .args(config.mode.flags().iter().copied())
            .arg("--jsonfile")
            .arg("/dev/stdout")
            .arg("--quiet")
            .arg("--color")
            .arg("0")
            .arg(&endpoint);

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(10).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut buffer = String::new();
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if buffer.len() + text.len() < MAX_BUFFER {
                        buffer.push_str(&text);
                        buffer.push('\n');
                    }
                    ctx.progress(60).await;
                }
                OutputLine::Stderr(text) => {
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        let code = run.finish().await?;

        // testssl exits with the count of severity hits; the document
        // decides success.
        let findings = parse_testssl_output(&buffer).map_err(|e| {
            ScanError::Tool(format!(
                "testssl produced no parseable output (exit code {}): {e}",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            ))
        })?;

        let mut by_severity = [0usize; 5];
        for finding in &findings {
            ctx.append(finding).await?;
            let idx = match finding.severity {
                FindingSeverity::Critical => 0,
                FindingSeverity::High => 1,
                FindingSeverity::Medium => 2,
                FindingSeverity::Low => 3,
                FindingSeverity::Info => 4,
            };
            by_severity[idx] += 1;
            if matches!(
                finding.severity,
                FindingSeverity::Critical | FindingSeverity::High
            ) {
                ctx.log(
                    LogLevel::Warning,
                    format!(
                        "{} [{}]: {}",
                        finding.finding_id,
                        finding.severity.as_str(),
                        finding.finding
                    ),
                )
                .await;
            }
        }

        ctx.log(
            LogLevel::Info,
            format!(
                "testssl finished on {endpoint}: {} findings ({} critical, {} high, {} medium)",
                findings.len(),
                by_severity[0],
                by_severity[1],
                by_severity[2]
            ),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"id": "SSLv3", "ip": "198.51.100.7/198.51.100.7", "port": "443", "severity": "HIGH", "finding": "offered (NOT ok)", "cve": "CVE-2014-3566", "cwe": "CWE-757"},
        {"id": "TLS1_2", "severity": "OK", "finding": "offered"},
        {"id": "heartbleed", "severity": "CRITICAL", "finding": "VULNERABLE", "cve": "CVE-2014-0160", "cwe": ""},
        {"id": "HSTS", "severity": "LOW", "finding": "not offered"}
    ]"#;

    #[test]
    fn parses_findings_array() {
        let findings = parse_testssl_output(SAMPLE).unwrap();
        assert_eq!(findings.len(), 4);

        let sslv3 = &findings[0];
        assert_eq!(sslv3.finding_id, "SSLv3");
        assert_eq!(sslv3.severity, FindingSeverity::High);
        assert_eq!(sslv3.cve.as_deref(), Some("CVE-2014-3566"));
        assert_eq!(sslv3.cwe.as_deref(), Some("CWE-757"));

        // "OK" maps to INFO, empty CWE becomes None.
        assert_eq!(findings[1].severity, FindingSeverity::Info);
        assert!(findings[2].cwe.is_none());
        assert_eq!(findings[2].severity, FindingSeverity::Critical);
    }

    #[test]
    fn severities_serialize_uppercase() {
        let findings = parse_testssl_output(SAMPLE).unwrap();
        let json = serde_json::to_value(&findings[2]).unwrap();
        assert_eq!(json["severity"], "CRITICAL");
    }

    #[test]
    fn broken_output_is_an_error() {
        assert!(parse_testssl_output("testssl.sh could not connect").is_err());
    }

    #[test]
    fn mode_flags() {
        assert!(TlsMode::Full.flags().is_empty());
        assert_eq!(TlsMode::Fast.flags(), &["--fast"]);
        assert_eq!(TlsMode::Vulnerabilities.flags(), &["--vulnerable"]);
    }

    #[test]
    fn config_defaults() {
        let config: TlsConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.mode, TlsMode::Full);
        assert_eq!(config.port, 443);

        let config: TlsConfig =
            decode_config(&serde_json::json!({ "mode": "protocols", "port": 8443 })).unwrap();
        assert_eq!(config.mode, TlsMode::Protocols);
        assert_eq!(config.port, 8443);
    }
}

//! Template-driven vulnerability scanning (nuclei).
//!
//! Streams JSONL findings. The severity filter is both passed to the
//! tool and enforced on every parsed record before it is persisted.

use argus_domain::results::{Severity, Vulnerability};
use argus_domain::scan::{LogLevel, Scan};
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
pub struct NucleiConfig {
    /// Severities to report (lower-case).
    #[serde(default = "d_severity")]
    pub severity: Vec<String>,
    /// Template tag filter.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_severity() -> Vec<String> {
    vec!["critical".into(), "high".into(), "medium".into(), "low".into()]
}

impl NucleiConfig {
    pub fn severities(&self) -> Result<Vec<Severity>, String> {
        self.severity
            .iter()
            .map(|s| Severity::parse(s).ok_or_else(|| format!("unknown severity '{s}'")))
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSONL findings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FindingLine {
    #[serde(rename = "template-id")]
    template_id: String,
    info: FindingInfo,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(rename = "matched-at", default)]
    matched_at: Option<String>,
    #[serde(rename = "curl-command", default)]
    curl_command: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindingInfo {
    name: String,
    severity: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<TagsField>,
    #[serde(default)]
    reference: Option<Vec<String>>,
}

/// nuclei has emitted tags both as a list and as a comma string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Csv(String),
}

impl TagsField {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Csv(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

pub fn parse_finding_line(line: &str) -> Option<Vulnerability> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let doc: FindingLine = serde_json::from_str(trimmed).ok()?;
    let severity = Severity::parse(&doc.info.severity)?;
    Some(Vulnerability {
        template_id: doc.template_id,
        template_name: doc.info.name,
        severity,
        kind: doc.kind.unwrap_or_else(|| "http".into()),
        host: doc.host.unwrap_or_default(),
        matched_at: doc.matched_at.unwrap_or_default(),
        description: doc.info.description.filter(|s| !s.is_empty()),
        tags: doc.info.tags.map(TagsField::into_vec).unwrap_or_default(),
        references: doc.info.reference.unwrap_or_default(),
        curl_command: doc.curl_command.filter(|s| !s.is_empty()),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct NucleiAdapter {
    binary: String,
}

impl NucleiAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ToolAdapter for NucleiAdapter {
    fn name(&self) -> &'static str {
        "nuclei"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: NucleiConfig = decode_config(&scan.configuration)?;
        let wanted = config.severities().map_err(ScanError::Config)?;

        let mut cmd = ToolCommand::new(&self.binary)
            .arg("-u")
            .arg(scan.target.trim())
            .arg("-jsonl")
            .arg("-silent")
            .arg("-severity")
            .arg(
                wanted
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            );
        if !config.tags.is_empty() {
            cmd = cmd.arg("-tags").arg(config.tags.join(","));
        }

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(5).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut findings = 0usize;
        let mut skipped = 0usize;
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    let Some(vuln) = parse_finding_line(&text) else {
                        if text.trim().starts_with('{') {
                            skipped += 1;
                            ctx.log(LogLevel::Warning, "skipping unparseable finding line")
                                .await;
                        }
                        continue;
                    };

                    if !wanted.contains(&vuln.severity) {
                        continue;
                    }

                    ctx.log(
                        LogLevel::Warning,
                        format!(
                            "[{}] {} at {}",
                            vuln.severity.as_str(),
                            vuln.template_name,
                            vuln.matched_at
                        ),
                    )
                    .await;
                    ctx.append(&vuln).await?;
                    findings += 1;
                    ctx.progress((10 + findings * 3).min(90) as u8).await;
                }
                OutputLine::Stderr(text) => {
                    if exec::stderr_is_noteworthy(&text) {
                        ctx.log(LogLevel::Warning, text).await;
                    }
                }
            }
        }

        // Exit code 1 with findings is normal for nuclei.
        let _ = run.finish().await?;

        ctx.log(
            LogLevel::Info,
            format!("nuclei finished: {findings} findings ({skipped} unparseable)"),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIT: &str = r#"{"template-id":"exposed-env","template-path":"/t/exposed-env.yaml","info":{"name":"Exposed .env file","author":["x"],"tags":["exposure","config"],"description":"The .env file was disclosed.","reference":["https://example.test/ref"],"severity":"high"},"type":"http","host":"https://example.com","matched-at":"https://example.com/.env","curl-command":"curl -X GET https://example.com/.env"}"#;

    #[test]
    fn parses_finding_line() {
        let vuln = parse_finding_line(HIT).unwrap();
        assert_eq!(vuln.template_id, "exposed-env");
        assert_eq!(vuln.template_name, "Exposed .env file");
        assert_eq!(vuln.severity, Severity::High);
        assert_eq!(vuln.kind, "http");
        assert_eq!(vuln.matched_at, "https://example.com/.env");
        assert_eq!(vuln.tags, vec!["exposure", "config"]);
        assert_eq!(vuln.references, vec!["https://example.test/ref"]);
        assert!(vuln.curl_command.is_some());
    }

    #[test]
    fn csv_tags_are_split() {
        let line = r#"{"template-id":"t","info":{"name":"n","severity":"low","tags":"cve,rce"},"host":"h"}"#;
        let vuln = parse_finding_line(line).unwrap();
        assert_eq!(vuln.tags, vec!["cve", "rce"]);
    }

    #[test]
    fn unknown_severity_is_dropped() {
        let line = r#"{"template-id":"t","info":{"name":"n","severity":"nightmare"}}"#;
        assert!(parse_finding_line(line).is_none());
    }

    #[test]
    fn progress_lines_are_skipped() {
        assert!(parse_finding_line("[INF] Using Nuclei Engine 3.1.0").is_none());
    }

    #[test]
    fn severity_filter_config() {
        let config: NucleiConfig =
            decode_config(&serde_json::json!({ "severity": ["high", "critical"] })).unwrap();
        let wanted = config.severities().unwrap();
        assert_eq!(wanted, vec![Severity::High, Severity::Critical]);

        // The filter excludes anything outside the requested set.
        let medium = parse_finding_line(
            r#"{"template-id":"t","info":{"name":"n","severity":"medium"}}"#,
        )
        .unwrap();
        assert!(!wanted.contains(&medium.severity));
        let high =
            parse_finding_line(HIT).unwrap();
        assert!(wanted.contains(&high.severity));
    }

    #[test]
    fn bad_severity_in_config_is_an_error() {
        let config: NucleiConfig =
            decode_config(&serde_json::json!({ "severity": ["sky-high"] })).unwrap();
        assert!(config.severities().is_err());
    }
}

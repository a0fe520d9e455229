//! Cloud posture scanning (trivy, prowler, ScoutSuite).
//!
//! One adapter instance per cloud scan type; the scan_type decides which
//! tool runs. Credentials are never read from the config bag — the bag
//! may name a profile, and the tools resolve it from their own
//! credential stores (`~/.aws`, instance roles, env).
//!
//! Severity and status casing is upper-case throughout, matching the
//! cloud-finding contract.

use argus_domain::results::{CloudFinding, CloudVulnerability, FindingSeverity, FindingStatus};
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use serde::Deserialize;

use crate::decode_config;

const MAX_BUFFER: usize = 32 * 1024 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Docker,
}

impl CloudProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Docker => "docker",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    #[serde(default = "d_provider")]
    pub provider: CloudProvider,
    /// Named credential profile the tool resolves from its own store.
    /// Never a secret value.
    #[serde(default)]
    pub credential_profile: Option<String>,
    /// Compliance framework tag passed to prowler (e.g. `cis_2.0_aws`).
    #[serde(default)]
    pub compliance: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_provider() -> CloudProvider {
    CloudProvider::Aws
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// trivy output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct TrivyDoc {
    #[serde(rename = "Results", default)]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
struct TrivyResult {
    #[serde(rename = "Target", default)]
    target: String,
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<TrivyVuln>,
    #[serde(rename = "Misconfigurations", default)]
    misconfigurations: Vec<TrivyMisconf>,
}

#[derive(Debug, Deserialize)]
struct TrivyVuln {
    #[serde(rename = "VulnerabilityID")]
    id: String,
    #[serde(rename = "Severity", default)]
    severity: Option<String>,
    #[serde(rename = "PkgName", default)]
    pkg_name: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrivyMisconf {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Severity", default)]
    severity: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "Resolution", default)]
    resolution: Option<String>,
}

/// Parse a complete trivy JSON document into vulnerability and
/// misconfiguration records.
pub fn parse_trivy_output(
    buffer: &str,
) -> Result<(Vec<CloudVulnerability>, Vec<CloudFinding>), String> {
    let doc: TrivyDoc = serde_json::from_str(buffer.trim()).map_err(|e| e.to_string())?;

    let mut vulns = Vec::new();
    let mut findings = Vec::new();

    for result in doc.results {
        for vuln in result.vulnerabilities {
            vulns.push(CloudVulnerability {
                vulnerability_id: vuln.id,
                severity: vuln
                    .severity
                    .as_deref()
                    .and_then(FindingSeverity::parse)
                    .unwrap_or(FindingSeverity::Info),
                pkg_name: vuln.pkg_name,
                installed_version: vuln.installed_version,
                fixed_version: vuln.fixed_version.filter(|s| !s.is_empty()),
                title: vuln.title,
                description: vuln.description,
            });
        }
        for misconf in result.misconfigurations {
            findings.push(CloudFinding {
                severity: misconf
                    .severity
                    .as_deref()
                    .and_then(FindingSeverity::parse)
                    .unwrap_or(FindingSeverity::Info),
                status: match misconf.status.as_deref() {
                    Some("PASS") => FindingStatus::Pass,
                    _ => FindingStatus::Fail,
                },
                service: result.target.clone(),
                region: None,
                resource_id: Some(misconf.id),
                title: misconf.title.unwrap_or_default(),
                description: misconf.description,
                remediation: misconf.resolution,
                compliance: Vec::new(),
                source: "trivy".into(),
            });
        }
    }

    Ok((vulns, findings))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// prowler output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct ProwlerFinding {
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: Option<String>,
    #[serde(rename = "ServiceName", default)]
    service_name: String,
    #[serde(rename = "Region", default)]
    region: Option<String>,
    #[serde(rename = "ResourceId", default)]
    resource_id: Option<String>,
    #[serde(rename = "CheckTitle", default)]
    check_title: String,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "Remediation", default)]
    remediation: Option<serde_json::Value>,
    #[serde(rename = "Compliance", default)]
    compliance: Option<serde_json::Value>,
}

fn remediation_text(value: Option<serde_json::Value>) -> Option<String> {
    let value = value?;
    if let Some(text) = value.as_str() {
        return Some(text.to_owned());
    }
    value
        .pointer("/Recommendation/Text")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

fn compliance_tags(value: Option<serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn parse_prowler_finding(value: serde_json::Value) -> Option<CloudFinding> {
    let doc: ProwlerFinding = serde_json::from_value(value).ok()?;
    Some(CloudFinding {
        severity: doc
            .severity
            .as_deref()
            .and_then(FindingSeverity::parse)
            .unwrap_or(FindingSeverity::Info),
        status: match doc.status.as_deref() {
            Some("PASS") => FindingStatus::Pass,
            _ => FindingStatus::Fail,
        },
        service: doc.service_name,
        region: doc.region.filter(|s| !s.is_empty()),
        resource_id: doc.resource_id.filter(|s| !s.is_empty()),
        title: doc.check_title,
        description: doc.description.filter(|s| !s.is_empty()),
        remediation: remediation_text(doc.remediation),
        compliance: compliance_tags(doc.compliance),
        source: "prowler".into(),
    })
}

/// prowler prints either JSONL or one array depending on version.
pub fn parse_prowler_output(buffer: &str) -> Vec<CloudFinding> {
    let trimmed = buffer.trim();
    if trimmed.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            return values.into_iter().filter_map(parse_prowler_finding).collect();
        }
    }
    trimmed
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok())
        .filter_map(parse_prowler_finding)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ScoutSuite report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// ScoutSuite writes `scoutsuite_results_<...>.js`: a JS assignment
/// whose right-hand side is the report JSON.
pub fn parse_scoutsuite_report(content: &str) -> Result<Vec<CloudFinding>, String> {
    let json_start = content
        .find('{')
        .ok_or_else(|| "no JSON object in report".to_string())?;
    let doc: serde_json::Value =
        serde_json::from_str(&content[json_start..]).map_err(|e| e.to_string())?;

    let mut findings = Vec::new();
    let Some(services) = doc.get("services").and_then(|v| v.as_object()) else {
        return Ok(findings);
    };

    for (service, body) in services {
        let Some(raw) = body.get("findings").and_then(|v| v.as_object()) else {
            continue;
        };
        for (finding_id, finding) in raw {
            let flagged = finding
                .get("flagged_items")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let severity = match finding.get("level").and_then(|v| v.as_str()) {
                Some("danger") => FindingSeverity::High,
                Some("warning") => FindingSeverity::Medium,
                _ => FindingSeverity::Info,
            };
            findings.push(CloudFinding {
                severity,
                status: if flagged > 0 {
                    FindingStatus::Fail
                } else {
                    FindingStatus::Pass
                },
                service: service.clone(),
                region: None,
                resource_id: Some(finding_id.clone()),
                title: finding
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or(finding_id)
                    .to_owned(),
                description: finding
                    .get("rationale")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned),
                remediation: finding
                    .get("remediation")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned),
                compliance: Vec::new(),
                source: "scoutsuite".into(),
            });
        }
    }

    Ok(findings)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CloudAdapter {
    trivy: String,
    prowler: String,
    scoutsuite: String,
}

impl CloudAdapter {
    pub fn new(
        trivy: impl Into<String>,
        prowler: impl Into<String>,
        scoutsuite: impl Into<String>,
    ) -> Self {
        Self {
            trivy: trivy.into(),
            prowler: prowler.into(),
            scoutsuite: scoutsuite.into(),
        }
    }

    async fn collect_output(&self, ctx: &ScanContext, cmd: &ToolCommand) -> ScanResult<(String, Option<i32>)> {
        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        let mut run = exec::spawn(cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut buffer = String::new();
        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if buffer.len() + text.len() < MAX_BUFFER {
                        buffer.push_str(&text);
                        buffer.push('\n');
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
        Ok((buffer, code))
    }

    async fn run_trivy(
        &self,
        ctx: &ScanContext,
        config: &CloudConfig,
        subcommand: &str,
        target: &str,
    ) -> ScanResult<usize> {
        let mut cmd = ToolCommand::new(&self.trivy)
            .arg(subcommand)
            .arg("-f")
            .arg("json")
            .arg("--quiet")
            .arg(target);
        if let Some(profile) = &config.credential_profile {
            cmd = cmd.env("AWS_PROFILE", profile);
        }

        let (buffer, code) = self.collect_output(ctx, &cmd).await?;
        let (vulns, findings) = parse_trivy_output(&buffer).map_err(|e| {
            ScanError::Tool(format!(
                "trivy produced no parseable output (exit code {}): {e}",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            ))
        })?;

        let emitted = vulns.len() + findings.len();
        for vuln in &vulns {
            ctx.append(vuln).await?;
            if matches!(
                vuln.severity,
                FindingSeverity::Critical | FindingSeverity::High
            ) {
                ctx.log(
                    LogLevel::Warning,
                    format!(
                        "[{}] {} in {} {}",
                        vuln.severity.as_str(),
                        vuln.vulnerability_id,
                        vuln.pkg_name,
                        vuln.installed_version
                    ),
                )
                .await;
            }
        }
        for finding in &findings {
            ctx.append(finding).await?;
        }

        ctx.log(
            LogLevel::Info,
            format!(
                "trivy {subcommand} finished: {} vulnerabilities, {} misconfigurations",
                vulns.len(),
                findings.len()
            ),
        )
        .await;
        Ok(emitted)
    }

    async fn run_prowler(&self, ctx: &ScanContext, config: &CloudConfig) -> ScanResult<usize> {
        let mut cmd = ToolCommand::new(&self.prowler)
            .arg(config.provider.as_str())
            .arg("-M")
            .arg("json")
            .arg("--no-banner");
        if let Some(profile) = &config.credential_profile {
            cmd = cmd.arg("--profile").arg(profile);
        }
        if let Some(compliance) = &config.compliance {
            cmd = cmd.arg("--compliance").arg(compliance);
        }

        let (buffer, code) = self.collect_output(ctx, &cmd).await?;
        let findings = parse_prowler_output(&buffer);
        if findings.is_empty() && code.unwrap_or(0) != 0 {
            return Err(ScanError::Tool(format!(
                "prowler produced no parseable output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        let mut failed = 0usize;
        for finding in &findings {
            ctx.append(finding).await?;
            if finding.status == FindingStatus::Fail {
                failed += 1;
            }
        }

        ctx.log(
            LogLevel::Info,
            format!("prowler finished: {} checks, {failed} failed", findings.len()),
        )
        .await;
        Ok(findings.len())
    }

    async fn run_scoutsuite(&self, ctx: &ScanContext, config: &CloudConfig) -> ScanResult<usize> {
        let report_dir = tempfile::tempdir()
            .map_err(|e| ScanError::Tool(format!("report dir: {e}")))?;

        let mut cmd = ToolCommand::new(&self.scoutsuite)
            .arg(config.provider.as_str())
            .arg("--no-browser")
            .arg("--report-dir")
            .arg(report_dir.path().display().to_string());
        if let Some(profile) = &config.credential_profile {
            cmd = cmd.arg("--profile").arg(profile);
        }

        let (_, code) = self.collect_output(ctx, &cmd).await?;

        // The report lands as scoutsuite-report/scoutsuite-results/
        // scoutsuite_results_*.js under the report dir.
        let report = find_scoutsuite_results(report_dir.path()).ok_or_else(|| {
            ScanError::Tool(format!(
                "scoutsuite produced no report (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            ))
        })?;
        let content = std::fs::read_to_string(&report)
            .map_err(|e| ScanError::Tool(format!("reading scoutsuite report: {e}")))?;
        let findings = parse_scoutsuite_report(&content).map_err(ScanError::Parse)?;

        for finding in &findings {
            ctx.append(finding).await?;
        }
        ctx.log(
            LogLevel::Info,
            format!("scoutsuite finished: {} findings", findings.len()),
        )
        .await;
        Ok(findings.len())
    }
}

fn find_scoutsuite_results(dir: &std::path::Path) -> Option<std::path::PathBuf> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("scoutsuite_results") && n.ends_with(".js"))
            {
                return Some(path);
            }
        }
    }
    None
}

#[async_trait]
impl ToolAdapter for CloudAdapter {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.trivy)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: CloudConfig = decode_config(&scan.configuration)?;
        let target = scan.target.trim();

        ctx.progress(5).await;
        let emitted = match scan.scan_type.as_str() {
            "trivy" | "image" => self.run_trivy(ctx, &config, "image", target).await?,
            "config" => self.run_trivy(ctx, &config, "config", target).await?,
            "prowler" => self.run_prowler(ctx, &config).await?,
            "scoutsuite" => self.run_scoutsuite(ctx, &config).await?,
            "full" => {
                if config.provider == CloudProvider::Docker {
                    self.run_trivy(ctx, &config, "image", target).await?
                } else {
                    let posture_ctx = ctx.sub_band(0, 60);
                    let posture = self.run_prowler(&posture_ctx, &config).await;
                    let posture = match posture {
                        Ok(n) => n,
                        Err(e @ (ScanError::Cancelled | ScanError::TimedOut(_))) => return Err(e),
                        Err(e) => {
                            ctx.log(
                                LogLevel::Warning,
                                format!("posture phase failed, continuing: {e}"),
                            )
                            .await;
                            0
                        }
                    };
                    let iac_ctx = ctx.sub_band(60, 100);
                    match self.run_trivy(&iac_ctx, &config, "config", target).await {
                        Ok(n) => posture + n,
                        Err(e @ (ScanError::Cancelled | ScanError::TimedOut(_))) => return Err(e),
                        Err(e) => {
                            ctx.log(
                                LogLevel::Warning,
                                format!("IaC phase failed, continuing: {e}"),
                            )
                            .await;
                            posture
                        }
                    }
                }
            }
            other => {
                return Err(ScanError::Config(format!(
                    "unsupported cloud scan type '{other}'"
                )))
            }
        };

        ctx.log(
            LogLevel::Info,
            format!("cloud scan finished: {emitted} records"),
        )
        .await;
        ctx.progress(100).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIVY: &str = r#"{
        "Results": [
            {
                "Target": "alpine:3.18",
                "Vulnerabilities": [
                    {"VulnerabilityID": "CVE-2023-5363", "Severity": "HIGH", "PkgName": "openssl", "InstalledVersion": "3.1.3-r0", "FixedVersion": "3.1.4-r0", "Title": "openssl: issue"},
                    {"VulnerabilityID": "CVE-2023-0001", "Severity": "LOW", "PkgName": "busybox", "InstalledVersion": "1.36", "FixedVersion": ""}
                ],
                "Misconfigurations": [
                    {"ID": "DS002", "Severity": "HIGH", "Status": "FAIL", "Title": "root user", "Description": "Runs as root", "Resolution": "Add USER"}
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_trivy_document() {
        let (vulns, findings) = parse_trivy_output(TRIVY).unwrap();
        assert_eq!(vulns.len(), 2);
        assert_eq!(vulns[0].vulnerability_id, "CVE-2023-5363");
        assert_eq!(vulns[0].severity, FindingSeverity::High);
        assert_eq!(vulns[0].fixed_version.as_deref(), Some("3.1.4-r0"));
        assert!(vulns[1].fixed_version.is_none());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, FindingStatus::Fail);
        assert_eq!(findings[0].source, "trivy");
        assert_eq!(findings[0].remediation.as_deref(), Some("Add USER"));
    }

    #[test]
    fn parses_prowler_jsonl_and_array() {
        let line = r#"{"Status": "FAIL", "Severity": "high", "ServiceName": "s3", "Region": "us-east-1", "ResourceId": "bucket-1", "CheckTitle": "S3 bucket public", "Description": "Bucket is public", "Remediation": {"Recommendation": {"Text": "Block public access"}}, "Compliance": {"CIS-1.5": ["2.1.1"]}}"#;
        let findings = parse_prowler_output(line);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, FindingSeverity::High);
        assert_eq!(finding.status, FindingStatus::Fail);
        assert_eq!(finding.service, "s3");
        assert_eq!(finding.region.as_deref(), Some("us-east-1"));
        assert_eq!(finding.remediation.as_deref(), Some("Block public access"));
        assert_eq!(finding.compliance, vec!["CIS-1.5"]);

        let array = format!("[{line}]");
        assert_eq!(parse_prowler_output(&array).len(), 1);
    }

    #[test]
    fn prowler_pass_status() {
        let line = r#"{"Status": "PASS", "Severity": "medium", "ServiceName": "iam", "CheckTitle": "MFA enabled"}"#;
        let findings = parse_prowler_output(line);
        assert_eq!(findings[0].status, FindingStatus::Pass);
    }

    #[test]
    fn parses_scoutsuite_report() {
        let report = r#"scoutsuite_results =
        {"services": {"ec2": {"findings": {
            "ec2-default-security-group": {"description": "Default security group in use", "rationale": "why", "remediation": "fix", "level": "danger", "flagged_items": 3},
            "ec2-ok-check": {"description": "Fine", "level": "warning", "flagged_items": 0}
        }}}}"#;
        let findings = parse_scoutsuite_report(report).unwrap();
        assert_eq!(findings.len(), 2);

        let flagged = findings
            .iter()
            .find(|f| f.resource_id.as_deref() == Some("ec2-default-security-group"))
            .unwrap();
        assert_eq!(flagged.severity, FindingSeverity::High);
        assert_eq!(flagged.status, FindingStatus::Fail);
        assert_eq!(flagged.source, "scoutsuite");

        let clean = findings
            .iter()
            .find(|f| f.resource_id.as_deref() == Some("ec2-ok-check"))
            .unwrap();
        assert_eq!(clean.status, FindingStatus::Pass);
        assert_eq!(clean.severity, FindingSeverity::Medium);
    }

    #[test]
    fn config_defaults_and_provider_parse() {
        let config: CloudConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.provider, CloudProvider::Aws);

        let config: CloudConfig =
            decode_config(&serde_json::json!({ "provider": "docker" })).unwrap();
        assert_eq!(config.provider, CloudProvider::Docker);

        // Raw secrets have no field to arrive through.
        assert!(decode_config::<CloudConfig>(
            &serde_json::json!({ "aws_secret_access_key": "x" })
        )
        .is_err());
    }
}

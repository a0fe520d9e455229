//! WordPress deep scan (WPScan).
//!
//! WPScan emits one JSON document, so the adapter accumulates stdout
//! (size-capped) and parses at EOF. Core, theme, plugin, and user
//! findings become technology records plus one summary record; every
//! vulnerability is also surfaced as a warning log line.
//!
//! The API token never reaches the logs: the invocation line is
//! redacted, and the token itself comes from config or the
//! `WPSCAN_API_TOKEN` environment fallback.

use argus_domain::results::{Technology, WpComponent, WpSummary, WpVulnerability};
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use serde::Deserialize;

use crate::classify::classify;
use crate::decode_config;

const MAX_BUFFER: usize = 16 * 1024 * 1024;

const ENUM_CHOICES: &[&str] = &["vp", "ap", "vt", "at", "u", "cb"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WpscanConfig {
    /// WPScan API token for vulnerability data. Redacted in logs.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Enumeration set: vp, ap, vt, at, u, cb.
    #[serde(default = "d_enumerate")]
    pub enumerate: Vec<String>,
    #[serde(default = "d_detection")]
    pub detection_mode: DetectionMode,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Mixed,
    Passive,
    Aggressive,
}

impl DetectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Passive => "passive",
            Self::Aggressive => "aggressive",
        }
    }
}

fn d_enumerate() -> Vec<String> {
    vec!["vp".into(), "vt".into(), "u".into()]
}

fn d_detection() -> DetectionMode {
    DetectionMode::Mixed
}

impl WpscanConfig {
    pub fn validate(&self) -> Result<(), String> {
        for choice in &self.enumerate {
            if !ENUM_CHOICES.contains(&choice.as_str()) {
                return Err(format!("unknown enumeration choice '{choice}'"));
            }
        }
        Ok(())
    }

    /// Token from config, else the environment credentials store.
    pub fn resolve_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .or_else(|| std::env::var("WPSCAN_API_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON document shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct WpscanDoc {
    #[serde(default)]
    version: Option<WpVersionDoc>,
    #[serde(default)]
    main_theme: Option<WpComponentDoc>,
    #[serde(default)]
    plugins: std::collections::HashMap<String, WpComponentDoc>,
    #[serde(default)]
    users: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    db_exports: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    config_backups: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WpVersionDoc {
    number: String,
    #[serde(default)]
    vulnerabilities: Vec<WpVulnDoc>,
}

#[derive(Debug, Deserialize)]
struct WpComponentDoc {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    version: Option<WpVersionField>,
    #[serde(default)]
    latest_version: Option<String>,
    #[serde(default)]
    outdated: bool,
    #[serde(default)]
    vulnerabilities: Vec<WpVulnDoc>,
}

/// WPScan renders a component version either as an object or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WpVersionField {
    Object { number: String },
    Plain(String),
}

impl WpVersionField {
    fn number(&self) -> &str {
        match self {
            Self::Object { number } => number,
            Self::Plain(number) => number,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WpVulnDoc {
    title: String,
    #[serde(default)]
    fixed_in: Option<String>,
    #[serde(default)]
    references: Option<WpReferences>,
}

#[derive(Debug, Default, Deserialize)]
struct WpReferences {
    #[serde(default)]
    url: Vec<String>,
    #[serde(default)]
    cve: Vec<String>,
}

fn vuln_from_doc(doc: WpVulnDoc) -> WpVulnerability {
    let mut references = Vec::new();
    if let Some(refs) = doc.references {
        references.extend(refs.cve.into_iter().map(|cve| format!("CVE-{cve}")));
        references.extend(refs.url);
    }
    WpVulnerability {
        title: doc.title,
        fixed_in: doc.fixed_in,
        references,
    }
}

fn component_from_doc(slug_key: &str, doc: WpComponentDoc) -> WpComponent {
    WpComponent {
        slug: doc.slug.unwrap_or_else(|| slug_key.to_owned()),
        version: doc.version.as_ref().map(|v| v.number().to_owned()),
        latest_version: doc.latest_version,
        outdated: doc.outdated,
        vulnerabilities: doc.vulnerabilities.into_iter().map(vuln_from_doc).collect(),
    }
}

/// Parse the whole WPScan JSON document into the summary record.
pub fn parse_wpscan_output(buffer: &str) -> Result<WpSummary, String> {
    let doc: WpscanDoc = serde_json::from_str(buffer.trim()).map_err(|e| e.to_string())?;

    let (version, core_vulnerabilities) = match doc.version {
        Some(v) => (
            Some(v.number),
            v.vulnerabilities.into_iter().map(vuln_from_doc).collect(),
        ),
        None => (None, Vec::new()),
    };

    let main_theme = doc
        .main_theme
        .map(|theme| component_from_doc("main-theme", theme));

    let mut plugins: Vec<WpComponent> = doc
        .plugins
        .into_iter()
        .map(|(key, plugin)| component_from_doc(&key, plugin))
        .collect();
    plugins.sort_by(|a, b| a.slug.cmp(&b.slug));

    let mut users: Vec<String> = doc.users.into_keys().collect();
    users.sort();
    let mut db_exports: Vec<String> = doc.db_exports.into_keys().collect();
    db_exports.sort();
    let mut config_backups: Vec<String> = doc.config_backups.into_keys().collect();
    config_backups.sort();

    let vulnerability_count = core_vulnerabilities.len()
        + main_theme.as_ref().map_or(0, |t| t.vulnerabilities.len())
        + plugins.iter().map(|p| p.vulnerabilities.len()).sum::<usize>();

    Ok(WpSummary {
        version,
        core_vulnerabilities,
        main_theme,
        plugins,
        users,
        db_exports,
        config_backups,
        vulnerability_count,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WpscanAdapter {
    binary: String,
}

impl WpscanAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn emit_summary(&self, ctx: &ScanContext, summary: &WpSummary) -> ScanResult<()> {
        if let Some(version) = &summary.version {
            let tech = Technology {
                name: "WordPress".into(),
                version: Some(version.clone()),
                confidence: Some(100),
                category: classify("WordPress"),
            };
            ctx.append(&tech).await?;
        }

        for vuln in &summary.core_vulnerabilities {
            ctx.log(LogLevel::Warning, format!("core vulnerability: {}", vuln.title))
                .await;
        }

        if let Some(theme) = &summary.main_theme {
            let tech = Technology {
                name: format!("theme:{}", theme.slug),
                version: theme.version.clone(),
                confidence: None,
                category: classify(&theme.slug),
            };
            ctx.append(&tech).await?;
            for vuln in &theme.vulnerabilities {
                ctx.log(
                    LogLevel::Warning,
                    format!("theme {} vulnerability: {}", theme.slug, vuln.title),
                )
                .await;
            }
        }

        for plugin in &summary.plugins {
            let tech = Technology {
                name: format!("plugin:{}", plugin.slug),
                version: plugin.version.clone(),
                confidence: None,
                category: classify(&plugin.slug),
            };
            ctx.append(&tech).await?;
            for vuln in &plugin.vulnerabilities {
                ctx.log(
                    LogLevel::Warning,
                    format!("plugin {} vulnerability: {}", plugin.slug, vuln.title),
                )
                .await;
            }
        }

        for user in &summary.users {
            let tech = Technology {
                name: format!("user:{user}"),
                version: None,
                confidence: None,
                category: argus_domain::results::TechCategory::Info,
            };
            ctx.append(&tech).await?;
        }

        ctx.append(summary).await?;
        Ok(())
    }
}

#[async_trait]
impl ToolAdapter for WpscanAdapter {
    fn name(&self) -> &'static str {
        "wpscan"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: WpscanConfig = decode_config(&scan.configuration)?;
        config.validate().map_err(ScanError::Config)?;

        let mut cmd = ToolCommand::new(&self.binary)
            .arg("--url")
            .arg(scan.target.trim())
            .arg("--format")
            .arg("json")
            .arg("--no-banner")
            .arg("--detection-mode")
            .arg(config.detection_mode.as_str());
        if !config.enumerate.is_empty() {
            cmd = cmd.arg("--enumerate").arg(config.enumerate.join(","));
        }
        if let Some(token) = config.resolve_token() {
            cmd = cmd.arg("--api-token").arg(token);
        }

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

        // WPScan uses exit code 5 for "vulnerabilities found" — the
        // document decides success, not the code.
        let summary = parse_wpscan_output(&buffer).map_err(|e| {
            ScanError::Tool(format!(
                "wpscan produced no parseable output (exit code {}): {e}",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            ))
        })?;

        ctx.progress(85).await;
        self.emit_summary(ctx, &summary).await?;

        ctx.log(
            LogLevel::Info,
            format!(
                "wpscan finished: core {}, {} plugins, {} users, {} vulnerabilities",
                summary.version.as_deref().unwrap_or("unknown"),
                summary.plugins.len(),
                summary.users.len(),
                summary.vulnerability_count
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

    const SAMPLE: &str = r#"{
        "version": {
            "number": "6.4.2",
            "vulnerabilities": [
                {"title": "WP Core XSS", "fixed_in": "6.4.3", "references": {"cve": ["2024-0001"], "url": ["https://example.test/advisory"]}}
            ]
        },
        "main_theme": {
            "slug": "twentytwentyfour",
            "version": {"number": "1.0"},
            "outdated": false,
            "vulnerabilities": []
        },
        "plugins": {
            "contact-form-7": {
                "slug": "contact-form-7",
                "version": {"number": "5.8"},
                "latest_version": "5.9",
                "outdated": true,
                "vulnerabilities": [
                    {"title": "CF7 injection", "fixed_in": "5.9"}
                ]
            }
        },
        "users": {"admin": {"id": 1}, "editor": {"id": 2}},
        "db_exports": {},
        "config_backups": {"https://example.test/wp-config.bak": {}}
    }"#;

    #[test]
    fn parses_full_document() {
        let summary = parse_wpscan_output(SAMPLE).unwrap();
        assert_eq!(summary.version.as_deref(), Some("6.4.2"));
        assert_eq!(summary.core_vulnerabilities.len(), 1);
        assert_eq!(
            summary.core_vulnerabilities[0].references,
            vec![
                "CVE-2024-0001".to_string(),
                "https://example.test/advisory".to_string()
            ]
        );

        let theme = summary.main_theme.as_ref().unwrap();
        assert_eq!(theme.slug, "twentytwentyfour");
        assert_eq!(theme.version.as_deref(), Some("1.0"));

        assert_eq!(summary.plugins.len(), 1);
        let cf7 = &summary.plugins[0];
        assert!(cf7.outdated);
        assert_eq!(cf7.latest_version.as_deref(), Some("5.9"));
        assert_eq!(cf7.vulnerabilities.len(), 1);

        assert_eq!(summary.users, vec!["admin", "editor"]);
        assert_eq!(summary.config_backups.len(), 1);
        assert_eq!(summary.vulnerability_count, 2);
    }

    #[test]
    fn minimal_document_parses() {
        let summary = parse_wpscan_output("{}").unwrap();
        assert!(summary.version.is_none());
        assert!(summary.plugins.is_empty());
        assert_eq!(summary.vulnerability_count, 0);
    }

    #[test]
    fn broken_document_is_an_error() {
        assert!(parse_wpscan_output("Scan Aborted: target is not WordPress").is_err());
    }

    #[test]
    fn plain_string_versions_are_accepted() {
        let doc = r#"{"plugins": {"akismet": {"version": "5.3"}}}"#;
        let summary = parse_wpscan_output(doc).unwrap();
        assert_eq!(summary.plugins[0].version.as_deref(), Some("5.3"));
    }

    #[test]
    fn config_validation() {
        let config: WpscanConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.detection_mode, DetectionMode::Mixed);
        assert!(config.validate().is_ok());

        let config: WpscanConfig =
            decode_config(&serde_json::json!({ "enumerate": ["vp", "zz"] })).unwrap();
        assert!(config.validate().is_err());

        let config: WpscanConfig =
            decode_config(&serde_json::json!({ "detection_mode": "aggressive" })).unwrap();
        assert_eq!(config.detection_mode, DetectionMode::Aggressive);
    }

    #[test]
    fn token_resolution_prefers_config() {
        let config: WpscanConfig =
            decode_config(&serde_json::json!({ "api_token": "from-config" })).unwrap();
        assert_eq!(config.resolve_token().as_deref(), Some("from-config"));
    }
}

//! Web technology fingerprinting (WhatWeb).
//!
//! The tool emits a JSON array in some versions and NDJSON in others,
//! and truncated runs produce neither. Each stdout line is tried as
//! NDJSON first; if no line ever parsed, the accumulated buffer is
//! tried as one JSON array; failing that, a `name[version]` regex sweep
//! recovers what it can.

use std::collections::HashMap;
use std::sync::OnceLock;

use argus_domain::results::{CmsIdentification, Technology};
use argus_domain::scan::{LogLevel, Scan};
use argus_engine::exec::{self, OutputLine, ToolCommand};
use argus_engine::{ScanContext, ScanError, ScanResult, ToolAdapter};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::classify::{classify, identify_cms};
use crate::decode_config;

/// Accumulation cap for the whole-array fallback parse.
const MAX_BUFFER: usize = 4 * 1024 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhatwebConfig {
    /// WhatWeb aggression level 1 (stealthy) to 4 (heavy).
    #[serde(default = "d_aggression")]
    pub aggression: u8,
    /// Extra request headers.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Restrict to specific plugins.
    #[serde(default)]
    pub plugins: Option<Vec<String>>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn d_aggression() -> u8 {
    1
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One identified technology before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub name: String,
    pub version: Option<String>,
    pub confidence: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WhatwebTarget {
    #[serde(default)]
    plugins: HashMap<String, WhatwebPlugin>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatwebPlugin {
    #[serde(default)]
    version: Vec<String>,
    #[serde(default)]
    string: Vec<String>,
    #[serde(default)]
    certainty: Option<u32>,
}

/// Parse one JSON target object into fingerprints.
fn fingerprints_from_value(value: &serde_json::Value) -> Vec<Fingerprint> {
    let Ok(target) = serde_json::from_value::<WhatwebTarget>(value.clone()) else {
        return Vec::new();
    };
    let mut prints: Vec<Fingerprint> = target
        .plugins
        .into_iter()
        .map(|(name, plugin)| {
            let version = plugin
                .version
                .first()
                .or_else(|| plugin.string.first())
                .cloned();
            Fingerprint {
                name,
                version,
                confidence: plugin.certainty,
            }
        })
        .collect();
    prints.sort_by(|a, b| a.name.cmp(&b.name));
    prints
}

/// NDJSON line: a single target object.
pub fn parse_ndjson_line(line: &str) -> Option<Vec<Fingerprint>> {
    let trimmed = line.trim().trim_end_matches(',');
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    if value.get("plugins").is_none() {
        return None;
    }
    Some(fingerprints_from_value(&value))
}

/// Whole-output fallback: a JSON array of target objects.
pub fn parse_json_array(buffer: &str) -> Option<Vec<Fingerprint>> {
    let value: serde_json::Value = serde_json::from_str(buffer.trim()).ok()?;
    let array = value.as_array()?;
    Some(
        array
            .iter()
            .flat_map(fingerprints_from_value)
            .collect::<Vec<_>>(),
    )
}

fn brief_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z][\w.\- ]*?)\[([^\]]*)\]").unwrap())
}

/// Last-resort sweep over WhatWeb's brief text format:
/// `nginx[1.18.0], jQuery[3.6.0], Title[Welcome]`.
pub fn parse_brief_line(line: &str) -> Vec<Fingerprint> {
    brief_pattern()
        .captures_iter(line)
        .map(|caps| {
            let version = caps[2].trim();
            Fingerprint {
                name: caps[1].trim().to_owned(),
                version: (!version.is_empty()).then(|| version.to_owned()),
                confidence: None,
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WhatwebAdapter {
    binary: String,
}

impl WhatwebAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Persist fingerprints: every plugin becomes a technology record,
    /// and the first plugin naming a known CMS also becomes the scan's
    /// CMS identification (exactly once per CMS).
    async fn emit(
        &self,
        ctx: &ScanContext,
        prints: &[Fingerprint],
        identified: &mut Vec<&'static str>,
    ) -> ScanResult<usize> {
        for print in prints {
            let category = classify(&print.name);
            let tech = Technology {
                name: print.name.clone(),
                version: print.version.clone(),
                confidence: print.confidence,
                category,
            };
            ctx.append(&tech).await?;

            if let Some(cms) = identify_cms(&print.name) {
                if !identified.contains(&cms) {
                    identified.push(cms);
                    let identification = CmsIdentification {
                        cms_name: cms.to_owned(),
                        version: print.version.clone(),
                        confidence: print.confidence.unwrap_or(100),
                        source: "whatweb".into(),
                    };
                    ctx.append(&identification).await?;
                    ctx.log(LogLevel::Success, format!("CMS identified: {cms}"))
                        .await;
                }
            }
        }
        Ok(prints.len())
    }
}

#[async_trait]
impl ToolAdapter for WhatwebAdapter {
    fn name(&self) -> &'static str {
        "whatweb"
    }

    fn binary(&self) -> Option<&str> {
        Some(&self.binary)
    }

    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let config: WhatwebConfig = decode_config(&scan.configuration)?;

        let mut cmd = ToolCommand::new(&self.binary)
            .arg("--log-json=-")
            .arg("-a")
            .arg(config.aggression.clamp(1, 4).to_string())
            .arg("--quiet");
        if let Some(headers) = &config.headers {
            for (key, value) in headers {
                cmd = cmd.arg("--header").arg(format!("{key}: {value}"));
            }
        }
        if let Some(plugins) = &config.plugins {
            if !plugins.is_empty() {
                cmd = cmd.arg("-p").arg(plugins.join(","));
            }
        }
        // WhatWeb takes the target verbatim: URL or bare host both work.
        cmd = cmd.arg(scan.target.trim());

        ctx.log(LogLevel::Info, format!("running: {}", cmd.display_redacted()))
            .await;
        ctx.progress(10).await;

        let mut run = exec::spawn(&cmd, ctx.cancel_token().clone(), ctx.remaining())?;

        let mut identified: Vec<&'static str> = Vec::new();
        let mut emitted = 0usize;
        let mut buffer = String::new();
        let mut raw_lines: Vec<String> = Vec::new();

        while let Some(line) = run.next_line().await {
            ctx.checkpoint()?;
            match line {
                OutputLine::Stdout(text) => {
                    if let Some(prints) = parse_ndjson_line(&text) {
                        emitted += self.emit(ctx, &prints, &mut identified).await?;
                        ctx.progress(70).await;
                    } else {
                        if buffer.len() < MAX_BUFFER {
                            buffer.push_str(&text);
                            buffer.push('\n');
                        }
                        if raw_lines.len() < 10_000 {
                            raw_lines.push(text);
                        }
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

        // Nothing parsed per line: try the buffer as one JSON array,
        // then fall back to the brief `name[version]` format.
        if emitted == 0 {
            if let Some(prints) = parse_json_array(&buffer) {
                emitted += self.emit(ctx, &prints, &mut identified).await?;
            } else {
                ctx.log(
                    LogLevel::Warning,
                    "JSON output unusable, falling back to brief-format parse",
                )
                .await;
                for raw in &raw_lines {
                    let prints = parse_brief_line(raw);
                    emitted += self.emit(ctx, &prints, &mut identified).await?;
                }
            }
        }

        // WhatWeb exits non-zero on unreachable targets and some plugin
        // errors; only a run with zero usable output is a failure.
        if emitted == 0 {
            return Err(ScanError::Tool(format!(
                "whatweb produced no usable output (exit code {})",
                code.map_or_else(|| "signal".into(), |c| c.to_string())
            )));
        }

        ctx.log(
            LogLevel::Info,
            format!(
                "whatweb finished: {emitted} technologies, {} CMS identification(s)",
                identified.len()
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
    use argus_domain::results::TechCategory;

    #[test]
    fn parses_ndjson_target_line() {
        let line = r#"{"target":"https://example.com","plugins":{"WordPress":{"version":["6.4.2"],"certainty":100},"nginx":{"version":["1.18.0"]},"Title":{"string":["Example"]}}}"#;
        let prints = parse_ndjson_line(line).unwrap();
        assert_eq!(prints.len(), 3);

        let wp = prints.iter().find(|p| p.name == "WordPress").unwrap();
        assert_eq!(wp.version.as_deref(), Some("6.4.2"));
        assert_eq!(wp.confidence, Some(100));

        let title = prints.iter().find(|p| p.name == "Title").unwrap();
        assert_eq!(title.version.as_deref(), Some("Example"));
    }

    #[test]
    fn ndjson_rejects_non_target_lines() {
        assert!(parse_ndjson_line("[").is_none());
        assert!(parse_ndjson_line(r#"{"status": 200}"#).is_none());
        assert!(parse_ndjson_line("ERROR something").is_none());
    }

    #[test]
    fn parses_whole_json_array() {
        let buffer = r#"[
            {"target":"https://a.example","plugins":{"Drupal":{"version":["9.5"]}}},
            {"target":"https://a.example/about","plugins":{"PHP":{"version":["8.1"]}}}
        ]"#;
        let prints = parse_json_array(buffer).unwrap();
        assert_eq!(prints.len(), 2);
        assert!(prints.iter().any(|p| p.name == "Drupal"));
    }

    #[test]
    fn brief_format_fallback() {
        let prints =
            parse_brief_line("https://example.com [200 OK] nginx[1.18.0], jQuery[3.6.0], Title[]");
        let nginx = prints.iter().find(|p| p.name == "nginx").unwrap();
        assert_eq!(nginx.version.as_deref(), Some("1.18.0"));
        let title = prints.iter().find(|p| p.name == "Title").unwrap();
        assert!(title.version.is_none());
    }

    #[test]
    fn classification_of_parsed_stream() {
        let line = r#"{"target":"t","plugins":{"WordPress":{},"nginx":{},"jQuery":{},"X-Frame-Options":{},"Title":{}}}"#;
        let prints = parse_ndjson_line(line).unwrap();
        let mut categories: Vec<TechCategory> =
            prints.iter().map(|p| classify(&p.name)).collect();
        categories.sort_by_key(|c| c.as_str());
        categories.dedup();
        let mut expected = vec![
            TechCategory::Cms,
            TechCategory::Server,
            TechCategory::Framework,
            TechCategory::Security,
            TechCategory::Info,
        ];
        expected.sort_by_key(|c| c.as_str());
        assert_eq!(categories, expected);
    }

    #[test]
    fn config_defaults_and_bounds() {
        let config: WhatwebConfig = decode_config(&serde_json::json!({})).unwrap();
        assert_eq!(config.aggression, 1);

        let config: WhatwebConfig =
            decode_config(&serde_json::json!({ "aggression": 3 })).unwrap();
        assert_eq!(config.aggression, 3);

        assert!(decode_config::<WhatwebConfig>(&serde_json::json!({ "rate": 5 })).is_err());
    }
}
